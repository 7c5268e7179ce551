//! Accessor registry for dispatching get/set requests by item name.
//!
//! Built once, then only read. Each name maps to at most one getter and at
//! most one setter; registration order is kept because it is the order of
//! the snapshot sent to new clients.

use std::collections::HashMap;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{RemoteError, Result};
use crate::protocol::ValueItem;

/// Reads the current value of an item from context `C`.
pub trait Getter<C>: Send + Sync + 'static {
    /// Produce the item's current JSON value.
    fn call(&self, ctx: &mut C) -> Result<Value>;
}

/// Applies a client-supplied value to context `C`.
pub trait Setter<C>: Send + Sync + 'static {
    /// Apply `value`; a value of the wrong shape is an error.
    fn call(&self, ctx: &mut C, value: &Value) -> Result<()>;
}

/// Wrapper that serializes whatever the getter closure returns.
pub struct TypedGetter<F, R> {
    getter: F,
    _phantom: PhantomData<fn() -> R>,
}

impl<F, R> TypedGetter<F, R> {
    /// Create a new typed getter.
    pub fn new(getter: F) -> Self {
        Self {
            getter,
            _phantom: PhantomData,
        }
    }
}

impl<C, F, R> Getter<C> for TypedGetter<F, R>
where
    F: Fn(&mut C) -> R + Send + Sync + 'static,
    R: Serialize + 'static,
{
    fn call(&self, ctx: &mut C) -> Result<Value> {
        Ok(serde_json::to_value((self.getter)(ctx))?)
    }
}

/// Wrapper that deserializes the value before calling the setter.
pub struct TypedSetter<F, T> {
    setter: F,
    _phantom: PhantomData<fn(T)>,
}

impl<F, T> TypedSetter<F, T> {
    /// Create a new typed setter.
    pub fn new(setter: F) -> Self {
        Self {
            setter,
            _phantom: PhantomData,
        }
    }
}

impl<C, F, T> Setter<C> for TypedSetter<F, T>
where
    F: Fn(&mut C, T) + Send + Sync + 'static,
    T: DeserializeOwned + 'static,
{
    fn call(&self, ctx: &mut C, value: &Value) -> Result<()> {
        let parsed = T::deserialize(value)?;
        (self.setter)(ctx, parsed);
        Ok(())
    }
}

/// Entry for a registered item.
struct ItemEntry<C> {
    name: String,
    getter: Option<Box<dyn Getter<C>>>,
    setter: Option<Box<dyn Setter<C>>>,
}

/// Registry mapping item names to accessors over context `C`.
pub struct AccessorRegistry<C> {
    /// Items in registration order.
    items: Vec<ItemEntry<C>>,
    /// Name to position in `items`.
    index: HashMap<String, usize>,
}

impl<C: 'static> AccessorRegistry<C> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn entry(&mut self, name: &str) -> &mut ItemEntry<C> {
        let position = match self.index.get(name) {
            Some(&position) => position,
            None => {
                self.items.push(ItemEntry {
                    name: name.to_string(),
                    getter: None,
                    setter: None,
                });
                self.index.insert(name.to_string(), self.items.len() - 1);
                self.items.len() - 1
            }
        };
        &mut self.items[position]
    }

    /// Register the getter for `name`, replacing any previous one.
    pub fn getter<F, R>(&mut self, name: &str, getter: F) -> &mut Self
    where
        F: Fn(&mut C) -> R + Send + Sync + 'static,
        R: Serialize + 'static,
    {
        self.entry(name).getter = Some(Box::new(TypedGetter::new(getter)));
        self
    }

    /// Register the setter for `name`, replacing any previous one.
    ///
    /// The setter receives the request value deserialized as `T`.
    pub fn setter<F, T>(&mut self, name: &str, setter: F) -> &mut Self
    where
        F: Fn(&mut C, T) + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
    {
        self.entry(name).setter = Some(Box::new(TypedSetter::new(setter)));
        self
    }

    /// Check whether `name` is registered at all.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Check whether `name` has a getter.
    pub fn has_getter(&self, name: &str) -> bool {
        self.lookup(name).is_some_and(|entry| entry.getter.is_some())
    }

    /// Check whether `name` has a setter.
    pub fn has_setter(&self, name: &str) -> bool {
        self.lookup(name).is_some_and(|entry| entry.setter.is_some())
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|entry| entry.name.as_str())
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn lookup(&self, name: &str) -> Option<&ItemEntry<C>> {
        self.index.get(name).map(|&position| &self.items[position])
    }

    /// Read the current value of `name`.
    ///
    /// # Errors
    ///
    /// [`RemoteError::UnknownItem`] if no getter is registered.
    pub fn get(&self, name: &str, ctx: &mut C) -> Result<Value> {
        let getter = self
            .lookup(name)
            .and_then(|entry| entry.getter.as_deref())
            .ok_or_else(|| RemoteError::UnknownItem(name.to_string()))?;

        getter.call(ctx)
    }

    /// Apply `value` to `name`.
    ///
    /// # Errors
    ///
    /// [`RemoteError::UnknownItem`] if no setter is registered, and
    /// [`RemoteError::InvalidValue`] if the value has the wrong shape.
    pub fn set(&self, name: &str, ctx: &mut C, value: &Value) -> Result<()> {
        let setter = self
            .lookup(name)
            .and_then(|entry| entry.setter.as_deref())
            .ok_or_else(|| RemoteError::UnknownItem(name.to_string()))?;

        setter.call(ctx, value).map_err(|e| match e {
            RemoteError::Json(e) => RemoteError::InvalidValue {
                name: name.to_string(),
                reason: e.to_string(),
            },
            other => other,
        })
    }

    /// Read `name` as an outbound item.
    pub fn current(&self, name: &str, ctx: &mut C) -> Result<ValueItem> {
        Ok(ValueItem::current(name, self.get(name, ctx)?))
    }

    /// Read every item that has a getter, in registration order.
    ///
    /// A getter that fails is logged and left out.
    pub fn snapshot(&self, ctx: &mut C) -> Vec<ValueItem> {
        self.items
            .iter()
            .filter_map(|entry| {
                let getter = entry.getter.as_deref()?;
                match getter.call(ctx) {
                    Ok(value) => Some(ValueItem::current(entry.name.clone(), value)),
                    Err(e) => {
                        tracing::warn!("Getter for '{}' failed: {}", entry.name, e);
                        None
                    }
                }
            })
            .collect()
    }
}

impl<C: 'static> Default for AccessorRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
