//! The `values` envelope carried by every frame.
//!
//! ```text
//! { "values": [ { "type": "get"|"set", "name": <string>, "value": <any> }, ... ] }
//! ```
//!
//! Responses reuse the same shape. Every item the engine sends is labelled
//! `"set"`, meaning "this is the current value", whatever the client asked.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::codec::JsonObject;

/// Direction of a value item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    /// Read the named value.
    Get,
    /// Write the named value, or (outbound) report its current value.
    Set,
}

impl ItemType {
    /// Parse a type label. `"set"` in any case is [`ItemType::Set`];
    /// anything else is treated as a get.
    pub fn from_label(label: &str) -> Self {
        if label.eq_ignore_ascii_case("set") {
            Self::Set
        } else {
            Self::Get
        }
    }

    /// Wire label for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
        }
    }
}

impl Default for ItemType {
    fn default() -> Self {
        Self::Get
    }
}

impl Serialize for ItemType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ItemType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Non-string labels fall back to get, like unknown strings.
        let raw = Value::deserialize(deserializer)?;
        Ok(raw.as_str().map(Self::from_label).unwrap_or_default())
    }
}

/// One named value exchanged over the protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueItem {
    /// Item name, e.g. `"streaming"` or `"sceneList"`.
    #[serde(default)]
    pub name: String,
    /// Item value; `null` when absent.
    #[serde(default)]
    pub value: Value,
    /// Request direction.
    #[serde(rename = "type", default)]
    pub item_type: ItemType,
}

impl ValueItem {
    /// Build an outbound item reporting the current value of `name`.
    pub fn current(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            item_type: ItemType::Set,
        }
    }

    /// Build a get request for `name`.
    pub fn get(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Value::Null,
            item_type: ItemType::Get,
        }
    }

    /// Build a set request.
    pub fn set(name: impl Into<String>, value: Value) -> Self {
        Self::current(name, value)
    }
}

/// A complete message: an ordered list of value items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Items in request/response order.
    #[serde(default)]
    pub values: Vec<ValueItem>,
}

impl Envelope {
    /// Create an envelope from items.
    pub fn new(values: Vec<ValueItem>) -> Self {
        Self { values }
    }

    /// Envelope carrying a single item.
    pub fn single(item: ValueItem) -> Self {
        Self { values: vec![item] }
    }

    /// Extract the items of a decoded message.
    ///
    /// Entries that are not objects are skipped with a debug log, and a
    /// missing or non-array `values` key yields no items.
    pub fn from_message(message: &JsonObject) -> Self {
        let Some(entries) = message.get("values").and_then(Value::as_array) else {
            tracing::debug!("Message has no values array, ignoring");
            return Self::default();
        };

        let values = entries
            .iter()
            .filter_map(|entry| match ValueItem::deserialize(entry) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::debug!("Skipping malformed value item: {}", e);
                    None
                }
            })
            .collect();

        Self { values }
    }

    /// Check whether the envelope carries no items.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Convert into a JSON value ready for framing.
    pub fn to_value(&self) -> Value {
        let values = self
            .values
            .iter()
            .map(|item| {
                serde_json::json!({
                    "name": item.name,
                    "value": item.value,
                    "type": item.item_type.as_str(),
                })
            })
            .collect();
        serde_json::json!({ "values": Value::Array(values) })
    }
}
