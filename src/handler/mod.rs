//! Handler module - named value accessors and their dispatch.
//!
//! Provides:
//! - [`AccessorRegistry`] - maps item names to a getter and an optional setter
//! - [`Switch`], [`Mask`], [`Millis`] - lenient setter argument types
//!
//! # Example
//!
//! ```
//! use scene_remote::handler::{AccessorRegistry, Switch};
//! use serde_json::json;
//!
//! struct Deck {
//!     live: bool,
//! }
//!
//! let mut registry = AccessorRegistry::new();
//! registry.getter("live", |deck: &mut Deck| deck.live);
//! registry.setter("live", |deck: &mut Deck, on: Switch| deck.live = on.into());
//!
//! let mut deck = Deck { live: false };
//! registry.set("live", &mut deck, &json!(1)).unwrap();
//! assert_eq!(registry.get("live", &mut deck).unwrap(), json!(true));
//! ```

mod registry;
mod values;

pub use registry::{AccessorRegistry, Getter, Setter, TypedGetter, TypedSetter};
pub use values::{Mask, Millis, Switch};
