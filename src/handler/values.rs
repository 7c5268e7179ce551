//! Lenient argument types for setters.
//!
//! Clients are not consistent about JSON types: a toggle may arrive as
//! `true`, `1` or `"1"`. These types accept every reasonable spelling and
//! reject the rest with a deserialization error, which the registry
//! reports as an invalid value.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

/// Any JSON spelling a client may use for a number-like value.
#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Numeric {
    fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    fn to_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Self::Float(_) => None,
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// On/off toggle: `true`, or any number greater than zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch(pub bool);

impl<'de> Deserialize<'de> for Switch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Numeric::deserialize(deserializer)?
            .to_f64()
            .map(|n| Switch(n > 0.0))
            .ok_or_else(|| D::Error::custom("expected a number or boolean"))
    }
}

impl From<Switch> for bool {
    fn from(switch: Switch) -> Self {
        switch.0
    }
}

/// 32-bit mask; bit `i` addresses the `i`-th source of a scene.
///
/// Negative 32-bit integers are accepted as their two's complement bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mask(pub u32);

impl<'de> Deserialize<'de> for Mask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let n = Numeric::deserialize(deserializer)?
            .to_i64()
            .ok_or_else(|| D::Error::custom("expected an integer mask"))?;
        if let Ok(bits) = u32::try_from(n) {
            return Ok(Mask(bits));
        }
        i32::try_from(n)
            .map(|bits| Mask(bits as u32))
            .map_err(|_| D::Error::custom(format!("mask {} does not fit in 32 bits", n)))
    }
}

impl Mask {
    /// Number of sources a mask can address.
    pub const BITS: usize = 32;

    /// Check bit `index`.
    #[inline]
    pub fn bit(&self, index: usize) -> bool {
        index < Self::BITS && self.0 & (1 << index) != 0
    }

    /// Build a mask from per-index flags; entries past 32 are ignored.
    pub fn from_flags(flags: impl IntoIterator<Item = bool>) -> Self {
        let bits = flags
            .into_iter()
            .take(Self::BITS)
            .enumerate()
            .filter(|(_, on)| *on)
            .fold(0u32, |bits, (index, _)| bits | (1 << index));
        Mask(bits)
    }
}

/// Non-negative duration in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Millis(pub u32);

impl<'de> Deserialize<'de> for Millis {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let n = Numeric::deserialize(deserializer)?
            .to_i64()
            .ok_or_else(|| D::Error::custom("expected an integer duration"))?;
        u32::try_from(n)
            .map(Millis)
            .map_err(|_| D::Error::custom(format!("duration {} out of range", n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn parse<T: serde::de::DeserializeOwned>(value: Value) -> Option<T> {
        T::deserialize(&value).ok()
    }

    #[test]
    fn test_switch_spellings() {
        assert_eq!(parse::<Switch>(json!(true)), Some(Switch(true)));
        assert_eq!(parse::<Switch>(json!(false)), Some(Switch(false)));
        assert_eq!(parse::<Switch>(json!(1)), Some(Switch(true)));
        assert_eq!(parse::<Switch>(json!(0)), Some(Switch(false)));
        assert_eq!(parse::<Switch>(json!(-1)), Some(Switch(false)));
        assert_eq!(parse::<Switch>(json!(0.5)), Some(Switch(true)));
        assert_eq!(parse::<Switch>(json!("1")), Some(Switch(true)));
    }

    #[test]
    fn test_switch_rejects_non_numbers() {
        assert_eq!(parse::<Switch>(json!("yes")), None);
        assert_eq!(parse::<Switch>(json!(null)), None);
        assert_eq!(parse::<Switch>(json!([1])), None);
        assert_eq!(parse::<Switch>(json!({"on": true})), None);
    }

    #[test]
    fn test_mask_parsing() {
        assert_eq!(parse::<Mask>(json!(7)), Some(Mask(7)));
        assert_eq!(parse::<Mask>(json!(7.0)), Some(Mask(7)));
        assert_eq!(parse::<Mask>(json!("5")), Some(Mask(5)));
        assert_eq!(parse::<Mask>(json!(-1)), Some(Mask(u32::MAX)));
        assert_eq!(parse::<Mask>(json!(4294967295u64)), Some(Mask(u32::MAX)));
        assert_eq!(parse::<Mask>(json!(1u64 << 40)), None);
        assert_eq!(parse::<Mask>(json!("all")), None);
    }

    #[test]
    fn test_mask_bits() {
        let mask = Mask(0b101);
        assert!(mask.bit(0));
        assert!(!mask.bit(1));
        assert!(mask.bit(2));
        assert!(!mask.bit(3));
        assert!(!mask.bit(40));
        assert!(Mask(u32::MAX).bit(31));
        assert!((0..Mask::BITS).all(|i| !Mask(0).bit(i)));
    }

    #[test]
    fn test_mask_from_flags() {
        assert_eq!(Mask::from_flags([true, false, true]), Mask(0b101));
        assert_eq!(Mask::from_flags(std::iter::repeat(true).take(40)), Mask(u32::MAX));
        assert_eq!(Mask::from_flags([false; 0]), Mask(0));
    }

    #[test]
    fn test_millis() {
        assert_eq!(parse::<Millis>(json!(300)), Some(Millis(300)));
        assert_eq!(parse::<Millis>(json!(250.9)), Some(Millis(250)));
        assert_eq!(parse::<Millis>(json!(-1)), None);
        assert_eq!(parse::<Millis>(json!("fast")), None);
    }
}
