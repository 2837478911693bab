//! Base-unit token amount arithmetic
//!
//! Every amount that crosses the contract boundary is an 18-decimal
//! fixed-point integer in base units. Amounts are kept as 256-bit integers
//! end to end; converting to a native float anywhere would silently lose
//! precision on realistic token balances.

use alloy_primitives::U256;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Add;

/// Base units per display unit (10^18).
const BASE_UNITS_PER_TOKEN: u64 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// The raw string was not a non-negative base-10 integer.
    Malformed(String),
    /// A subtraction would have produced a negative amount.
    Underflow,
}

impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantityError::Malformed(raw) => write!(f, "Malformed quantity: {:?}", raw),
            QuantityError::Underflow => write!(f, "Quantity underflow"),
        }
    }
}

impl std::error::Error for QuantityError {}

/// A non-negative token amount in base units.
///
/// Immutable value type; arithmetic produces new values. Subtraction is the
/// only operation that can fail in practice and it fails loudly rather than
/// clamping, because a negative money amount always means an upstream
/// inconsistency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(U256);

impl Quantity {
    pub fn zero() -> Self {
        Quantity(U256::ZERO)
    }

    pub fn from_u64(value: u64) -> Self {
        Quantity(U256::from(value))
    }

    /// Parse a raw base-unit amount as returned by a contract call or event
    /// payload. Only non-negative base-10 integer strings are accepted.
    pub fn from_raw(raw: &str) -> Result<Self, QuantityError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(QuantityError::Malformed(raw.to_string()));
        }
        U256::from_str_radix(trimmed, 10)
            .map(Quantity)
            .map_err(|_| QuantityError::Malformed(raw.to_string()))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checked subtraction. `Underflow` is an invariant violation for every
    /// caller in this crate, never a user error, so it is surfaced rather
    /// than clamped to zero.
    pub fn sub(&self, other: &Self) -> Result<Self, QuantityError> {
        self.0
            .checked_sub(other.0)
            .map(Quantity)
            .ok_or(QuantityError::Underflow)
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }

    /// Raw base-unit decimal string, the representation used on the wire.
    pub fn to_raw(&self) -> String {
        self.0.to_string()
    }

    /// Human display string in whole tokens: base units divided by 10^18,
    /// fractional part rendered exactly with trailing zeros trimmed.
    pub fn to_display_units(&self) -> String {
        let scale = U256::from(BASE_UNITS_PER_TOKEN);
        let whole = self.0 / scale;
        let frac = self.0 % scale;
        if frac.is_zero() {
            return whole.to_string();
        }
        let padded = format!("{:0>18}", frac.to_string());
        format!("{}.{}", whole, padded.trim_end_matches('0'))
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_units())
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_raw())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Quantity::from_raw(&raw).map_err(D::Error::custom)
    }
}
