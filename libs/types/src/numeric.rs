//! Fixed-point decimal types for prices and quantities
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Values are normalized on construction so that `"10.0"` and `"10.00"`
//! compare, hash and print identically when used as book keys.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DecodeError;

/// A strictly positive price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Create a price, rejecting zero and negative values.
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value.normalize()))
        } else {
            None
        }
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Absolute distance between two prices.
    pub fn distance(&self, other: Decimal) -> Decimal {
        (self.0 - other).abs()
    }
}

impl FromStr for Price {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .ok()
            .and_then(Self::try_new)
            .ok_or_else(|| DecodeError::InvalidPrice(s.to_string()))
    }
}

impl TryFrom<Decimal> for Price {
    type Error = DecodeError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or_else(|| DecodeError::InvalidPrice(value.to_string()))
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative resting quantity. Zero means "no level".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    /// Create a quantity, rejecting negative values.
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            None
        } else {
            Some(Self(value.normalize()))
        }
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl FromStr for Quantity {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .ok()
            .and_then(Self::try_new)
            .ok_or_else(|| DecodeError::InvalidQuantity(s.to_string()))
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = DecodeError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or_else(|| DecodeError::InvalidQuantity(value.to_string()))
    }
}

impl From<Quantity> for Decimal {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
