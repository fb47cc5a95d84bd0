//! Instrument identifiers
//!
//! Exchange symbols are upper-case alphanumerics (`ETHUSDT`); stream names
//! use the lower-case form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::DecodeError;

/// Exchange symbol for a single instrument (e.g. "ETHUSDT")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, upper-casing the input.
    ///
    /// Returns None if the symbol is empty or contains anything other than
    /// ASCII letters and digits.
    pub fn try_new(symbol: impl Into<String>) -> Option<Self> {
        let s = symbol.into().trim().to_ascii_uppercase();
        if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()) {
            Some(Self(s))
        } else {
            None
        }
    }

    /// Get the symbol string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case form used in stream subscriptions.
    pub fn stream_name(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_new(s).ok_or_else(|| DecodeError::InvalidSymbol(s.to_string()))
    }
}

impl TryFrom<String> for Symbol {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}
