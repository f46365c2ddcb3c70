//! Trading pair value type.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// An immutable (base, quote) currency pair, e.g. BTC/USD.
///
/// Currencies are ASCII upper-cased on construction; equality is by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TradingPair {
    base: String,
    quote: String,
}

impl TradingPair {
    /// Create a new trading pair.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidPair`] if either currency is empty or
    /// both are the same.
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Result<Self, DomainError> {
        let base = base.into().trim().to_ascii_uppercase();
        let quote = quote.into().trim().to_ascii_uppercase();

        if base.is_empty() || quote.is_empty() {
            return Err(DomainError::InvalidPair {
                reason: "base and quote currencies must be non-empty".into(),
            });
        }
        if base == quote {
            return Err(DomainError::InvalidPair {
                reason: format!("base and quote currencies are identical: {base}"),
            });
        }

        Ok(Self { base, quote })
    }

    /// Get the base currency.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Get the quote currency.
    #[must_use]
    pub fn quote(&self) -> &str {
        &self.quote
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for TradingPair {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s.split_once('/').ok_or_else(|| DomainError::InvalidPair {
            reason: format!("expected BASE/QUOTE, got '{s}'"),
        })?;
        Self::new(base, quote)
    }
}

impl Serialize for TradingPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TradingPair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
