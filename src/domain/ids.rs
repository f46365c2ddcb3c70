//! Identifier newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a trading venue (e.g. `"kraken"`, `"sim-a"`).
///
/// Venue ids are lower-cased on construction so lookups and the
/// deterministic tie-break ordering are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueId(String);

impl VenueId {
    /// Create a new venue id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().to_ascii_lowercase())
    }

    /// Get the underlying id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VenueId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for VenueId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
