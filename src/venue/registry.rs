//! Venue adapter registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::VenueId;
use crate::error::{Result, VenueError};

use super::traits::VenueAdapter;

/// Registry of venue adapters keyed by venue id.
///
/// The core depends only on [`VenueAdapter`]; this registry is the single
/// seam where concrete adapters are selected.
#[derive(Default)]
pub struct VenueRegistry {
    adapters: HashMap<VenueId, Arc<dyn VenueAdapter>>,
}

impl VenueRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own venue id. A later registration
    /// for the same id replaces the earlier one.
    pub fn register(&mut self, adapter: Arc<dyn VenueAdapter>) {
        self.adapters.insert(adapter.venue_id().clone(), adapter);
    }

    /// Look up an adapter.
    #[must_use]
    pub fn get(&self, venue: &VenueId) -> Option<Arc<dyn VenueAdapter>> {
        self.adapters.get(venue).cloned()
    }

    /// Look up an adapter, failing with [`VenueError::UnknownVenue`].
    pub fn require(&self, venue: &VenueId) -> Result<Arc<dyn VenueAdapter>> {
        self.get(venue).ok_or_else(|| {
            VenueError::UnknownVenue {
                venue: venue.to_string(),
            }
            .into()
        })
    }

    /// Registered venue ids in deterministic (lexicographic) order.
    #[must_use]
    pub fn venue_ids(&self) -> Vec<VenueId> {
        let mut ids: Vec<VenueId> = self.adapters.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
