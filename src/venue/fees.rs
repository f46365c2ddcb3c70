//! Cached per-venue fee schedules.

use std::collections::HashMap;

use crate::domain::VenueId;

use super::traits::FeeSchedule;

/// Fee schedules keyed by venue, with a shared fallback for venues that
/// never reported one.
///
/// Built once at startup and shared read-only between the detection engine
/// and the execution coordinator, so both price fees identically.
#[derive(Debug, Clone, Default)]
pub struct FeeTable {
    schedules: HashMap<VenueId, FeeSchedule>,
}

impl FeeTable {
    /// Create an empty table; every lookup falls back to the default
    /// schedule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the schedule for a venue.
    pub fn insert(&mut self, venue: VenueId, schedule: FeeSchedule) {
        self.schedules.insert(venue, schedule);
    }

    /// The venue's schedule, or the default fallback.
    #[must_use]
    pub fn schedule(&self, venue: &VenueId) -> FeeSchedule {
        self.schedules
            .get(venue)
            .copied()
            .unwrap_or_default()
    }

    /// Taker rate in percent for a venue. Market orders always pay taker.
    #[must_use]
    pub fn taker_percent(&self, venue: &VenueId) -> rust_decimal::Decimal {
        self.schedule(venue).taker_percent
    }
}
