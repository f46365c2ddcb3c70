//! Shared application state.

use parking_lot::{Mutex, RwLock};

use crate::domain::{ArbitrageStatistics, RiskProfile};

/// State shared between the detection engine and execution coordinator.
///
/// The risk profile is read-mostly and hot-swappable: readers always take
/// a whole copy, writers replace the whole value, so no task ever sees a
/// partially-updated profile. Statistics are mutated only by the execution
/// coordinator.
pub struct AppState {
    risk: RwLock<RiskProfile>,
    statistics: Mutex<ArbitrageStatistics>,
}

impl AppState {
    /// Create state with an initial risk profile.
    #[must_use]
    pub fn new(risk: RiskProfile) -> Self {
        Self {
            risk: RwLock::new(risk),
            statistics: Mutex::new(ArbitrageStatistics::default()),
        }
    }

    /// Copy-on-read access to the current risk profile.
    #[must_use]
    pub fn risk_profile(&self) -> RiskProfile {
        self.risk.read().clone()
    }

    /// Hot-swap the risk profile as a whole value.
    pub fn update_risk_profile(&self, profile: RiskProfile) {
        *self.risk.write() = profile;
    }

    /// Mutate statistics under the single-writer lock.
    pub fn with_statistics<R>(&self, f: impl FnOnce(&mut ArbitrageStatistics) -> R) -> R {
        f(&mut self.statistics.lock())
    }

    /// Cloned snapshot of the current statistics.
    #[must_use]
    pub fn statistics(&self) -> ArbitrageStatistics {
        self.statistics.lock().clone()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(RiskProfile::default())
    }
}
