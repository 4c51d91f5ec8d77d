//! Live operator controls.
//!
//! One `RuntimeControls` instance is constructed at startup and handed by
//! reference to the gate and orchestrator. Readers take a cheap `Arc`
//! snapshot; operator updates swap the whole snapshot atomically, so a
//! request in flight keeps evaluating against one consistent config.

use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::schema::GateConfig;
use crate::validation::validate;

/// Thread-safe, restart-free gate configuration handle.
#[derive(Debug)]
pub struct RuntimeControls {
    inner: RwLock<Arc<GateConfig>>,
}

impl Default for RuntimeControls {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

impl RuntimeControls {
    pub fn new(config: GateConfig) -> Self {
        Self { inner: RwLock::new(Arc::new(config)) }
    }

    /// Current config snapshot. Callers hold the `Arc` for the duration of
    /// one evaluation so mid-flight updates cannot tear a decision.
    pub fn snapshot(&self) -> Arc<GateConfig> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Apply an operator update. The mutated config is validated before it
    /// is swapped in; an invalid update is rejected and the previous
    /// snapshot stays live.
    pub fn update<F>(&self, mutate: F) -> Result<(), String>
    where
        F: FnOnce(&mut GateConfig),
    {
        let mut candidate = (*self.snapshot()).clone();
        mutate(&mut candidate);

        let report = validate(&candidate);
        if !report.is_valid() {
            let detail = report
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            warn!(detail, "Rejected gate config update");
            return Err(detail);
        }
        for warning in &report.warnings {
            warn!(%warning, "Gate config warning");
        }

        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(candidate);
        info!("Gate config updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_is_visible_to_next_snapshot() {
        let controls = RuntimeControls::default();
        controls.update(|c| c.thresholds.refuse = 0.55).unwrap();
        assert!((controls.snapshot().thresholds.refuse - 0.55).abs() < 1e-6);
    }

    #[test]
    fn invalid_update_is_rejected_and_previous_snapshot_stays() {
        let controls = RuntimeControls::default();
        let before = controls.snapshot();
        let result = controls.update(|c| c.thresholds.refuse = 7.0);
        assert!(result.is_err());
        assert_eq!(*controls.snapshot(), *before);
    }

    #[test]
    fn held_snapshot_is_unaffected_by_update() {
        let controls = RuntimeControls::default();
        let held = controls.snapshot();
        controls.update(|c| c.flags.emergency_bypass = true).unwrap();
        assert!(!held.flags.emergency_bypass);
        assert!(controls.snapshot().flags.emergency_bypass);
    }
}
