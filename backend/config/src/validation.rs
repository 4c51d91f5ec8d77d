//! Gate config validation with field-path error messages.

use thiserror::Error;

use crate::schema::GateConfig;

/// A validation finding with field path and message.
#[derive(Debug, Error)]
#[error("config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// All findings from one validation pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError { path: path.into(), message: message.into() });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError { path: path.into(), message: message.into() });
    }
}

/// Validate a gate config snapshot before it is swapped in.
pub fn validate(config: &GateConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    let t = &config.thresholds;
    for (path, value) in [
        ("thresholds.refuse", t.refuse),
        ("thresholds.askClarify", t.ask_clarify),
        ("thresholds.searchMore", t.search_more),
        ("thresholds.intentMinimum", t.intent_minimum),
        ("thresholds.optimizerRetrievalMinimum", t.optimizer_retrieval_minimum),
        ("thresholds.cacheMinimumFreshness", t.cache_minimum_freshness),
        ("thresholds.contextDriftIntentThreshold", t.context_drift_intent_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            report.error(path, format!("must be within [0, 1], got {value}"));
        }
    }

    let w = &config.weights;
    for (path, value) in [
        ("weights.retrieval", w.retrieval),
        ("weights.intent", w.intent),
        ("weights.freshness", w.freshness),
        ("weights.diversity", w.diversity),
    ] {
        if value < 0.0 {
            report.error(path, format!("must be non-negative, got {value}"));
        }
    }
    let weight_sum = w.retrieval + w.intent + w.freshness + w.diversity;
    if weight_sum <= 0.0 {
        report.error("weights", "at least one weight must be positive");
    } else if (weight_sum - 1.0).abs() > 0.01 {
        report.warn("weights", format!("weights sum to {weight_sum:.2}, not 1.0"));
    }

    if config.stickiness_ttl_secs == 0 {
        report.warn("stickinessTtlSecs", "zero TTL disables decision stickiness");
    }
    if config.flags.emergency_bypass {
        report.warn("flags.emergencyBypass", "emergency bypass is active; gate is not enforcing");
    }

    report
}
