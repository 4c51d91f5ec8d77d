pub mod runtime;
pub mod schema;
pub mod validation;

pub use runtime::RuntimeControls;
pub use schema::{
    CacheConfig, FeatureFlags, GateConfig, GateThresholds, GateWeights, PipelineConfig,
};
pub use validation::{validate, ValidationReport};
