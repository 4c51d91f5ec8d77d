pub mod domain;
pub mod gate;
pub mod scoring;
pub mod stickiness;

pub use domain::{classify_domain, RiskDomain};
pub use gate::{GateEvent, GroundingGate};
pub use stickiness::stickiness_key;
