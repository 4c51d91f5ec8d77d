pub mod analysis;
pub mod node;
pub mod nodes;
pub mod options;
pub mod orchestrator;
pub mod result;
pub mod router;

pub use node::NodeId;
pub use options::{ChatMode, ProcessOptions, ProcessRequest};
pub use orchestrator::Orchestrator;
pub use result::{FinalResult, Outcome};
