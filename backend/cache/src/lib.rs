pub mod semantic;
pub mod similarity;

pub use semantic::{CacheHit, SemanticCache};
pub use similarity::cosine_similarity;
