pub mod http;
pub mod mock;
pub mod stickiness;

pub use http::HttpFetcher;
pub use mock::{MockEmbeddings, MockGeneration, MockMemory, MockRetrieval};
pub use stickiness::InMemoryStickinessStore;
