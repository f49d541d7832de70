pub mod orchestrator;
pub mod session;
pub mod source;
pub mod store;

pub use orchestrator::{BundleFetcher, DedupPolicy, FetchProgress, DEFAULT_FETCH_CONCURRENCY};
pub use session::{EngineSession, EngineSpec, GenerationConfig, InferenceEngine, Session};
pub use source::{ComponentSource, RemoteAssetStore};
pub use store::AssetStore;
