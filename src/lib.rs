pub mod app;
pub mod core;
pub mod envconfig;
pub mod format;
pub mod infra;
pub mod progress;

pub use core::{
    AssembledComponent, AssetError, AvailableModel, BundleEntry, BundleId, Manifest,
    ManifestComponent, ModelBundle, ModelComponent, Result, Tensor, TensorId,
};

pub use infra::{Fetcher, HttpFetcher, ModelDb, Origin};

pub use app::{
    AssetStore, BundleFetcher, ComponentSource, DedupPolicy, EngineSession, EngineSpec,
    FetchProgress, GenerationConfig, InferenceEngine, RemoteAssetStore, Session,
};

pub use envconfig::AssetConfig;
