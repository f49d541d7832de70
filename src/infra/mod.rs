pub mod db;
pub mod fetch;

pub use db::{BundleIndex, ComponentStore, MetadataStore, MetadataTable, ModelDb, TensorStore};
pub use fetch::{Fetcher, HttpFetcher, Origin};
