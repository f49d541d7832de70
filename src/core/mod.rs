pub mod bundle;
pub mod error;

pub use bundle::{
    AssembledComponent, AvailableModel, BundleEntry, BundleId, ComponentId, Manifest,
    ManifestComponent, ModelBundle, ModelComponent, Tensor, TensorId,
};
pub use error::{AssetError, Result};
