use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::error::{AssetError, Result};

pub type BundleId = String;
pub type TensorId = String;
pub type ComponentId = String;

/// Logical models the remote origin publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailableModel {
    FlanT5Small,
    FlanT5Base,
    FlanT5Large,
}

impl AvailableModel {
    pub const ALL: [AvailableModel; 3] = [
        AvailableModel::FlanT5Small,
        AvailableModel::FlanT5Base,
        AvailableModel::FlanT5Large,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AvailableModel::FlanT5Small => "flan_t5_small",
            AvailableModel::FlanT5Base => "flan_t5_base",
            AvailableModel::FlanT5Large => "flan_t5_large",
        }
    }
}

impl fmt::Display for AvailableModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AvailableModel {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| AssetError::NotFound(format!("unknown model: {}", s)))
    }
}

/// Remote `model_definition.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub models: Vec<ManifestComponent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestComponent {
    pub definition: String,
    #[serde(default)]
    pub tensors: Vec<String>,
}

impl Manifest {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(bytes)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(AssetError::Manifest("no components listed".to_string()));
        }
        for (index, component) in self.models.iter().enumerate() {
            if component.definition.trim().is_empty() {
                return Err(AssetError::Manifest(format!(
                    "component {} has an empty definition file",
                    index
                )));
            }
            if let Some(bad) = component.tensors.iter().find(|t| t.trim().is_empty()) {
                return Err(AssetError::Manifest(format!(
                    "component {} lists an empty tensor file {:?}",
                    index, bad
                )));
            }
        }
        Ok(())
    }

    pub fn tensor_count(&self) -> usize {
        self.models.iter().map(|m| m.tensors.len()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct Tensor {
    pub id: TensorId,
    pub name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct ModelComponent {
    pub id: ComponentId,
    pub name: String,
    pub parent_id: BundleId,
    pub index: u32,
    pub tensor_ids: Vec<TensorId>,
    pub definition: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    pub model: AvailableModel,
    pub bundle_id: BundleId,
    pub registered_at: String,
}

/// One component rebuilt from the cache in the shape a session builder consumes.
#[derive(Debug, Clone)]
pub struct AssembledComponent {
    pub name: String,
    pub definition: Bytes,
    pub tensors: HashMap<String, Bytes>,
}

impl AssembledComponent {
    pub fn tensor_bytes(&self) -> u64 {
        self.tensors.values().map(|b| b.len() as u64).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ModelBundle {
    pub model: AvailableModel,
    pub bundle_id: BundleId,
    /// Sorted by ordinal: 0 = encoder, 1 = decoder.
    pub components: Vec<AssembledComponent>,
    pub config: Bytes,
    pub tokenizer: Bytes,
}

impl ModelBundle {
    pub fn total_bytes(&self) -> u64 {
        let components: u64 = self
            .components
            .iter()
            .map(|c| c.definition.len() as u64 + c.tensor_bytes())
            .sum();
        components + self.config.len() as u64 + self.tokenizer.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_names() {
        assert_eq!(AvailableModel::FlanT5Base.as_str(), "flan_t5_base");
        assert_eq!(
            "flan-t5-small".parse::<AvailableModel>().unwrap(),
            AvailableModel::FlanT5Small
        );
        assert_eq!(
            "FLAN_T5_LARGE".parse::<AvailableModel>().unwrap(),
            AvailableModel::FlanT5Large
        );
        assert!("gpt2".parse::<AvailableModel>().is_err());
    }

    #[test]
    fn test_manifest_parse() {
        let raw = br#"{"models":[{"definition":"enc.onnx","tensors":["a.bin","b.bin.gz"]},{"definition":"dec.onnx","tensors":[]}]}"#;
        let manifest = Manifest::from_slice(raw).unwrap();
        assert_eq!(manifest.models.len(), 2);
        assert_eq!(manifest.models[0].tensors, vec!["a.bin", "b.bin.gz"]);
        assert_eq!(manifest.tensor_count(), 2);
    }

    #[test]
    fn test_manifest_rejects_empty() {
        assert!(matches!(
            Manifest::from_slice(br#"{"models":[]}"#),
            Err(AssetError::Manifest(_))
        ));
        assert!(matches!(
            Manifest::from_slice(br#"{"models":[{"definition":" ","tensors":[]}]}"#),
            Err(AssetError::Manifest(_))
        ));
        assert!(matches!(
            Manifest::from_slice(b"not json"),
            Err(AssetError::Manifest(_))
        ));
    }
}
