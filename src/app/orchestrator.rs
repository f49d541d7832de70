use futures::future::try_join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{OwnedMutexGuard, Semaphore};

use crate::core::{AssetError, AvailableModel, BundleId, Result, TensorId};
use crate::infra::fetch::{tensor_name, CONFIG_FILE, TOKENIZER_FILE};
use crate::infra::{Fetcher, ModelDb, Origin};

pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// How tensor dedup behaves when two fetches race on the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// Check-then-insert without coordination. Concurrent bundle fetches that
    /// share a tensor name may both store it; readers tolerate the duplicate.
    #[default]
    Optimistic,
    /// Check-then-insert is serialised per tensor name.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchProgress {
    Manifest { components: usize, tensors: usize },
    TensorCached { name: String },
    TensorFetched { name: String, bytes: u64 },
    Component { index: u32, name: String },
    Metadata,
    Registered { bundle_id: BundleId },
}

pub type ProgressFn = Arc<dyn Fn(FetchProgress) + Send + Sync>;

/// Downloads a bundle and commits it table by table, registering it in the
/// index only once everything else has landed.
pub struct BundleFetcher<F> {
    db: ModelDb,
    origin: Origin<F>,
    gate: Arc<Semaphore>,
    dedup: DedupPolicy,
    name_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    progress: Option<ProgressFn>,
}

impl<F: Fetcher> BundleFetcher<F> {
    pub fn new(db: ModelDb, origin: Origin<F>) -> Self {
        Self {
            db,
            origin,
            gate: Arc::new(Semaphore::new(DEFAULT_FETCH_CONCURRENCY)),
            dedup: DedupPolicy::default(),
            name_locks: Mutex::new(HashMap::new()),
            progress: None,
        }
    }

    pub fn concurrency(mut self, permits: usize) -> Self {
        self.gate = Arc::new(Semaphore::new(permits.max(1)));
        self
    }

    pub fn dedup(mut self, policy: DedupPolicy) -> Self {
        self.dedup = policy;
        self
    }

    pub fn on_progress<P>(mut self, callback: P) -> Self
    where
        P: Fn(FetchProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn origin(&self) -> &Origin<F> {
        &self.origin
    }

    fn emit(&self, event: FetchProgress) {
        if let Some(cb) = &self.progress {
            cb(event);
        }
    }

    /// Runs the whole download. On error nothing is registered, so the next
    /// attempt starts over and reuses whatever tensors already landed.
    pub async fn fetch_bundle(&self, model: AvailableModel) -> Result<BundleId> {
        let bundle_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(model = %model, bundle = %bundle_id, "fetching bundle");

        match self.fetch_into(model, &bundle_id).await {
            Ok(registered) => {
                tracing::info!(model = %model, bundle = %registered, "bundle registered");
                self.emit(FetchProgress::Registered {
                    bundle_id: registered.clone(),
                });
                Ok(registered)
            }
            Err(e) => {
                tracing::warn!(model = %model, bundle = %bundle_id, error = %e, "bundle fetch aborted");
                Err(e)
            }
        }
    }

    async fn fetch_into(&self, model: AvailableModel, bundle_id: &str) -> Result<BundleId> {
        let manifest = self.origin.fetch_manifest(model).await?;
        self.emit(FetchProgress::Manifest {
            components: manifest.models.len(),
            tensors: manifest.tensor_count(),
        });

        for (index, component) in manifest.models.iter().enumerate() {
            let index = index as u32;

            // Every tensor needs an id before the component row can reference it.
            let tensor_ids = try_join_all(
                component
                    .tensors
                    .iter()
                    .map(|file| self.ensure_tensor(model, file)),
            )
            .await?;

            let definition = self.origin.fetch_file(model, &component.definition).await?;
            let name = component_name(&component.definition);
            self.db
                .components()
                .insert(&name, &tensor_ids, index, bundle_id, definition)
                .await?;

            tracing::debug!(model = %model, index, component = %name, tensors = tensor_ids.len(), "component stored");
            self.emit(FetchProgress::Component { index, name });
        }

        let (config, tokenizer) = tokio::try_join!(
            self.origin.fetch_file(model, CONFIG_FILE),
            self.origin.fetch_file(model, TOKENIZER_FILE),
        )?;
        self.db
            .insert_bundle_metadata(bundle_id, config, tokenizer)
            .await?;
        self.emit(FetchProgress::Metadata);

        self.db.index().register(model, bundle_id).await
    }

    /// Dedup-or-fetch for one tensor file, admitted through the fetch gate.
    pub async fn ensure_tensor(&self, model: AvailableModel, file: &str) -> Result<TensorId> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| AssetError::Internal("fetch gate closed".to_string()))?;

        let name = tensor_name(file);
        match self.dedup {
            DedupPolicy::Optimistic => self.store_tensor(model, file, name).await,
            DedupPolicy::Strict => {
                let guard = self.lock_name(name).await;
                let result = self.store_tensor(model, file, name).await;
                drop(guard);
                self.release_name(name);
                result
            }
        }
    }

    async fn store_tensor(&self, model: AvailableModel, file: &str, name: &str) -> Result<TensorId> {
        let tensors = self.db.tensors();
        if let Some(id) = tensors.exists(name).await? {
            tracing::debug!(tensor = %name, "tensor cached");
            self.emit(FetchProgress::TensorCached {
                name: name.to_string(),
            });
            return Ok(id);
        }

        let bytes = self.origin.fetch_file(model, file).await?;
        let size = bytes.len() as u64;
        let id = tensors.insert(name, bytes).await?;

        tracing::debug!(tensor = %name, bytes = size, "tensor fetched");
        self.emit(FetchProgress::TensorFetched {
            name: name.to_string(),
            bytes: size,
        });
        Ok(id)
    }

    async fn lock_name(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.name_locks.lock();
            Arc::clone(locks.entry(name.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drops the lock for `name` once no task holds or waits on it.
    fn release_name(&self, name: &str) {
        let mut locks = self.name_locks.lock();
        if locks.get(name).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(name);
        }
    }
}

/// `encoder.onnx.gz` -> `encoder`.
fn component_name(definition_file: &str) -> String {
    let file = tensor_name(definition_file);
    Path::new(file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    struct Counting {
        hits: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for Counting {
        async fn fetch(&self, url: &Url) -> Result<Bytes> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::copy_from_slice(url.path().as_bytes()))
        }
    }

    #[test]
    fn test_component_name() {
        assert_eq!(component_name("encoder.onnx"), "encoder");
        assert_eq!(component_name("decoder.onnx.gz"), "decoder");
        assert_eq!(component_name("enc"), "enc");
    }

    #[tokio::test]
    async fn test_ensure_tensor_reuses_id() {
        let db = ModelDb::in_memory().await.unwrap();
        let origin = Origin::new(
            Counting {
                hits: AtomicUsize::new(0),
            },
            "http://origin",
        )
        .unwrap();
        let fetcher = BundleFetcher::new(db.clone(), origin);

        let first = fetcher
            .ensure_tensor(AvailableModel::FlanT5Small, "a.bin")
            .await
            .unwrap();
        let second = fetcher
            .ensure_tensor(AvailableModel::FlanT5Small, "a.bin")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(db.tensors().count_named("a.bin").await.unwrap(), 1);
        assert_eq!(fetcher.origin().fetcher().hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_strict_dedup_under_race() {
        let db = ModelDb::in_memory().await.unwrap();
        let origin = Origin::new(
            Counting {
                hits: AtomicUsize::new(0),
            },
            "http://origin",
        )
        .unwrap();
        let fetcher = BundleFetcher::new(db.clone(), origin).dedup(DedupPolicy::Strict);

        let ids = try_join_all((0..6).map(|_| fetcher.ensure_tensor(AvailableModel::FlanT5Base, "shared.bin")))
            .await
            .unwrap();

        assert!(ids.iter().all(|id| id == &ids[0]));
        assert_eq!(db.tensors().count_named("shared.bin").await.unwrap(), 1);
        assert!(fetcher.name_locks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_strict_locks_released_on_failure() {
        struct Failing;

        #[async_trait]
        impl Fetcher for Failing {
            async fn fetch(&self, url: &Url) -> Result<Bytes> {
                Err(AssetError::fetch(url.as_str(), "503 Service Unavailable"))
            }
        }

        let db = ModelDb::in_memory().await.unwrap();
        let origin = Origin::new(Failing, "http://origin").unwrap();
        let fetcher = BundleFetcher::new(db, origin).dedup(DedupPolicy::Strict);

        for file in ["a.bin", "b.bin", "c.bin"] {
            let err = fetcher
                .ensure_tensor(AvailableModel::FlanT5Small, file)
                .await
                .unwrap_err();
            assert!(err.is_fetch_failure());
        }
        assert!(fetcher.name_locks.lock().is_empty());
    }
}
