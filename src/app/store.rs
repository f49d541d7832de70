use async_trait::async_trait;
use std::sync::Arc;

use super::orchestrator::BundleFetcher;
use super::source::ComponentSource;
use crate::core::{AssembledComponent, AssetError, AvailableModel, ModelBundle, Result};
use crate::infra::{Fetcher, ModelDb, Origin};

/// Cache-or-fetch entry point: hands back reassembled bundles whether they
/// came from disk or were just downloaded.
pub struct AssetStore<F> {
    db: ModelDb,
    fetcher: Arc<BundleFetcher<F>>,
}

impl<F> Clone for AssetStore<F> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            fetcher: Arc::clone(&self.fetcher),
        }
    }
}

impl<F: Fetcher> AssetStore<F> {
    pub fn new(db: ModelDb, origin: Origin<F>) -> Self {
        let fetcher = BundleFetcher::new(db.clone(), origin);
        Self::with_fetcher(db, fetcher)
    }

    pub fn with_fetcher(db: ModelDb, fetcher: BundleFetcher<F>) -> Self {
        Self {
            db,
            fetcher: Arc::new(fetcher),
        }
    }

    pub fn db(&self) -> &ModelDb {
        &self.db
    }

    pub fn bundle_fetcher(&self) -> &BundleFetcher<F> {
        &self.fetcher
    }

    /// Components for `model` in ordinal order, downloading the bundle first
    /// if the index has never seen it.
    pub async fn get_components(&self, model: AvailableModel) -> Result<ModelBundle> {
        let index = self.db.index();
        let bundle_id = match index.lookup(model).await? {
            Some(id) => {
                tracing::debug!(model = %model, bundle = %id, "bundle cached");
                id
            }
            None => {
                self.fetcher.fetch_bundle(model).await?;
                index.lookup(model).await?.ok_or_else(|| {
                    AssetError::NotFound(format!("index entry for {} after fetch", model))
                })?
            }
        };
        self.assemble(model, bundle_id).await
    }

    /// Like [`AssetStore::get_components`] but never touches the network.
    pub async fn cached_components(&self, model: AvailableModel) -> Result<Option<ModelBundle>> {
        match self.db.index().lookup(model).await? {
            Some(id) => Ok(Some(self.assemble(model, id).await?)),
            None => Ok(None),
        }
    }

    pub async fn is_available(&self, model: AvailableModel) -> Result<bool> {
        Ok(self.db.index().lookup(model).await?.is_some())
    }

    async fn assemble(&self, model: AvailableModel, bundle_id: String) -> Result<ModelBundle> {
        let stored = self.db.components().list_by_parent(&bundle_id).await?;
        if stored.is_empty() {
            return Err(AssetError::NotFound(format!("components for bundle {}", bundle_id)));
        }

        let tensors = self.db.tensors();
        let mut components = Vec::with_capacity(stored.len());
        for component in stored {
            let map = tensors.get_many(&component.tensor_ids).await?;
            components.push(AssembledComponent {
                name: component.name,
                definition: component.definition,
                tensors: map,
            });
        }

        let config = self.db.config().get_by_parent(&bundle_id).await?;
        let tokenizer = self.db.tokenizer().get_by_parent(&bundle_id).await?;

        Ok(ModelBundle {
            model,
            bundle_id,
            components,
            config,
            tokenizer,
        })
    }
}

#[async_trait]
impl<F: Fetcher + 'static> ComponentSource for AssetStore<F> {
    async fn get_components(&self, model: AvailableModel) -> Result<ModelBundle> {
        AssetStore::get_components(self, model).await
    }

    async fn is_available(&self, model: AvailableModel) -> Result<bool> {
        AssetStore::is_available(self, model).await
    }
}
