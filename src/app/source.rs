use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::core::{AssetError, AvailableModel, ModelBundle, Result};

/// Anything that can hand out reassembled model bundles. Implemented by the
/// in-process [`AssetStore`](super::AssetStore) and by [`RemoteAssetStore`],
/// which forwards to a store living on its own worker thread.
#[async_trait]
pub trait ComponentSource: Send + Sync {
    async fn get_components(&self, model: AvailableModel) -> Result<ModelBundle>;
    async fn is_available(&self, model: AvailableModel) -> Result<bool>;
}

#[async_trait]
impl<T: ComponentSource + ?Sized> ComponentSource for Arc<T> {
    async fn get_components(&self, model: AvailableModel) -> Result<ModelBundle> {
        (**self).get_components(model).await
    }

    async fn is_available(&self, model: AvailableModel) -> Result<bool> {
        (**self).is_available(model).await
    }
}

enum Request {
    GetComponents {
        model: AvailableModel,
        reply: oneshot::Sender<Result<ModelBundle>>,
    },
    IsAvailable {
        model: AvailableModel,
        reply: oneshot::Sender<Result<bool>>,
    },
}

const QUEUE_DEPTH: usize = 32;

/// Proxy to a [`ComponentSource`] running on a dedicated thread with its own
/// runtime. The worker stops once every handle has been dropped.
#[derive(Clone)]
pub struct RemoteAssetStore {
    tx: mpsc::Sender<Request>,
}

impl RemoteAssetStore {
    pub fn spawn<S>(source: S) -> Result<Self>
    where
        S: ComponentSource + 'static,
    {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        std::thread::Builder::new()
            .name("asset-worker".to_string())
            .spawn(move || run_worker(Arc::new(source), rx))
            .map_err(|e| AssetError::Internal(format!("spawn asset worker: {}", e)))?;
        Ok(Self { tx })
    }

    async fn send(&self, request: Request) -> Result<()> {
        self.tx.send(request).await.map_err(|_| AssetError::Disconnected)
    }
}

fn run_worker<S: ComponentSource + 'static>(source: Arc<S>, mut rx: mpsc::Receiver<Request>) {
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "asset worker could not start a runtime");
            return;
        }
    };

    rt.block_on(async move {
        while let Some(request) = rx.recv().await {
            let source = Arc::clone(&source);
            tokio::spawn(async move {
                match request {
                    Request::GetComponents { model, reply } => {
                        let _ = reply.send(source.get_components(model).await);
                    }
                    Request::IsAvailable { model, reply } => {
                        let _ = reply.send(source.is_available(model).await);
                    }
                }
            });
        }
        tracing::debug!("asset worker shutting down");
    });
}

#[async_trait]
impl ComponentSource for RemoteAssetStore {
    async fn get_components(&self, model: AvailableModel) -> Result<ModelBundle> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::GetComponents { model, reply }).await?;
        rx.await.map_err(|_| AssetError::Disconnected)?
    }

    async fn is_available(&self, model: AvailableModel) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::IsAvailable { model, reply }).await?;
        rx.await.map_err(|_| AssetError::Disconnected)?
    }
}
