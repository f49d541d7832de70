//! SQLite-backed model store.
//!
//! One database file holds every table the cache needs:
//!
//! - `tensors`: named weight blobs, looked up by name for dedup
//! - `components`: encoder/decoder definitions referencing tensor ids
//! - `config` / `tokenizer`: one blob per bundle
//! - `available_models`: logical model name -> bundle id, written last
//!
//! The handle is cheap to clone and must be passed explicitly. Calls run on
//! the blocking pool so the async scheduler is never held by SQLite.

mod components;
mod index;
mod metadata;
mod tensors;

pub use components::ComponentStore;
pub use index::BundleIndex;
pub use metadata::{MetadataStore, MetadataTable};
pub use tensors::TensorStore;

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::core::{AssetError, Result};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS available_models (
        model TEXT PRIMARY KEY,
        parent_id TEXT NOT NULL,
        registered_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tensors (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        bytes BLOB NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_tensors_name ON tensors(name);

    CREATE TABLE IF NOT EXISTS components (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        parent_id TEXT NOT NULL,
        ordinal INTEGER NOT NULL,
        tensor_ids TEXT NOT NULL,
        definition BLOB NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_components_parent ON components(parent_id);

    CREATE TABLE IF NOT EXISTS config (
        id TEXT PRIMARY KEY,
        parent_id TEXT NOT NULL,
        bytes BLOB NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_config_parent ON config(parent_id);

    CREATE TABLE IF NOT EXISTS tokenizer (
        id TEXT PRIMARY KEY,
        parent_id TEXT NOT NULL,
        bytes BLOB NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_tokenizer_parent ON tokenizer(parent_id);
";

#[derive(Clone)]
pub struct ModelDb {
    inner: Arc<Inner>,
}

struct Inner {
    path: Option<PathBuf>,
    conn: OnceLock<Arc<Mutex<Connection>>>,
}

impl ModelDb {
    /// Unopened handle backed by a file. Call [`ModelDb::init`] before use.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_path(Some(path.as_ref().to_path_buf()))
    }

    /// Unopened handle backed by a private in-memory database.
    pub fn memory() -> Self {
        Self::with_path(None)
    }

    fn with_path(path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path,
                conn: OnceLock::new(),
            }),
        }
    }

    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Self::new(path);
        db.init().await?;
        Ok(db)
    }

    pub async fn in_memory() -> Result<Self> {
        let db = Self::memory();
        db.init().await?;
        Ok(db)
    }

    /// Opens the connection and creates any missing tables. Safe to repeat.
    pub async fn init(&self) -> Result<()> {
        if let Some(conn) = self.inner.conn.get() {
            let conn = Arc::clone(conn);
            return tokio::task::spawn_blocking(move || -> Result<()> {
                conn.lock().execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        }

        let path = self.inner.path.clone();
        let conn = tokio::task::spawn_blocking(move || Self::connect(path.as_deref())).await??;

        if self.inner.conn.set(Arc::new(Mutex::new(conn))).is_err() {
            tracing::debug!("model store initialized concurrently, keeping first connection");
        }

        tracing::info!(path = ?self.inner.path, "model store ready");
        Ok(())
    }

    fn connect(path: Option<&Path>) -> Result<Connection> {
        let conn = match path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            AssetError::Config(format!("cannot create {}: {}", parent.display(), e))
                        })?;
                    }
                }
                let conn = Connection::open(path)?;
                conn.execute_batch(
                    "
                    PRAGMA journal_mode=WAL;
                    PRAGMA busy_timeout=30000;
                    PRAGMA synchronous=NORMAL;
                    ",
                )?;
                conn
            }
            None => Connection::open_in_memory()?,
        };
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.conn.get().is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    fn conn(&self) -> Result<Arc<Mutex<Connection>>> {
        self.inner
            .conn
            .get()
            .cloned()
            .ok_or(AssetError::NotInitialized)
    }

    /// Runs `f` against the connection on the blocking pool.
    pub(crate) async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn()?;
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await?
    }

    pub fn tensors(&self) -> TensorStore {
        TensorStore::new(self.clone())
    }

    pub fn components(&self) -> ComponentStore {
        ComponentStore::new(self.clone())
    }

    pub fn config(&self) -> MetadataStore {
        MetadataStore::new(self.clone(), MetadataTable::Config)
    }

    pub fn tokenizer(&self) -> MetadataStore {
        MetadataStore::new(self.clone(), MetadataTable::Tokenizer)
    }

    pub fn index(&self) -> BundleIndex {
        BundleIndex::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AvailableModel;

    #[tokio::test]
    async fn test_uninitialized_access() {
        let db = ModelDb::memory();
        assert!(!db.is_initialized());

        let err = db.tensors().exists("a").await.unwrap_err();
        assert!(matches!(err, AssetError::NotInitialized));

        let err = db.index().lookup(AvailableModel::FlanT5Small).await.unwrap_err();
        assert!(matches!(err, AssetError::NotInitialized));
    }

    #[tokio::test]
    async fn test_reinit_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("models.sqlite");

        let db = ModelDb::open(&path).await.unwrap();
        let id = db.tensors().insert("a", b"aaaa".to_vec().into()).await.unwrap();
        db.init().await.unwrap();
        assert_eq!(db.tensors().exists("a").await.unwrap(), Some(id.clone()));
        drop(db);

        let reopened = ModelDb::open(&path).await.unwrap();
        assert_eq!(reopened.tensors().exists("a").await.unwrap(), Some(id));
    }
}
