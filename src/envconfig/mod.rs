use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::app::{AssetStore, BundleFetcher, DedupPolicy, DEFAULT_FETCH_CONCURRENCY};
use crate::core::Result;
use crate::infra::{HttpFetcher, ModelDb, Origin};

pub const DEFAULT_REMOTE_URL: &str = "https://rmbl.us";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct AssetConfig {
    pub remote_url: String,
    pub db_path: PathBuf,
    pub fetch_concurrency: usize,
    pub timeout: Duration,
    pub dedup: DedupPolicy,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            remote_url: DEFAULT_REMOTE_URL.to_string(),
            db_path: default_db_path(),
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            dedup: DedupPolicy::Optimistic,
        }
    }
}

impl AssetConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` knows. Unparseable values keep
    /// the default.
    pub fn from_lookup<L>(lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("MODEL_ASSETS_REMOTE_URL") {
            if !url.trim().is_empty() {
                config.remote_url = url.trim().to_string();
            }
        }

        if let Some(path) = lookup("MODEL_ASSETS_DB") {
            config.db_path = expand_home(&path);
        }

        if let Some(n) = lookup("MODEL_ASSETS_FETCH_CONCURRENCY") {
            if let Ok(n) = n.trim().parse::<usize>() {
                if n > 0 {
                    config.fetch_concurrency = n;
                }
            }
        }

        if let Some(secs) = lookup("MODEL_ASSETS_TIMEOUT") {
            if let Ok(secs) = secs.trim().parse::<u64>() {
                config.timeout = Duration::from_secs(secs);
            }
        }

        if let Some(strict) = lookup("MODEL_ASSETS_STRICT_DEDUP") {
            if matches!(strict.trim().to_lowercase().as_str(), "1" | "true" | "yes") {
                config.dedup = DedupPolicy::Strict;
            }
        }

        config
    }

    /// Wires a ready-to-use store over HTTP. The database is opened and its
    /// schema ensured here.
    pub async fn open_store(&self) -> Result<AssetStore<HttpFetcher>> {
        let db = ModelDb::open(&self.db_path).await?;
        let origin = Origin::new(HttpFetcher::new(self.timeout)?, &self.remote_url)?;
        Ok(AssetStore::with_fetcher(db.clone(), self.bundle_fetcher(db, origin)))
    }

    pub fn bundle_fetcher<F: crate::infra::Fetcher>(
        &self,
        db: ModelDb,
        origin: Origin<F>,
    ) -> BundleFetcher<F> {
        BundleFetcher::new(db, origin)
            .concurrency(self.fetch_concurrency)
            .dedup(self.dedup)
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".model-assets")
        .join("models.sqlite")
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
