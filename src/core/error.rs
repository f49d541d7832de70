use thiserror::Error;

/// Failures surfaced by the stores, the orchestrator and the façade.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("model store not initialized, call init() first")]
    NotInitialized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("expected exactly 1 {table} row for bundle {parent_id}, found {count}")]
    Cardinality {
        table: &'static str,
        parent_id: String,
        count: usize,
    },

    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("could not decompress {name}: {reason}")]
    Decompression { name: String, reason: String },

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported bundle: expected {expected} components, found {found}")]
    UnsupportedBundle { expected: usize, found: usize },

    #[error("session is already initialized")]
    AlreadyInitialized,

    #[error("asset worker is no longer running")]
    Disconnected,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AssetError {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Network and decompression failures abort a bundle fetch the same way.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Decompression { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<tokio::task::JoinError> for AssetError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("background task failed: {}", err))
    }
}

impl From<serde_json::Error> for AssetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Manifest(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AssetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinality_message() {
        let err = AssetError::Cardinality {
            table: "config",
            parent_id: "abc".to_string(),
            count: 0,
        };
        assert_eq!(
            err.to_string(),
            "expected exactly 1 config row for bundle abc, found 0"
        );
    }

    #[test]
    fn test_fetch_failure_grouping() {
        assert!(AssetError::fetch("http://x/a", "404 Not Found").is_fetch_failure());
        assert!(AssetError::Decompression {
            name: "a.gz".to_string(),
            reason: "bad header".to_string(),
        }
        .is_fetch_failure());
        assert!(!AssetError::NotFound("t".to_string()).is_fetch_failure());
        assert!(!AssetError::NotInitialized.is_fetch_failure());
    }
}
