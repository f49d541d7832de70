use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

use super::ModelDb;
use crate::core::{AssetError, Result, Tensor, TensorId};

const SELECT_BY_ID: &str = "SELECT name, bytes FROM tensors WHERE id = ?1";

/// Content-addressed weight blobs. A tensor's name is its dedup key.
#[derive(Clone)]
pub struct TensorStore {
    db: ModelDb,
}

impl TensorStore {
    pub(super) fn new(db: ModelDb) -> Self {
        Self { db }
    }

    /// Id of a previously stored tensor with exactly this name.
    pub async fn exists(&self, name: &str) -> Result<Option<TensorId>> {
        let name = name.to_owned();
        self.db
            .call(move |conn| {
                let id = conn
                    .prepare_cached("SELECT id FROM tensors WHERE name = ?1 LIMIT 1")?
                    .query_row(params![name], |row| row.get(0))
                    .optional()?;
                Ok(id)
            })
            .await
    }

    /// Stores a new row. No upsert: callers check [`TensorStore::exists`] first.
    pub async fn insert(&self, name: &str, bytes: Bytes) -> Result<TensorId> {
        let id = uuid::Uuid::new_v4().to_string();
        let name = name.to_owned();
        let row_id = id.clone();
        self.db
            .call(move |conn| {
                conn.prepare_cached("INSERT INTO tensors (id, name, bytes) VALUES (?1, ?2, ?3)")?
                    .execute(params![row_id, name, &bytes[..]])?;
                Ok(())
            })
            .await?;
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Result<Tensor> {
        let id = id.to_owned();
        self.db.call(move |conn| load(conn, &id)).await
    }

    /// Batch read keyed by tensor name. Any missing id is an integrity error.
    pub async fn get_many(&self, ids: &[TensorId]) -> Result<HashMap<String, Bytes>> {
        let ids = ids.to_vec();
        let tensors = self
            .db
            .call(move |conn| {
                let mut tensors = HashMap::with_capacity(ids.len());
                for id in &ids {
                    let tensor = load(conn, id)?;
                    tensors.insert(tensor.name, tensor.bytes);
                }
                Ok(tensors)
            })
            .await?;

        let total: usize = tensors.values().map(|b| b.len()).sum();
        tracing::debug!(count = tensors.len(), bytes = total, "loaded tensors");
        Ok(tensors)
    }

    pub async fn count_named(&self, name: &str) -> Result<usize> {
        let name = name.to_owned();
        self.db
            .call(move |conn| {
                let count: i64 = conn
                    .prepare_cached("SELECT COUNT(*) FROM tensors WHERE name = ?1")?
                    .query_row(params![name], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
    }

    pub async fn count(&self) -> Result<usize> {
        self.db
            .call(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM tensors", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
    }

    pub async fn total_bytes(&self) -> Result<u64> {
        self.db
            .call(|conn| {
                let total: i64 = conn.query_row(
                    "SELECT COALESCE(SUM(LENGTH(bytes)), 0) FROM tensors",
                    [],
                    |row| row.get(0),
                )?;
                Ok(total as u64)
            })
            .await
    }
}

fn load(conn: &Connection, id: &str) -> Result<Tensor> {
    let row: Option<(String, Vec<u8>)> = conn
        .prepare_cached(SELECT_BY_ID)?
        .query_row(params![id], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?;
    let (name, bytes) = row.ok_or_else(|| AssetError::NotFound(format!("tensor {}", id)))?;
    Ok(Tensor {
        id: id.to_string(),
        name,
        bytes: Bytes::from(bytes),
    })
}
