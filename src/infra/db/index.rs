use rusqlite::{params, OptionalExtension};

use super::ModelDb;
use crate::core::{AvailableModel, BundleEntry, BundleId, Result};

/// Logical model name -> owning bundle. An entry here is the only proof that
/// a bundle finished downloading.
#[derive(Clone)]
pub struct BundleIndex {
    db: ModelDb,
}

impl BundleIndex {
    pub(super) fn new(db: ModelDb) -> Self {
        Self { db }
    }

    pub async fn lookup(&self, model: AvailableModel) -> Result<Option<BundleId>> {
        self.db
            .call(move |conn| {
                let id = conn
                    .prepare_cached("SELECT parent_id FROM available_models WHERE model = ?1")?
                    .query_row(params![model.as_str()], |row| row.get(0))
                    .optional()?;
                Ok(id)
            })
            .await
    }

    /// Marks `parent_id` as the complete bundle for `model`. A registered entry
    /// is never replaced; the id already on record is returned instead.
    pub async fn register(&self, model: AvailableModel, parent_id: &str) -> Result<BundleId> {
        let parent_id = parent_id.to_owned();
        let registered_at = chrono::Utc::now().to_rfc3339();
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO available_models (model, parent_id, registered_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(model) DO NOTHING",
                    params![model.as_str(), parent_id, registered_at],
                )?;
                let winner: String = tx.query_row(
                    "SELECT parent_id FROM available_models WHERE model = ?1",
                    params![model.as_str()],
                    |row| row.get(0),
                )?;
                tx.commit()?;
                Ok(winner)
            })
            .await
    }

    pub async fn entry(&self, model: AvailableModel) -> Result<Option<BundleEntry>> {
        Ok(self.list().await?.into_iter().find(|e| e.model == model))
    }

    pub async fn list(&self) -> Result<Vec<BundleEntry>> {
        let rows = self
            .db
            .call(|conn| {
                let rows = conn
                    .prepare_cached(
                        "SELECT model, parent_id, registered_at FROM available_models ORDER BY model",
                    )?
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for (model, bundle_id, registered_at) in rows {
            match model.parse::<AvailableModel>() {
                Ok(model) => entries.push(BundleEntry {
                    model,
                    bundle_id,
                    registered_at,
                }),
                Err(_) => tracing::warn!(model = %model, "skipping index entry for unknown model"),
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_is_terminal() {
        let db = ModelDb::in_memory().await.unwrap();
        let index = db.index();

        assert_eq!(index.lookup(AvailableModel::FlanT5Base).await.unwrap(), None);

        let first = index.register(AvailableModel::FlanT5Base, "bundle-1").await.unwrap();
        assert_eq!(first, "bundle-1");

        let second = index.register(AvailableModel::FlanT5Base, "bundle-2").await.unwrap();
        assert_eq!(second, "bundle-1");
        assert_eq!(
            index.lookup(AvailableModel::FlanT5Base).await.unwrap().as_deref(),
            Some("bundle-1")
        );
    }

    #[tokio::test]
    async fn test_list_entries() {
        let db = ModelDb::in_memory().await.unwrap();
        let index = db.index();

        index.register(AvailableModel::FlanT5Small, "s").await.unwrap();
        index.register(AvailableModel::FlanT5Large, "l").await.unwrap();

        let entries = index.list().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.model == AvailableModel::FlanT5Small && e.bundle_id == "s"));

        let entry = index.entry(AvailableModel::FlanT5Large).await.unwrap().unwrap();
        assert_eq!(entry.bundle_id, "l");
        assert!(chrono::DateTime::parse_from_rfc3339(&entry.registered_at).is_ok());
        assert!(index.entry(AvailableModel::FlanT5Base).await.unwrap().is_none());
    }
}
