use bytes::Bytes;
use rusqlite::params;

use super::ModelDb;
use crate::core::{AssetError, Result};

/// Per-bundle singleton tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataTable {
    Config,
    Tokenizer,
}

impl MetadataTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataTable::Config => "config",
            MetadataTable::Tokenizer => "tokenizer",
        }
    }
}

#[derive(Clone)]
pub struct MetadataStore {
    db: ModelDb,
    table: MetadataTable,
}

impl MetadataStore {
    pub(super) fn new(db: ModelDb, table: MetadataTable) -> Self {
        Self { db, table }
    }

    pub fn table(&self) -> MetadataTable {
        self.table
    }

    pub async fn insert(&self, parent_id: &str, bytes: Bytes) -> Result<()> {
        let table = self.table;
        let parent_id = parent_id.to_owned();
        self.db
            .call(move |conn| {
                insert_row(conn, table, &parent_id, &bytes)?;
                Ok(())
            })
            .await
    }

    /// The single blob stored for `parent_id`. Zero or several rows means the
    /// bundle was only partly committed.
    pub async fn get_by_parent(&self, parent_id: &str) -> Result<Bytes> {
        let table = self.table;
        let parent = parent_id.to_owned();
        let mut rows = self
            .db
            .call(move |conn| {
                let sql = format!("SELECT bytes FROM {} WHERE parent_id = ?1", table.as_str());
                let rows = conn
                    .prepare_cached(&sql)?
                    .query_map(params![parent], |row| row.get::<_, Vec<u8>>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        if rows.len() != 1 {
            return Err(AssetError::Cardinality {
                table: table.as_str(),
                parent_id: parent_id.to_owned(),
                count: rows.len(),
            });
        }
        Ok(Bytes::from(rows.remove(0)))
    }
}

fn insert_row(
    conn: &rusqlite::Connection,
    table: MetadataTable,
    parent_id: &str,
    bytes: &[u8],
) -> rusqlite::Result<()> {
    let sql = format!(
        "INSERT INTO {} (id, parent_id, bytes) VALUES (?1, ?2, ?3)",
        table.as_str()
    );
    conn.prepare_cached(&sql)?
        .execute(params![uuid::Uuid::new_v4().to_string(), parent_id, bytes])?;
    Ok(())
}

impl ModelDb {
    /// Writes a bundle's config and tokenizer together: both rows or neither.
    pub async fn insert_bundle_metadata(
        &self,
        parent_id: &str,
        config: Bytes,
        tokenizer: Bytes,
    ) -> Result<()> {
        let parent_id = parent_id.to_owned();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            insert_row(&tx, MetadataTable::Config, &parent_id, &config)?;
            insert_row(&tx, MetadataTable::Tokenizer, &parent_id, &tokenizer)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exactly_one_row() {
        let db = ModelDb::in_memory().await.unwrap();
        let config = db.config();

        let err = config.get_by_parent("p").await.unwrap_err();
        assert!(matches!(err, AssetError::Cardinality { count: 0, .. }));

        config.insert("p", Bytes::from_static(b"{}")).await.unwrap();
        assert_eq!(&config.get_by_parent("p").await.unwrap()[..], b"{}");

        config.insert("p", Bytes::from_static(b"{ }")).await.unwrap();
        let err = config.get_by_parent("p").await.unwrap_err();
        assert!(matches!(
            err,
            AssetError::Cardinality { table: "config", count: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_bundle_metadata_pair() {
        let db = ModelDb::in_memory().await.unwrap();
        db.insert_bundle_metadata("p", Bytes::from_static(b"cfg"), Bytes::from_static(b"tok"))
            .await
            .unwrap();

        assert_eq!(&db.config().get_by_parent("p").await.unwrap()[..], b"cfg");
        assert_eq!(&db.tokenizer().get_by_parent("p").await.unwrap()[..], b"tok");
        assert_eq!(db.tokenizer().table(), MetadataTable::Tokenizer);
    }
}
