use bytes::Bytes;
use rusqlite::params;

use super::ModelDb;
use crate::core::{AssetError, BundleId, ComponentId, ModelComponent, Result, TensorId};

#[derive(Clone)]
pub struct ComponentStore {
    db: ModelDb,
}

impl ComponentStore {
    pub(super) fn new(db: ModelDb) -> Self {
        Self { db }
    }

    pub async fn insert(
        &self,
        name: &str,
        tensor_ids: &[TensorId],
        index: u32,
        parent_id: &str,
        definition: Bytes,
    ) -> Result<ComponentId> {
        let id = uuid::Uuid::new_v4().to_string();
        let row_id = id.clone();
        let name = name.to_owned();
        let parent_id = parent_id.to_owned();
        let tensor_ids = serde_json::to_string(tensor_ids)
            .map_err(|e| AssetError::Internal(format!("encode tensor ids: {}", e)))?;

        self.db
            .call(move |conn| {
                conn.prepare_cached(
                    "INSERT INTO components (id, name, parent_id, ordinal, tensor_ids, definition)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?
                .execute(params![row_id, name, parent_id, index, tensor_ids, &definition[..]])?;
                Ok(())
            })
            .await?;
        Ok(id)
    }

    /// Components of a bundle sorted by ordinal, whatever order they landed in.
    pub async fn list_by_parent(&self, parent_id: &str) -> Result<Vec<ModelComponent>> {
        let parent = parent_id.to_owned();
        let rows = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, name, parent_id, ordinal, tensor_ids, definition
                     FROM components WHERE parent_id = ?1",
                )?;
                let rows = stmt
                    .query_map(params![parent], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, u32>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, Vec<u8>>(5)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut components = rows
            .into_iter()
            .map(|(id, name, parent_id, index, tensor_ids, definition)| {
                let tensor_ids: Vec<TensorId> = serde_json::from_str(&tensor_ids).map_err(|e| {
                    AssetError::Internal(format!("component {} has corrupt tensor ids: {}", id, e))
                })?;
                Ok(ModelComponent {
                    id,
                    name,
                    parent_id: BundleId::from(parent_id),
                    index,
                    tensor_ids,
                    definition: Bytes::from(definition),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        components.sort_by_key(|c| c.index);
        Ok(components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_sorted_by_index() {
        let db = ModelDb::in_memory().await.unwrap();
        let components = db.components();
        let ids = vec!["t1".to_string(), "t2".to_string()];

        components
            .insert("decoder.onnx", &ids[1..], 1, "bundle", Bytes::from_static(b"dec"))
            .await
            .unwrap();
        components
            .insert("encoder.onnx", &ids, 0, "bundle", Bytes::from_static(b"enc"))
            .await
            .unwrap();
        components
            .insert("other.onnx", &[], 0, "other-bundle", Bytes::new())
            .await
            .unwrap();

        let listed = components.list_by_parent("bundle").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "encoder.onnx");
        assert_eq!(listed[0].index, 0);
        assert_eq!(listed[0].tensor_ids, ids);
        assert_eq!(&listed[0].definition[..], b"enc");
        assert_eq!(listed[1].name, "decoder.onnx");
        assert_eq!(listed[1].tensor_ids, vec!["t2".to_string()]);

        assert!(components.list_by_parent("missing").await.unwrap().is_empty());
    }
}
