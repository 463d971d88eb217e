//! Namespaced vector index abstraction.
//!
//! One namespace per repository; records carry deterministic ids so that
//! re-ingestion overwrites instead of duplicating. The Qdrant backend maps
//! a namespace to a dedicated collection, which makes namespace scoping and
//! bulk deletion structural rather than filter-based.

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, DeleteCollectionBuilder, Distance, PointStruct, QueryPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde::{Deserialize, Serialize};
use rq_core::Result;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Function,
    Method,
}

/// Metadata stored alongside each embedded chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub repo_id: String,
    pub file_path: String,
    pub function_name: String,
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Deterministic readable id: `{repo_id}:{file_path}:{function_name}`.
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// Trait for vector index backends.
#[async_trait]
pub trait VectorIndex: Send + Sync + 'static {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<()>;

    async fn query(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>>;

    async fn delete_namespace(&self, namespace: &str) -> Result<()>;
}

/// Qdrant-backed vector index.
pub struct QdrantIndex {
    client: Qdrant,
    dimension: u64,
}

impl QdrantIndex {
    pub fn new(url: &str, api_key: Option<&str>, dimension: u64) -> Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| rq_core::Error::UpstreamUnavailable(format!("qdrant connect: {e}")))?;
        Ok(Self { client, dimension })
    }

    fn collection_name(namespace: &str) -> String {
        format!("chunks_{namespace}")
    }

    /// Qdrant point ids must be integers or UUIDs; fold the readable record
    /// id through UUIDv5 so it stays deterministic across re-ingestions.
    fn point_id(record_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, record_id.as_bytes()).to_string()
    }

    async fn ensure_collection(&self, name: &str) -> Result<()> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| rq_core::Error::UpstreamUnavailable(format!("qdrant exists: {e}")))?;
        if exists {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(self.dimension, Distance::Cosine)),
            )
            .await
            .map_err(|e| {
                rq_core::Error::UpstreamUnavailable(format!("qdrant create collection: {e}"))
            })?;
        info!(collection = name, "created vector collection");
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let collection = Self::collection_name(namespace);
        self.ensure_collection(&collection).await?;

        let mut points = Vec::with_capacity(records.len());
        for record in records {
            let mut payload_json = serde_json::to_value(&record.metadata)
                .map_err(|e| rq_core::Error::Internal(format!("chunk metadata encode: {e}")))?;
            if let Some(map) = payload_json.as_object_mut() {
                map.insert("chunk_id".to_string(), serde_json::Value::String(record.id.clone()));
            }
            let payload = Payload::try_from(payload_json)
                .map_err(|e| rq_core::Error::Internal(format!("chunk payload: {e}")))?;

            points.push(PointStruct::new(
                Self::point_id(&record.id),
                record.vector,
                payload,
            ));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(&collection, points).wait(true))
            .await
            .map_err(|e| rq_core::Error::UpstreamUnavailable(format!("qdrant upsert: {e}")))?;
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let collection = Self::collection_name(namespace);
        let exists = self
            .client
            .collection_exists(&collection)
            .await
            .map_err(|e| rq_core::Error::UpstreamUnavailable(format!("qdrant exists: {e}")))?;
        if !exists {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .query(
                QueryPointsBuilder::new(&collection)
                    .query(vector)
                    .limit(top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| rq_core::Error::UpstreamUnavailable(format!("qdrant query: {e}")))?;

        let mut matches = Vec::with_capacity(response.result.len());
        for point in response.result {
            let payload: serde_json::Map<String, serde_json::Value> = point
                .payload
                .iter()
                .map(|(k, v)| (k.clone(), qdrant_value_to_json(v)))
                .collect();

            let id = payload
                .get("chunk_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let metadata: ChunkMetadata =
                serde_json::from_value(serde_json::Value::Object(payload))
                    .map_err(|e| rq_core::Error::Internal(format!("chunk metadata decode: {e}")))?;

            matches.push(VectorMatch { id, score: point.score, metadata });
        }
        Ok(matches)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let collection = Self::collection_name(namespace);
        let exists = self
            .client
            .collection_exists(&collection)
            .await
            .map_err(|e| rq_core::Error::UpstreamUnavailable(format!("qdrant exists: {e}")))?;
        if !exists {
            return Ok(());
        }

        self.client
            .delete_collection(DeleteCollectionBuilder::new(&collection))
            .await
            .map_err(|e| rq_core::Error::UpstreamUnavailable(format!("qdrant delete: {e}")))?;
        info!(collection, "dropped vector collection");
        Ok(())
    }
}

fn qdrant_value_to_json(value: &qdrant_client::qdrant::Value) -> serde_json::Value {
    match &value.kind {
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(*i),
        Some(Kind::DoubleValue(d)) => serde_json::json!(*d),
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::StructValue(map)) => serde_json::Value::Object(
            map.fields
                .iter()
                .map(|(k, v)| (k.clone(), qdrant_value_to_json(v)))
                .collect(),
        ),
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    }
}

/// Build the deterministic record id for a chunk.
pub fn record_id(repo_id: &str, file_path: &str, function_name: &str) -> String {
    format!("{repo_id}:{file_path}:{function_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_is_deterministic() {
        let a = record_id("repo", "a/svc.py", "connect");
        let b = record_id("repo", "a/svc.py", "connect");
        assert_eq!(a, b);
        assert_eq!(a, "repo:a/svc.py:connect");
        assert_eq!(QdrantIndex::point_id(&a), QdrantIndex::point_id(&b));
        assert_ne!(
            QdrantIndex::point_id(&a),
            QdrantIndex::point_id(&record_id("repo", "a/svc.py", "open"))
        );
    }

    #[test]
    fn metadata_serializes_with_type_tag() {
        let meta = ChunkMetadata {
            repo_id: "r".into(),
            file_path: "a.py".into(),
            function_name: "f".into(),
            kind: ChunkKind::Method,
            class_name: Some("Peer".into()),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "method");
        assert_eq!(json["class_name"], "Peer");

        let back: ChunkMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }
}
