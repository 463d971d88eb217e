//! Shared handles: one `Platform` per process, built once at startup and
//! borrowed by HTTP handlers and worker tasks alike.

use std::sync::Arc;

use rq_agent::{ChatModel, QueryAgent};
use rq_core::{Result, SecretStore};
use rq_engine::fetch::FileReader;
use rq_engine::graph::CodeGraph;
use rq_engine::vector::VectorIndex;
use rq_engine::{Embedder, IngestConfig};
use sqlx::PgPool;

use crate::jobs::JobQueue;
use crate::store::{ChatHistoryStore, ConfiguredModel, DataSourceStore, MemoryStore, ModelStore};

pub struct Platform {
    pub db: PgPool,
    pub graph: Arc<dyn CodeGraph>,
    pub vectors: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn ChatModel>,
    pub secrets: Arc<dyn SecretStore>,
    pub files: Arc<dyn FileReader>,
    pub agent: QueryAgent,
    pub jobs: JobQueue,
    pub ingest: IngestConfig,
    pub auth_token: String,
    pub auth_user: String,
    /// Key handed to the embedder and to utility LLM calls when no
    /// per-model secret applies. Comes from `LLM_API_KEY`.
    pub fallback_llm_key: Option<String>,
}

pub type AppState = Arc<Platform>;

impl Platform {
    pub fn data_sources(&self) -> DataSourceStore {
        DataSourceStore::new(self.db.clone())
    }

    pub fn chat_history(&self) -> ChatHistoryStore {
        ChatHistoryStore::new(self.db.clone())
    }

    pub fn memory(&self) -> MemoryStore {
        MemoryStore::new(self.db.clone())
    }

    pub fn models(&self) -> ModelStore {
        ModelStore::new(self.db.clone())
    }

    /// Key for background/utility LLM calls: the stored default secret,
    /// falling back to the environment-provided key.
    pub async fn utility_api_key(&self) -> Result<String> {
        if let Some(key) = self.secrets.get(rq_core::secrets::services::LLM_API_KEY).await? {
            return Ok(key);
        }
        self.fallback_llm_key
            .clone()
            .ok_or_else(|| rq_core::Error::NotConfigured("no LLM API key is configured".into()))
    }

    /// Key for a user-selected model: its referenced secret, or the
    /// utility key for models without one.
    pub async fn resolve_model_key(&self, model: &ConfiguredModel) -> Result<String> {
        match &model.api_key_name {
            Some(name) => self.secrets.get(name).await?.ok_or_else(|| {
                rq_core::Error::NotConfigured(format!(
                    "required API key '{name}' for model '{}' is not stored",
                    model.display_name
                ))
            }),
            None => self.utility_api_key().await,
        }
    }
}
