use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rq_core::{IndexStatus, RepoId, Result, SecretStore};
use rq_engine::fetch::{build_clone_url, CloneUrlProvider};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DataSource {
    pub id: Uuid,
    pub name: String,
    pub source_type: String,
    pub connection_details: serde_json::Value,
    pub status: String,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DataSource {
    /// `owner/name` of the backing repository, however it was registered.
    pub fn repo_full_name(&self) -> Option<String> {
        if let Some(full) = self.connection_details.get("repo_full_name").and_then(|v| v.as_str()) {
            return Some(full.to_string());
        }
        let owner = self.connection_details.get("owner")?.as_str()?;
        let name = self.connection_details.get("repo_name")?.as_str()?;
        Some(format!("{owner}/{name}"))
    }
}

const COLUMNS: &str =
    "id, name, source_type, connection_details, status, last_indexed_at, created_at";

#[derive(Clone)]
pub struct DataSourceStore {
    pool: PgPool,
}

impl DataSourceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        source_type: &str,
        connection_details: &serde_json::Value,
    ) -> Result<DataSource> {
        let row = sqlx::query_as::<_, DataSource>(&format!(
            "INSERT INTO data_sources (name, source_type, connection_details, status) \
             VALUES ($1, $2, $3, $4) RETURNING {COLUMNS}"
        ))
        .bind(name)
        .bind(source_type)
        .bind(connection_details)
        .bind(IndexStatus::PendingIndexing.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list(&self) -> Result<Vec<DataSource>> {
        let rows = sqlx::query_as::<_, DataSource>(&format!(
            "SELECT {COLUMNS} FROM data_sources ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<DataSource>> {
        let row = sqlx::query_as::<_, DataSource>(&format!(
            "SELECT {COLUMNS} FROM data_sources WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_by_connection(
        &self,
        connection_details: &serde_json::Value,
    ) -> Result<Option<DataSource>> {
        let row = sqlx::query_as::<_, DataSource>(&format!(
            "SELECT {COLUMNS} FROM data_sources WHERE connection_details = $1"
        ))
        .bind(connection_details)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Delete the row. Returns `false` when no such data source exists.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM data_sources WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_indexed(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE data_sources SET status = $2, last_indexed_at = now() WHERE id = $1")
            .bind(id)
            .bind(IndexStatus::Indexed.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE data_sources SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(IndexStatus::Failed.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Clone-URL resolution over the registry plus the secret store, used by
/// the ingestion task and the file-reader tool.
pub struct StoreCloneUrls {
    store: DataSourceStore,
    secrets: Arc<dyn SecretStore>,
}

impl StoreCloneUrls {
    pub fn new(store: DataSourceStore, secrets: Arc<dyn SecretStore>) -> Self {
        Self { store, secrets }
    }
}

#[async_trait]
impl CloneUrlProvider for StoreCloneUrls {
    async fn clone_url(&self, repo_id: RepoId) -> Result<String> {
        let source = self
            .store
            .get(repo_id)
            .await?
            .ok_or_else(|| rq_core::Error::NotFound(format!("data source {repo_id}")))?;
        let full_name = source.repo_full_name().ok_or_else(|| {
            rq_core::Error::MissingInput(format!(
                "data source {repo_id} has no repository name in its connection details"
            ))
        })?;
        let token = self.secrets.get(rq_core::secrets::services::GIT_ACCESS_TOKEN).await?;
        Ok(build_clone_url(&full_name, token.as_deref()))
    }
}
