use rq_core::Result;
use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ConfiguredModel {
    pub model_id: String,
    pub display_name: String,
    pub provider: String,
    pub api_key_name: Option<String>,
    pub is_active: bool,
    pub notes: Option<String>,
}

const COLUMNS: &str = "model_id, display_name, provider, api_key_name, is_active, notes";

#[derive(Clone)]
pub struct ModelStore {
    pool: PgPool,
}

impl ModelStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_active(&self) -> Result<Vec<ConfiguredModel>> {
        let rows = sqlx::query_as::<_, ConfiguredModel>(&format!(
            "SELECT {COLUMNS} FROM configured_models WHERE is_active ORDER BY model_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_active(&self, model_id: &str) -> Result<Option<ConfiguredModel>> {
        let row = sqlx::query_as::<_, ConfiguredModel>(&format!(
            "SELECT {COLUMNS} FROM configured_models WHERE model_id = $1 AND is_active"
        ))
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
