use async_trait::async_trait;
use rq_core::{Result, SecretStore};
use sqlx::PgPool;

/// Secret store backed by the `api_keys` table.
///
/// Values are stored as delivered; encrypting them at rest is the concern
/// of the deployment's admin tooling, not of this interface.
#[derive(Clone)]
pub struct SqlSecretStore {
    pool: PgPool,
}

impl SqlSecretStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SecretStore for SqlSecretStore {
    async fn get(&self, service_name: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT key_value FROM api_keys WHERE service_name = $1")
                .bind(service_name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn put(&self, service_name: &str, plaintext: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO api_keys (service_name, key_value) VALUES ($1, $2) \
             ON CONFLICT (service_name) DO UPDATE SET key_value = EXCLUDED.key_value",
        )
        .bind(service_name)
        .bind(plaintext)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
