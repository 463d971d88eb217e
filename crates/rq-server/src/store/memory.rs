use chrono::{DateTime, Utc};
use rq_core::Result;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RepoSummary {
    pub summary_text: String,
    pub last_message_timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct MemoryStore {
    pool: PgPool,
}

impl MemoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_summary(
        &self,
        user_id: &str,
        data_source_id: Uuid,
    ) -> Result<Option<RepoSummary>> {
        let row = sqlx::query_as::<_, RepoSummary>(
            "SELECT summary_text, last_message_timestamp FROM repo_conversation_summaries \
             WHERE user_id = $1 AND data_source_id = $2",
        )
        .bind(user_id)
        .bind(data_source_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn upsert_summary(
        &self,
        user_id: &str,
        data_source_id: Uuid,
        summary_text: &str,
        last_message_timestamp: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO repo_conversation_summaries \
             (user_id, data_source_id, summary_text, last_message_timestamp) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, data_source_id) DO UPDATE SET \
                 summary_text = EXCLUDED.summary_text, \
                 last_message_timestamp = EXCLUDED.last_message_timestamp",
        )
        .bind(user_id)
        .bind(data_source_id)
        .bind(summary_text)
        .bind(last_message_timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_facts(&self, user_id: &str) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT fact_key, fact_value FROM user_facts WHERE user_id = $1 ORDER BY fact_key",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Upsert a batch of facts atomically: new keys are inserted, existing
    /// keys are rewritten only when the value actually changed.
    pub async fn upsert_facts(&self, user_id: &str, facts: &[(String, String)]) -> Result<()> {
        if facts.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (fact_key, fact_value) in facts {
            sqlx::query(
                "INSERT INTO user_facts (user_id, fact_key, fact_value) VALUES ($1, $2, $3) \
                 ON CONFLICT (user_id, fact_key) DO UPDATE SET \
                     fact_value = EXCLUDED.fact_value, updated_at = now() \
                 WHERE user_facts.fact_value IS DISTINCT FROM EXCLUDED.fact_value",
            )
            .bind(user_id)
            .bind(fact_key)
            .bind(fact_value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
