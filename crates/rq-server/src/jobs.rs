//! Redis-backed background job queue.
//!
//! Two logical queues keep long ingestion work away from short LLM-bound
//! memory maintenance. Each queue is a redis list plus a sorted set of
//! scheduled jobs (score = due time in epoch millis) for countdown
//! delivery. A worker process drains exactly one queue serially, which is
//! what serializes concurrent ingestions of the same repository.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use rq_core::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    IngestRepo {
        data_source_id: Uuid,
    },
    RepoSummary {
        user_id: String,
        data_source_id: Uuid,
        last_chat_timestamp: DateTime<Utc>,
    },
    UserFacts {
        user_id: String,
    },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Self::IngestRepo { .. } => "ingest_repo",
            Self::RepoSummary { .. } => "repo_summary",
            Self::UserFacts { .. } => "user_facts",
        }
    }

    /// The queue a job type is routed to.
    pub fn queue(&self) -> QueueName {
        match self {
            Self::IngestRepo { .. } => QueueName::Ingestion,
            Self::RepoSummary { .. } | Self::UserFacts { .. } => QueueName::Memory,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueName {
    Ingestion,
    Memory,
}

impl QueueName {
    fn list_key(&self) -> &'static str {
        match self {
            Self::Ingestion => "rq:jobs:ingestion",
            Self::Memory => "rq:jobs:memory",
        }
    }

    fn scheduled_key(&self) -> &'static str {
        match self {
            Self::Ingestion => "rq:jobs:ingestion:scheduled",
            Self::Memory => "rq:jobs:memory:scheduled",
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ingestion => "ingestion",
            Self::Memory => "memory",
        };
        write!(f, "{s}")
    }
}

impl FromStr for QueueName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ingestion" => Ok(Self::Ingestion),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown queue: {other} (expected ingestion|memory)")),
        }
    }
}

/// Cheaply cloneable handle on the job broker.
#[derive(Clone)]
pub struct JobQueue {
    conn: redis::aio::ConnectionManager,
}

impl JobQueue {
    /// Connect to the broker, e.g. `redis://127.0.0.1:6379`.
    pub async fn connect(broker_url: &str) -> Result<Self> {
        let client = redis::Client::open(broker_url)
            .map_err(|e| rq_core::Error::UpstreamUnavailable(format!("job broker: {e}")))?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| rq_core::Error::UpstreamUnavailable(format!("job broker: {e}")))?;
        Ok(Self { conn })
    }

    /// Enqueue for immediate delivery.
    pub async fn enqueue(&self, job: &Job) -> Result<()> {
        let payload = encode(job)?;
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(job.queue().list_key(), payload)
            .await
            .map_err(broker_err)?;
        Ok(())
    }

    /// Enqueue with a countdown; the job becomes visible once the delay has
    /// elapsed.
    pub async fn enqueue_in(&self, job: &Job, delay: Duration) -> Result<()> {
        let payload = encode(job)?;
        let due = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(job.queue().scheduled_key(), payload, due)
            .await
            .map_err(broker_err)?;
        Ok(())
    }

    /// Pop the next job from a queue, blocking for up to `timeout`.
    /// Returns `None` when the queue stayed empty.
    pub async fn pop(&self, queue: QueueName, timeout: Duration) -> Result<Option<Job>> {
        self.promote_due(queue).await?;

        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn
            .blpop(queue.list_key(), timeout.as_secs_f64())
            .await
            .map_err(broker_err)?;

        let Some((_, payload)) = popped else { return Ok(None) };
        match serde_json::from_str(&payload) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                // A malformed payload is dropped, not redelivered forever.
                warn!(error = %e, payload, "discarding undecodable job payload");
                Ok(None)
            }
        }
    }

    /// Move scheduled jobs whose due time has passed onto the live list.
    async fn promote_due(&self, queue: QueueName) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let mut conn = self.conn.clone();

        let due: Vec<String> = conn
            .zrangebyscore(queue.scheduled_key(), "-inf", now)
            .await
            .map_err(broker_err)?;

        for payload in due {
            // Only the connection that wins the ZREM delivers the job.
            let removed: i64 = conn
                .zrem(queue.scheduled_key(), &payload)
                .await
                .map_err(broker_err)?;
            if removed > 0 {
                conn.rpush::<_, _, ()>(queue.list_key(), payload)
                    .await
                    .map_err(broker_err)?;
            }
        }
        Ok(())
    }
}

fn encode(job: &Job) -> Result<String> {
    serde_json::to_string(job).map_err(|e| rq_core::Error::Internal(format!("job encode: {e}")))
}

fn broker_err(e: redis::RedisError) -> rq_core::Error {
    rq_core::Error::UpstreamUnavailable(format!("job broker: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_roundtrip_through_json() {
        let jobs = vec![
            Job::IngestRepo { data_source_id: Uuid::new_v4() },
            Job::RepoSummary {
                user_id: "admin".into(),
                data_source_id: Uuid::new_v4(),
                last_chat_timestamp: Utc::now(),
            },
            Job::UserFacts { user_id: "admin".into() },
        ];

        for job in jobs {
            let payload = encode(&job).unwrap();
            let back: Job = serde_json::from_str(&payload).unwrap();
            assert_eq!(back, job);
        }
    }

    #[test]
    fn jobs_route_to_their_queues() {
        assert_eq!(
            Job::IngestRepo { data_source_id: Uuid::new_v4() }.queue(),
            QueueName::Ingestion
        );
        assert_eq!(Job::UserFacts { user_id: "u".into() }.queue(), QueueName::Memory);
    }

    #[test]
    fn queue_names_parse() {
        assert_eq!("ingestion".parse::<QueueName>().unwrap(), QueueName::Ingestion);
        assert_eq!("memory".parse::<QueueName>().unwrap(), QueueName::Memory);
        assert!("other".parse::<QueueName>().is_err());
    }
}
