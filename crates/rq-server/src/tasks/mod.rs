//! Background workers and the tasks they run.
//!
//! A worker process drains one queue. Every task runs inside a
//! `TaskContext` that is entered before user code and closed after it,
//! success or failure, so each run leaves a start/finish trace with its
//! outcome.

pub mod ingest;
pub mod memory;

use std::time::{Duration, Instant};

use rq_core::Result;
use tracing::{error, info, warn};

use crate::jobs::{Job, QueueName};
use crate::state::AppState;

const POP_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Worker {
    platform: AppState,
    queue: QueueName,
}

impl Worker {
    pub fn new(platform: AppState, queue: QueueName) -> Self {
        Self { platform, queue }
    }

    /// Drain the queue forever. Broker hiccups back off and retry; task
    /// failures are recorded and do not stop the worker.
    pub async fn run(&self) -> Result<()> {
        info!(queue = %self.queue, "worker started");
        loop {
            let job = match self.platform.jobs.pop(self.queue, POP_TIMEOUT).await {
                Ok(job) => job,
                Err(e) => {
                    warn!(error = %e, "job broker unavailable, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };
            let Some(job) = job else { continue };
            self.dispatch(job).await;
        }
    }

    async fn dispatch(&self, job: Job) {
        let ctx = TaskContext::enter(job.name());
        let result = match job {
            Job::IngestRepo { data_source_id } => {
                ingest::process_data_source(&self.platform, data_source_id).await
            }
            Job::RepoSummary { user_id, data_source_id, .. } => {
                memory::generate_repo_summary(&self.platform, &user_id, data_source_id).await
            }
            Job::UserFacts { user_id } => {
                memory::extract_user_facts(&self.platform, &user_id).await
            }
        };
        ctx.finish(&result);
    }
}

/// Scoped task context: entered before a task body, closed afterwards
/// regardless of outcome.
pub struct TaskContext {
    job: &'static str,
    started: Instant,
}

impl TaskContext {
    pub fn enter(job: &'static str) -> Self {
        info!(job, "task started");
        Self { job, started: Instant::now() }
    }

    pub fn finish(self, result: &Result<()>) {
        let elapsed_ms = self.started.elapsed().as_millis();
        match result {
            Ok(()) => info!(job = self.job, elapsed_ms, "task completed"),
            Err(e) => error!(job = self.job, elapsed_ms, error = %e, "task failed"),
        }
    }
}
