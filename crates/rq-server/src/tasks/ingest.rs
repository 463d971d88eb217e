//! Ingestion task: runs the full pipeline for one registered data source
//! and keeps its status row honest.

use rq_engine::fetch::build_clone_url;
use rq_engine::IngestionPipeline;
use rq_core::Result;
use tracing::{error, info};
use uuid::Uuid;

use crate::state::AppState;

pub async fn process_data_source(platform: &AppState, data_source_id: Uuid) -> Result<()> {
    let store = platform.data_sources();
    let source = store
        .get(data_source_id)
        .await?
        .ok_or_else(|| rq_core::Error::NotFound(format!("data source {data_source_id}")))?;

    info!(%data_source_id, name = %source.name, "starting ingestion");

    let repo_full_name = source.repo_full_name().ok_or_else(|| {
        rq_core::Error::MissingInput(
            "repository name not found in data source connection details".into(),
        )
    })?;
    let token = platform
        .secrets
        .get(rq_core::secrets::services::GIT_ACCESS_TOKEN)
        .await?;
    let clone_url = build_clone_url(&repo_full_name, token.as_deref());

    let pipeline = IngestionPipeline::new(
        platform.graph.clone(),
        platform.vectors.clone(),
        platform.embedder.clone(),
        platform.ingest.clone(),
    );

    match pipeline.run(data_source_id, &clone_url).await {
        Ok(report) => {
            store.mark_indexed(data_source_id).await?;
            info!(
                %data_source_id,
                files = report.files_seen,
                parsed = report.files_parsed,
                chunks = report.chunks_indexed,
                "data source indexed"
            );
            Ok(())
        }
        Err(e) => {
            // Flip the row to failed, then re-raise so the queue records
            // the failure too.
            if let Err(status_err) = store.mark_failed(data_source_id).await {
                error!(%data_source_id, error = %status_err, "could not record failed status");
            }
            Err(e)
        }
    }
}
