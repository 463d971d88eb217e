use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rq_agent::{GeminiChat, QueryAgent};
use rq_core::SecretStore;
use rq_engine::{
    Embedder, GeminiEmbedder, GitFileReader, IngestConfig, Neo4jCodeGraph, QdrantIndex,
};
use rq_server::jobs::{JobQueue, QueueName};
use rq_server::state::Platform;
use rq_server::store::{DataSourceStore, SqlSecretStore, StoreCloneUrls};
use rq_server::tasks::Worker;
use rq_server::http;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rq-server", about = "repliq — repository question answering over a code graph")]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Graph store bolt URI
    #[arg(long, env = "GRAPH_URI")]
    graph_uri: String,

    #[arg(long, env = "GRAPH_USER")]
    graph_user: String,

    #[arg(long, env = "GRAPH_PASSWORD")]
    graph_password: String,

    /// Vector store URL (Qdrant gRPC endpoint)
    #[arg(long, env = "VECTOR_URL", default_value = "http://localhost:6334")]
    vector_url: String,

    #[arg(long, env = "VECTOR_API_KEY")]
    vector_api_key: Option<String>,

    /// Fallback LLM/embedding API key when none is stored in the secret store
    #[arg(long, env = "LLM_API_KEY")]
    llm_api_key: Option<String>,

    /// Directory repository clones are placed under
    #[arg(long, env = "REPO_CLONE_PATH", default_value = "./repos_cloned")]
    repo_clone_path: PathBuf,

    /// Job broker (redis) URL
    #[arg(long, env = "JOB_BROKER_URL", default_value = "redis://127.0.0.1:6379")]
    job_broker_url: String,

    #[arg(long, env = "EMBEDDING_BATCH_SIZE", default_value_t = 100)]
    embedding_batch_size: usize,

    /// Delay between embedding batches, in seconds
    #[arg(long, env = "EMBEDDING_REQUEST_DELAY", default_value_t = 1.5)]
    embedding_request_delay: f64,

    /// Shared token clients must present as a bearer token
    #[arg(long, env = "AUTH_TOKEN")]
    auth_token: String,

    /// User id the shared token authenticates as
    #[arg(long, env = "AUTH_USER", default_value = "admin")]
    auth_user: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server
    Serve {
        #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:5001")]
        listen_addr: String,
    },
    /// Run a background worker draining one queue
    Worker {
        #[arg(long, default_value = "ingestion")]
        queue: QueueName,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rq=info")),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!("connecting to database");
    let db = PgPool::connect(&cli.database_url).await?;

    tracing::info!("running migrations");
    sqlx::migrate!("./migrations").run(&db).await?;

    let secrets = Arc::new(SqlSecretStore::new(db.clone()));

    let embed_key = match secrets.get(rq_core::secrets::services::LLM_API_KEY).await? {
        Some(key) => key,
        None => cli.llm_api_key.clone().ok_or_else(|| {
            anyhow::anyhow!("no LLM API key: store one under 'llm-api-key' or set LLM_API_KEY")
        })?,
    };
    let embedder = Arc::new(GeminiEmbedder::new(embed_key));

    tracing::info!(uri = %cli.graph_uri, "connecting to graph store");
    let graph = Arc::new(
        Neo4jCodeGraph::connect(&cli.graph_uri, &cli.graph_user, &cli.graph_password).await?,
    );

    tracing::info!(url = %cli.vector_url, "connecting to vector store");
    let vectors = Arc::new(QdrantIndex::new(
        &cli.vector_url,
        cli.vector_api_key.as_deref(),
        embedder.dimension(),
    )?);

    let llm = Arc::new(GeminiChat::new());
    let files = Arc::new(GitFileReader::new(
        cli.repo_clone_path.clone(),
        Arc::new(StoreCloneUrls::new(DataSourceStore::new(db.clone()), secrets.clone())),
    ));

    let agent = QueryAgent::new(
        llm.clone(),
        graph.clone(),
        vectors.clone(),
        embedder.clone(),
        files.clone(),
    )?;

    tracing::info!(url = %cli.job_broker_url, "connecting to job broker");
    let jobs = JobQueue::connect(&cli.job_broker_url).await?;

    let mut ingest = IngestConfig::new(cli.repo_clone_path.clone());
    ingest.embedding_batch_size = cli.embedding_batch_size;
    ingest.embedding_request_delay = Duration::from_secs_f64(cli.embedding_request_delay);

    let platform = Arc::new(Platform {
        db,
        graph,
        vectors,
        embedder,
        llm,
        secrets,
        files,
        agent,
        jobs,
        ingest,
        auth_token: cli.auth_token,
        auth_user: cli.auth_user,
        fallback_llm_key: cli.llm_api_key,
    });

    match cli.command {
        Command::Serve { listen_addr } => {
            let app = http::router(platform);
            let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
            tracing::info!(%listen_addr, "HTTP server listening");
            axum::serve(listener, app).await?;
        }
        Command::Worker { queue } => {
            Worker::new(platform, queue).run().await?;
        }
    }

    Ok(())
}
