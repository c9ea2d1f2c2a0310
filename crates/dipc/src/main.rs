//! Worker process entry point.
//!
//! Assembles the backends (task store, queue fabric, object store) and the
//! collaborators each stage handler needs, registers all four handlers on a
//! [`WorkerRuntime`], and drives all four queues concurrently. Also runs the
//! periodic scheduler for the two cleanup sweeps (modes A and C), since
//! nothing else in the pipeline triggers them on a schedule.

mod config;
mod dev_collaborators;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dipc_queue::{QueueFabric, QueueMessage, QueueName};
use dipc_task_store::{FileMetadataStore, TaskStore};
use dipc_worker::{
    ArchiveHandler, CleanupHandler, DefaultFileProber, HttpDownloader, LocalObjectStore, ParsingHandler,
    RuntimeConfig, VectorizationHandler, WorkerRuntime,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use config::{Config, LogFormat};
use dev_collaborators::{EchoExtractor, HashEmbedder, InMemoryVectorStore, PlainTextPreprocessor};

const EMBEDDING_DIM: usize = 16;
const EXPIRED_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);
const ORPHAN_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Every setting also has an environment variable; these
/// flags only exist to override them without touching the environment,
/// e.g. for a one-off local run at higher concurrency.
#[derive(Parser)]
#[command(name = "dipc-worker")]
#[command(about = "Document intelligence pipeline worker process")]
struct Cli {
    /// Overrides WORKER_CONCURRENCY.
    #[arg(long)]
    concurrency: Option<u32>,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}

async fn build_task_store(config: &Config) -> anyhow::Result<Arc<dyn TaskStore>> {
    if config.database_url.starts_with("postgres://") && std::env::var("DIPC_BACKEND").as_deref() == Ok("postgres") {
        let pg_config = dipc_task_store::postgres::PostgresTaskStoreConfig {
            database_url: config.database_url.clone(),
            ..Default::default()
        };
        let store = dipc_task_store::postgres::PostgresTaskStore::new(pg_config).await?;
        Ok(Arc::new(store))
    } else {
        Ok(Arc::new(dipc_task_store::in_memory::InMemoryTaskStore::new()))
    }
}

fn build_file_store() -> Arc<dyn FileMetadataStore> {
    Arc::new(dipc_task_store::in_memory::InMemoryFileMetadataStore::new())
}

async fn build_queue() -> anyhow::Result<Arc<dyn QueueFabric>> {
    if std::env::var("DIPC_BACKEND").as_deref() == Ok("sqs") {
        #[cfg(feature = "sqs")]
        {
            let urls = dipc_queue::sqs::SqsQueueUrls {
                archive: std::env::var("SQS_QUEUE_URL_ARCHIVE").unwrap_or_default(),
                parse: std::env::var("SQS_QUEUE_URL_PARSE").unwrap_or_default(),
                vectorize: std::env::var("SQS_QUEUE_URL_VECTORIZE").unwrap_or_default(),
                cleanup: std::env::var("SQS_QUEUE_URL_CLEANUP").unwrap_or_default(),
                dead_letter: std::env::var("SQS_QUEUE_URL_DEAD_LETTER").unwrap_or_default(),
            };
            return Ok(Arc::new(dipc_queue::sqs::SqsQueueFabric::from_env(urls).await));
        }
        #[cfg(not(feature = "sqs"))]
        {
            anyhow::bail!("DIPC_BACKEND=sqs requested but this binary was built without the sqs feature");
        }
    }
    Ok(Arc::new(dipc_queue::in_memory::InMemoryQueueFabric::new()))
}

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Logs a [`dipc_worker::HealthReport`] on a fixed interval. No HTTP
/// surface is implemented, so this periodic log line is the consumer.
async fn run_health_logger(task_store: Arc<dyn TaskStore>, queue: Arc<dyn QueueFabric>, worker_slots_configured: u32) {
    let mut tick = tokio::time::interval(HEALTH_LOG_INTERVAL);
    loop {
        tick.tick().await;
        let report = dipc_worker::check_health(&task_store, &queue, worker_slots_configured).await;
        if report.is_healthy() {
            tracing::info!(?report, "health check ok");
        } else {
            tracing::warn!(?report, "health check degraded");
        }
    }
}

/// Enqueues a cleanup sweep on a fixed interval. Mode A (expired temp
/// files) and mode C (orphaned file metadata) have no other trigger, so
/// this loop is the scheduler for both.
async fn run_cleanup_scheduler(queue: Arc<dyn QueueFabric>) {
    let mut expired_tick = tokio::time::interval(EXPIRED_SWEEP_INTERVAL);
    let mut orphan_tick = tokio::time::interval(ORPHAN_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = expired_tick.tick() => {
                let args = json!({"mode": "expired", "batch_size": 100});
                let msg = QueueMessage::new("scheduler-expired", args);
                if let Err(e) = queue.enqueue(QueueName::Cleanup, msg).await {
                    tracing::warn!(error = %e, "failed to enqueue scheduled expired-file sweep");
                }
            }
            _ = orphan_tick.tick() => {
                let args = json!({"mode": "orphaned", "batch_size": 100});
                let msg = QueueMessage::new("scheduler-orphaned", args);
                if let Err(e) = queue.enqueue(QueueName::Cleanup, msg).await {
                    tracing::warn!(error = %e, "failed to enqueue scheduled orphaned-metadata sweep");
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(concurrency) = cli.concurrency {
        config.worker_concurrency = concurrency;
    }
    init_tracing(&config);

    if let Err(errors) = config.validate() {
        for e in &errors {
            tracing::error!(error = %e, "invalid configuration");
        }
        anyhow::bail!("{} configuration error(s), refusing to start", errors.len());
    }

    tracing::info!(
        storage_root = %config.storage_root,
        worker_concurrency = config.worker_concurrency,
        has_llm_provider = config.has_llm_provider(),
        "starting dipc worker"
    );

    let task_store = build_task_store(&config).await?;
    let file_store = build_file_store();
    let queue = build_queue().await?;

    let object_store: Arc<dyn dipc_worker::ObjectStore> = Arc::new(LocalObjectStore::new());
    let prober: Arc<dyn dipc_worker::ProbeFile> = Arc::new(DefaultFileProber::new());
    let downloader: Arc<dyn dipc_worker::collaborators::Downloader> = Arc::new(HttpDownloader::new());

    let preprocessor: Arc<dyn dipc_worker::Preprocess> = Arc::new(PlainTextPreprocessor);
    let extractor: Arc<dyn dipc_worker::Extract> = Arc::new(EchoExtractor);
    let embedder: Arc<dyn dipc_worker::EmbedBatch> = Arc::new(HashEmbedder);
    let vector_store: Arc<dyn dipc_worker::StoreDocuments> = Arc::new(InMemoryVectorStore::new());

    let archive_handler = Arc::new(ArchiveHandler::new(
        Arc::clone(&task_store),
        Arc::clone(&file_store),
        Arc::clone(&queue),
        Arc::clone(&downloader),
        dipc_archive::ArchiveLimits {
            max_files: config.max_extraction_files as usize,
            ..Default::default()
        },
        config.max_archive_bytes(),
        PathBuf::from(&config.storage_root).join("extractions"),
        config.temp_file_ttl_hours,
    ));

    let parsing_handler = Arc::new(ParsingHandler::new(
        Arc::clone(&prober),
        preprocessor,
        extractor,
        Arc::clone(&queue),
        config.llm_timeout_seconds,
    ));

    let vectorize_handler = Arc::new(VectorizationHandler::new(embedder, vector_store, EMBEDDING_DIM));

    let cleanup_handler = Arc::new(CleanupHandler::new(
        Arc::clone(&task_store),
        Arc::clone(&file_store),
        Arc::clone(&object_store),
        Arc::clone(&queue),
    ));

    let mut runtime = WorkerRuntime::new(
        Arc::clone(&task_store),
        Arc::clone(&queue),
        RuntimeConfig {
            per_stage_timeout: config.per_stage_timeout(),
            dequeue_timeout: Duration::from_secs(30),
            max_retries: config.max_retries,
        },
    );
    runtime.register(QueueName::Archive, archive_handler);
    runtime.register(QueueName::Parse, parsing_handler);
    runtime.register(QueueName::Vectorize, vectorize_handler);
    runtime.register(QueueName::Cleanup, cleanup_handler);

    let runtime = Arc::new(runtime);

    tokio::select! {
        _ = Arc::clone(&runtime).run(QueueName::Archive, config.worker_concurrency) => {}
        _ = Arc::clone(&runtime).run(QueueName::Parse, config.worker_concurrency) => {}
        _ = Arc::clone(&runtime).run(QueueName::Vectorize, config.worker_concurrency) => {}
        _ = Arc::clone(&runtime).run(QueueName::Cleanup, config.worker_concurrency) => {}
        _ = run_cleanup_scheduler(Arc::clone(&queue)) => {}
        _ = run_health_logger(Arc::clone(&task_store), Arc::clone(&queue), config.worker_concurrency) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
    }

    Ok(())
}
