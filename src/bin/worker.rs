//! Worker Binary - Runs the analysis pipeline against the shared Redis queue
//!
//! It wires up:
//! - Redis queue and job state
//! - ffmpeg extraction, Whisper transcription and the pixel embedder
//! - Chroma and Elasticsearch stores
//! - `WORKER_COUNT` consumer tasks sharing one set of capabilities

use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vidsight::adapters::local::{FfmpegExtractor, PixelEmbedder, RedisPool};
use vidsight::adapters::remote::{ChromaStore, ElasticIndex, WhisperClient};
use vidsight::application::indexer::IndexingService;
use vidsight::application::pipeline::{Capabilities, PipelineExecutor};
use vidsight::application::worker::WorkerService;
use vidsight::config::{init_logging, WorkerConfig};
use vidsight::ports::queue::JobQueuePort;

#[tokio::main]
async fn main() {
    init_logging("info");
    let config = WorkerConfig::from_env();

    // 1. Adapters
    let redis = match RedisPool::new(&config.redis_url, &config.consumer_name) {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "failed to create Redis pool");
            std::process::exit(1);
        }
    };

    match redis.recover_inflight().await {
        Ok(0) => {}
        Ok(n) => warn!(recovered = n, consumer = redis.consumer(), "redelivering unacknowledged jobs"),
        Err(e) => {
            error!(error = %e, "failed to reach Redis");
            std::process::exit(1);
        }
    }

    let http = reqwest::Client::new();

    // 2. Capabilities, built once and shared by every worker task
    let capabilities = Capabilities {
        extractor: Arc::new(FfmpegExtractor::new(config.ffmpeg_bin.clone())),
        transcriber: Arc::new(WhisperClient::new(
            http.clone(),
            &config.whisper_url,
            &config.whisper_model,
        )),
        embedder: Arc::new(PixelEmbedder::new()),
    };
    let vectors = ChromaStore::new(http.clone(), &config.chroma_url, &config.chroma_collection);
    let index = ElasticIndex::new(http, &config.elasticsearch_url, &config.subtitle_index);

    let embedding_dimension = capabilities.embedder.dimension();

    // 3. Application Services
    let executor = PipelineExecutor::new(
        redis.clone(),
        redis.clone(),
        vectors,
        capabilities,
        config.pipeline_settings(),
    );
    let worker_service = Arc::new(WorkerService::new(
        redis,
        executor,
        IndexingService::new(index),
    ));

    // 4. Start Workers
    let shutdown = CancellationToken::new();
    let handles: Vec<_> = (0..config.worker_count)
        .map(|i| {
            let w = worker_service.clone();
            let token = shutdown.clone();
            tokio::spawn(async move {
                w.run_worker_loop(i, token).await;
            })
        })
        .collect();
    info!(
        workers = config.worker_count,
        consumer = %config.consumer_name,
        embedding_dimension,
        "started analysis workers"
    );

    // 5. Run until interrupted; jobs in progress finish first
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down");
    shutdown.cancel();
    join_all(handles).await;
}
