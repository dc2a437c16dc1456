mod adapter;
mod config;
mod docker;
mod engine;
#[cfg(test)]
mod engine_tests;
mod error;
mod evaluator;
mod executor;
mod handlers;
mod metrics;
mod routes;
mod scheduler;
mod store;
#[cfg(test)]
mod testing;

use anyhow::Context;
use axum::Router;
use codecraft_common::config::{EngineKind, LogFormat, ProblemSource, ServiceConfig};
use config::LanguageConfigManager;
use docker::DockerEngine;
use engine::{ExecutionEngine, LocalEngine};
use executor::Judge;
use redis::aio::ConnectionManager;
use scheduler::{Scheduler, SchedulerConfig};
use std::sync::Arc;
use store::{
    DirProblemStore, LogResultSink, ProblemStore, RedisProblemStore, RedisResultSink, ResultSink,
};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

pub struct AppState {
    pub scheduler: Scheduler,
    pub sink: Arc<dyn ResultSink>,
    pub languages: Arc<LanguageConfigManager>,
    pub engine: &'static str,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_line_number(true)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let service_config = ServiceConfig::from_env().context("Invalid service configuration")?;
    init_tracing(service_config.log_format);

    info!("CodeCraft judge booting...");
    metrics::register_metrics();

    // Load language configurations
    let languages = Arc::new(
        LanguageConfigManager::load(&service_config.languages_config).map_err(|e| {
            error!("Failed to load language configurations: {}", e);
            error!("Make sure {} exists", service_config.languages_config.display());
            e
        })?,
    );
    info!("Loaded language configurations for: {:?}", languages.list_languages());

    let engine: Arc<dyn ExecutionEngine> = match service_config.engine {
        EngineKind::Docker => Arc::new(DockerEngine::connect().await?),
        EngineKind::Local => {
            warn!("Local execution engine selected: submissions run UNISOLATED on this host");
            Arc::new(LocalEngine)
        }
    };
    info!(engine = engine.name(), "Execution engine ready");

    // Connect to Redis when configured
    let redis_conn = match &service_config.redis_url {
        Some(redis_url) => {
            let client = redis::Client::open(redis_url.as_str())
                .with_context(|| format!("Invalid REDIS_URL: {}", redis_url))?;
            let conn = ConnectionManager::new(client)
                .await
                .context("Failed to connect to Redis")?;
            info!("Connected to Redis: {}", redis_url);
            Some(conn)
        }
        None => None,
    };

    let problems: Arc<dyn ProblemStore> = match service_config.problem_source {
        ProblemSource::Dir => {
            info!(dir = %service_config.problems_dir.display(), "Reading problems from directory");
            Arc::new(DirProblemStore::new(&service_config.problems_dir))
        }
        ProblemSource::Redis => {
            let conn = redis_conn
                .clone()
                .context("PROBLEM_SOURCE=redis requires REDIS_URL")?;
            info!("Reading problems from Redis");
            Arc::new(RedisProblemStore::new(conn))
        }
    };

    let sink: Arc<dyn ResultSink> = match redis_conn {
        Some(conn) => Arc::new(RedisResultSink::new(conn, service_config.result_ttl_seconds)),
        None => {
            info!("REDIS_URL not set; submission verdicts are only logged");
            Arc::new(LogResultSink)
        }
    };

    tokio::fs::create_dir_all(&service_config.scratch_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create scratch directory {}",
                service_config.scratch_dir.display()
            )
        })?;

    let judge = Judge::new(
        engine.clone(),
        languages.clone(),
        problems,
        service_config.scratch_dir.clone(),
    );
    let scheduler = Scheduler::start(
        SchedulerConfig::from(&service_config),
        Arc::new(judge),
        sink.clone(),
    );

    let state = Arc::new(AppState {
        scheduler: scheduler.clone(),
        sink,
        languages,
        engine: engine.name(),
    });

    // Build router
    let app = Router::new().merge(routes::routes()).with_state(state);

    let addr = service_config.listen_addr.as_str();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);
    info!("Ready to accept requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    scheduler.shutdown().await;
    info!("Judge shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    warn!("Received shutdown signal, draining running requests...");
}
