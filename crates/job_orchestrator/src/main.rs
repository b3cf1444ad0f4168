//! Job orchestration control-plane binary.
//!
//! Wires the embedded reference backends (`InMemoryJobCache`,
//! `InMemoryMetadataClient`) behind the `job_manager::JobManager` and
//! drives its poll loop until a shutdown signal arrives.
//!
//! Usage:
//!     job-orchestrator --config /etc/job-orchestrator/config.toml

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use config::AppConfig;
use executor_client::ScriptedExecutorClient;
use job_cache::InMemoryJobCache;
use job_manager::{JobManager, ManagerContext};
use job_type_logic::JobTypeRegistry;
use metadata_client::InMemoryMetadataClient;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "job-orchestrator", about = "Job orchestration control plane")]
struct Args {
    /// Path to a TOML config file. Missing file falls back to defaults.
    #[arg(long, env = "JOB_ORCHESTRATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `manager.max_concurrent_jobs` from the config file.
    #[arg(long)]
    max_concurrent_jobs: Option<usize>,

    /// Directory to write rotated log files into. Stderr-only if unset.
    #[arg(long, env = "JOB_ORCHESTRATOR_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Forces debug-level logging regardless of `RUST_LOG`.
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut app_config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(max_concurrent_jobs) = args.max_concurrent_jobs {
        app_config.manager.max_concurrent_jobs = max_concurrent_jobs;
    }
    if args.verbose {
        app_config.verbose = true;
    }
    let log_dir = args
        .log_dir
        .or_else(|| app_config.log_dir.as_ref().map(PathBuf::from))
        .or_else(|| Some(job_logging::logs_dir()));

    job_logging::init(job_logging::LogConfig {
        app_name: "job-orchestrator",
        log_dir,
        verbose: app_config.verbose,
    })?;

    tracing::info!(
        max_concurrent_jobs = app_config.manager.max_concurrent_jobs,
        cache_poll_interval_secs = app_config.cache.poll_interval_secs,
        executor_poll_interval_secs = app_config.executor.poll_interval_secs,
        "starting job orchestrator"
    );

    let ctx = ManagerContext::new(
        Arc::new(InMemoryJobCache::new()),
        Arc::new(ScriptedExecutorClient::new()),
        Arc::new(InMemoryMetadataClient::new()),
        Arc::new(JobTypeRegistry::new()),
        app_config.to_manager_config(),
    );
    let manager = JobManager::new(ctx);

    let cancellation = CancellationToken::new();
    let shutdown_token = cancellation.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to install ctrl-c handler");
            return;
        }
        tracing::info!("ctrl-c received, shutting down");
        shutdown_token.cancel();
    });

    match manager.run(cancellation).await {
        job_manager::RunExit::Shutdown => {
            tracing::info!("job orchestrator stopped");
            Ok(())
        }
        reason @ (job_manager::RunExit::CachePollErrorLimitExceeded
        | job_manager::RunExit::ExecutorPollErrorLimitExceeded) => {
            tracing::error!(?reason, "job orchestrator exiting for an external supervisor to restart");
            std::process::exit(1);
        }
    }
}
