//! Render worker binary: renders the job files given on the command line.
//!
//! Usage: `tvid-worker [--schema] [JOB.json ...]` (or `TVID_JOB_FILE`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tvid_media::FontCache;
use tvid_models::RenderJob;
use tvid_storage::{ArtifactStore, LocalStore, S3Store, StorageConfig};
use tvid_worker::{metrics, JobRunner, Pipeline, WorkerConfig};

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("tvid=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

fn load_job(path: &Path) -> anyhow::Result<RenderJob> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading job file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing job file {}", path.display()))
}

fn load_fonts(config: &WorkerConfig) -> anyhow::Result<FontCache> {
    let mut builder = FontCache::builder();
    for dir in &config.font_dirs {
        builder = builder.search_dir(dir);
    }
    for family in &config.font_families {
        builder = builder.family(family);
    }
    Ok(builder.build()?)
}

async fn open_store() -> anyhow::Result<Arc<dyn ArtifactStore>> {
    let storage = StorageConfig::from_env()?;
    Ok(match &storage.local_root {
        Some(root) => {
            info!(root = %root.display(), "Using local artifact store");
            Arc::new(LocalStore::new(root))
        }
        None => Arc::new(S3Store::new(&storage).await?),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--schema") {
        let schema = schemars::schema_for!(RenderJob);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    init_tracing()?;
    info!("Starting tvid-worker");

    let mut job_files: Vec<PathBuf> = args.iter().map(PathBuf::from).collect();
    if job_files.is_empty() {
        if let Ok(path) = std::env::var("TVID_JOB_FILE") {
            job_files.push(PathBuf::from(path));
        }
    }
    if job_files.is_empty() {
        anyhow::bail!("no job files given (pass paths or set TVID_JOB_FILE)");
    }

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        metrics::init_metrics(addr)?;
        info!(addr = %addr, "Serving metrics");
    }

    let jobs = job_files
        .iter()
        .map(|path| load_job(path))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let fonts = Arc::new(load_fonts(&config)?);
    info!(families = fonts.loaded_families(), "Fonts loaded");
    let store = open_store().await?;

    let runner = JobRunner::new(Pipeline::new(fonts, store, config));
    let handles: Vec<_> = jobs.into_iter().map(|job| runner.submit(job)).collect();

    let cancellers: Vec<_> = handles.iter().map(|h| h.canceller()).collect();
    let shutdown_runner = runner.clone();
    let shutdown_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cancelling jobs");
            shutdown_runner.close();
            for cancel in &cancellers {
                cancel.send_replace(true);
            }
        }
    });

    let mut failed = 0usize;
    for handle in handles {
        match handle.wait().await {
            Ok(outcome) => println!("{}", serde_json::to_string(&outcome)?),
            Err(failure) => {
                error!(
                    job_id = %failure.job_id,
                    stage = failure.stage.as_str(),
                    kind = failure.kind.as_str(),
                    "{}", failure.message
                );
                eprintln!("{}", serde_json::to_string(&failure)?);
                failed += 1;
            }
        }
    }
    shutdown_handle.abort();

    if failed > 0 {
        anyhow::bail!("{failed} job(s) failed");
    }
    info!("Worker shutdown complete");
    Ok(())
}
