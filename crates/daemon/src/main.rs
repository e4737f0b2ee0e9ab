//! Conveyor daemon - runnable worker process
//!
//! Loads a queue configuration from CONVEYOR_CONFIG (JSON, tilde-expanded)
//! and runs the engine with a demo `echo` handler registered on every queue,
//! until ctrl-c.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use conveyor_core::{Job, JobFailure, JobHandler, Manager, VERSION};

const DEFAULT_CONFIG_PATH: &str = "~/.conveyor/config.json";

/// Demo handler: logs the payload on run, the outcome on done.
struct EchoHandler;

#[async_trait]
impl JobHandler for EchoHandler {
    async fn run(&mut self, job: &Job) -> anyhow::Result<()> {
        info!(job_id = %job.desc.job_id, payload = %job.desc.payload, "echo");
        Ok(())
    }

    async fn done(&mut self, job: &Job, failure: Option<&JobFailure>) {
        match failure {
            Some(failure) => info!(job_id = %job.desc.job_id, failure = %failure, "echo failed"),
            None => info!(job_id = %job.desc.job_id, "echo done"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging: pretty for development, JSON for production
    let log_format = std::env::var("CONVEYOR_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("conveyor=info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Conveyor v{} starting...", VERSION);

    let config_path = std::env::var("CONVEYOR_CONFIG")
        .unwrap_or_else(|_| shellexpand::tilde(DEFAULT_CONFIG_PATH).into_owned());
    info!(config_path = %config_path, "Loading configuration...");
    let config_text = std::fs::read_to_string(&config_path)
        .map_err(|err| anyhow::anyhow!("cannot read config {config_path}: {err}"))?;

    let mut manager = Manager::new();
    manager.init_with_json_config(&config_text)?;

    for queue_name in manager.queue_names() {
        manager.register_job_type(&queue_name, "echo", || EchoHandler)?;
    }

    let manager = Arc::new(manager);
    let run_handle = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.run().await }
    });

    info!("Ready. Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");
    manager.shutdown().await;
    run_handle.await??;

    info!(
        jobs = manager.job_counter(),
        failed = manager.job_failed_counter(),
        panicked = manager.job_panicked_counter(),
        "Shutdown complete."
    );
    Ok(())
}
