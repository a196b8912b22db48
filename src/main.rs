mod config;
mod http;
mod model;
mod pipeline;
mod telemetry;
mod types;

use std::sync::Arc;

use log::{error, info};
use tokio::sync::oneshot;

use crate::config::ServeConfig;
use crate::http::ApiState;
use crate::model::GbdtModel;
use crate::pipeline::InferencePipeline;
use crate::telemetry::TelemetryStore;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown: {err}");
            }
            let _ = shutdown_tx.send(());
        });

        run_until_shutdown(shutdown_rx).await
    })
}

async fn run_until_shutdown(
    shutdown_rx: oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServeConfig::from_env();

    // A missing or unreadable artifact fails the process before any
    // listener binds.
    info!("loading model from {}", config.model_path.display());
    let model = Arc::new(GbdtModel::load(&config.model_path)?);
    info!("model ready ({} trees)", model.tree_count());

    let telemetry = Arc::new(TelemetryStore::new());
    let pipeline = Arc::new(InferencePipeline::new(
        Arc::clone(&model),
        Arc::clone(&telemetry),
        config.decision_threshold,
    ));

    let api_state = ApiState {
        pipeline,
        telemetry: Arc::clone(&telemetry),
    };
    let api_addr = config.http_addr.clone();
    let cors_origin = config.cors_origin.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(err) = http::serve_api(api_addr, cors_origin, api_state).await {
            error!("form server error: {err}");
        }
    });

    let metrics_handle = if config.metrics_enabled {
        let telemetry = Arc::clone(&telemetry);
        let metrics_addr = config.metrics_addr.clone();
        Some(tokio::spawn(async move {
            if let Err(err) = http::serve_metrics(metrics_addr, telemetry).await {
                error!("metrics server error: {err}");
            }
        }))
    } else {
        None
    };

    let _ = shutdown_rx.await;
    info!("shutting down");

    api_handle.abort();
    if let Some(handle) = metrics_handle {
        handle.abort();
    }

    let stats = telemetry.snapshot();
    info!(
        "served {} requests ({} survived, {} did not survive)",
        stats.requests, stats.survived, stats.did_not_survive
    );

    Ok(())
}
