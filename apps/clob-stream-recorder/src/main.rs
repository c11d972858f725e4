//! CLOB Stream Recorder Binary
//!
//! Records the CLOB market channel to a JSONL file.
//!
//! # Usage
//!
//! ```bash
//! RECORDER_ASSET_IDS=<id>,<id> cargo run --bin clob-stream-recorder
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `RECORDER_ASSET_IDS`: Comma-separated asset ids
//!
//! ## Optional
//! - `RECORDER_WS_URL`: Market channel endpoint
//! - `RECORDER_OUTPUT_PATH`: JSONL output (default: data/market_stream.jsonl)
//! - `RECORDER_PROGRESS_PATH`: Progress line file (default: logs only)
//! - `RECORDER_PROGRESS_INTERVAL_SECS`: Progress interval (default: 10)
//! - `RECORDER_MESSAGE_LIMIT`: Stop after N messages (default: 0, unlimited)
//! - `RECORDER_MAX_RUNTIME_SECS`: Stop after N seconds (default: 0, unlimited)
//! - `RECORDER_HEALTH_PORT`: Health and metrics port (default: 0, disabled)
//! - `OTEL_ENABLED`: Export traces over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)
//!
//! Exits non-zero on configuration or persistence failure.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clob_stream_recorder::domain::stats::StatsTracker;
use clob_stream_recorder::infrastructure::clob::{MarketStreamClient, MarketStreamConfig};
use clob_stream_recorder::infrastructure::config::RecorderConfig;
use clob_stream_recorder::infrastructure::health::{HealthServer, HealthServerState};
use clob_stream_recorder::infrastructure::persistence::JsonlSink;
use clob_stream_recorder::infrastructure::progress::{ProgressConfig, ProgressReporter};
use clob_stream_recorder::infrastructure::telemetry;
use clob_stream_recorder::init_metrics;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Upper bound for the progress reporter's final line after the session ends.
const REPORTER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    let session_id = uuid::Uuid::new_v4();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        %session_id,
        "Starting CLOB stream recorder"
    );

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Metrics recorder not installed");
    }

    let config = RecorderConfig::from_env().context("invalid recorder configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let stats = Arc::new(StatsTracker::new());

    let sink = JsonlSink::open(&config.output.output_path, config.output.flush_every)
        .await
        .with_context(|| {
            format!(
                "cannot open record store {}",
                config.output.output_path.display()
            )
        })?;

    let client = MarketStreamClient::new(
        MarketStreamConfig::from_recorder_config(&config),
        Arc::clone(&stats),
        shutdown_token.clone(),
    );

    // The reporter outlives the session so it can render the final line.
    let reporter_token = CancellationToken::new();
    let reporter = ProgressReporter::new(
        ProgressConfig {
            interval: config.output.progress_interval,
            path: config.output.progress_path.clone(),
        },
        Arc::clone(&stats),
        client.state_watch(),
        reporter_token.clone(),
    );
    let reporter_handle = tokio::spawn(reporter.run());

    if let Some(port) = config.server.health_port {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&stats),
            client.state_watch(),
            client.handle(),
        ));
        let health_server = HealthServer::new(port, health_state, shutdown_token.clone());
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    if let Some(max_runtime) = config.limits.max_runtime {
        let token = shutdown_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(max_runtime) => {
                    tracing::info!(secs = max_runtime.as_secs(), "Maximum runtime reached");
                    token.cancel();
                }
            }
        });
    }

    tokio::spawn(await_shutdown(shutdown_token.clone()));

    let result = client
        .run(sink)
        .instrument(tracing::info_span!("session", %session_id))
        .await;

    shutdown_token.cancel();
    reporter_token.cancel();
    if tokio::time::timeout(REPORTER_SHUTDOWN_TIMEOUT, reporter_handle)
        .await
        .is_err()
    {
        tracing::warn!("Progress reporter did not stop in time");
    }

    let summary = result.context("recording session failed")?;
    tracing::info!(
        %session_id,
        total = summary.stats.total,
        reason = summary.reason.as_str(),
        "CLOB stream recorder stopped"
    );
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &RecorderConfig) {
    tracing::info!(
        url = %config.stream.url,
        assets = config.stream.asset_ids.len(),
        custom_features = config.stream.custom_features,
        output = %config.output.output_path.display(),
        message_limit = config.limits.message_limit,
        max_runtime_secs = config.limits.max_runtime.map(|d| d.as_secs()),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        keepalive_secs = config.stream.keepalive_interval.as_secs(),
        silence_secs = config.stream.silence_timeout.as_secs(),
        flush_every = config.output.flush_every,
        progress_secs = config.output.progress_interval.as_secs(),
        "Timing configuration"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Cancel the session on SIGINT or SIGTERM.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = shutdown_token.cancelled() => return,
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
