//! Progress Reporter
//!
//! Emits one greppable line per interval, independent of message arrival:
//!
//! ```text
//! 2025-01-01T00:00:10.000Z progress elapsed_secs=10 state=live total=1234 parsed_ok=1230 unknown=4 reconnects=0 types=book:20,price_change:1210,unknown:4
//! ```
//!
//! Lines go to `tracing` at info level and, when configured, are appended to
//! a progress file that is flushed after every line.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::domain::stats::{SessionStats, StatsTracker};
use crate::domain::streaming::ConnectionState;

/// Progress reporter settings.
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Interval between lines.
    pub interval: Duration,
    /// Optional file the lines are appended to.
    pub path: Option<PathBuf>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            path: None,
        }
    }
}

/// Render one progress line (without trailing newline).
#[must_use]
pub fn render_line(
    now: DateTime<Utc>,
    elapsed: Duration,
    state: ConnectionState,
    stats: &SessionStats,
) -> String {
    format!(
        "{} progress elapsed_secs={} state={} total={} parsed_ok={} unknown={} reconnects={} types={}",
        now.to_rfc3339_opts(SecondsFormat::Millis, true),
        elapsed.as_secs(),
        state.as_str(),
        stats.total,
        stats.parsed_ok,
        stats.unknown,
        stats.reconnects,
        stats.types_summary(),
    )
}

/// Timer-driven progress line writer.
pub struct ProgressReporter {
    config: ProgressConfig,
    stats: Arc<StatsTracker>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    started_at: tokio::time::Instant,
}

impl ProgressReporter {
    /// Create a reporter. Elapsed time is measured from this call.
    #[must_use]
    pub fn new(
        config: ProgressConfig,
        stats: Arc<StatsTracker>,
        state: watch::Receiver<ConnectionState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            stats,
            state,
            cancel,
            started_at: tokio::time::Instant::now(),
        }
    }

    /// Write lines until cancelled, then write one final line.
    ///
    /// Progress file failures are logged and the file is dropped; reporting
    /// continues through `tracing`.
    pub async fn run(self) {
        let mut file = match &self.config.path {
            Some(path) => open_progress_file(path).await,
            None => None,
        };

        let period = self.config.interval;
        let mut ticker = tokio::time::interval_at(self.started_at + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    self.emit(&mut file).await;
                    break;
                }
                _ = ticker.tick() => {
                    self.emit(&mut file).await;
                }
            }
        }
    }

    async fn emit(&self, file: &mut Option<File>) {
        let stats = self.stats.snapshot();
        let state = *self.state.borrow();
        let line = render_line(Utc::now(), self.started_at.elapsed(), state, &stats);

        tracing::info!(
            state = state.as_str(),
            total = stats.total,
            parsed_ok = stats.parsed_ok,
            unknown = stats.unknown,
            reconnects = stats.reconnects,
            "{line}"
        );

        if let Some(handle) = file.as_mut() {
            let written = async {
                handle.write_all(line.as_bytes()).await?;
                handle.write_all(b"\n").await?;
                handle.flush().await
            }
            .await;
            if let Err(e) = written {
                tracing::warn!(error = %e, "Progress file write failed, continuing without it");
                *file = None;
            }
        }
    }
}

async fn open_progress_file(path: &PathBuf) -> Option<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        tracing::warn!(path = %path.display(), error = %e, "Cannot create progress directory");
        return None;
    }

    match OpenOptions::new().create(true).append(true).open(path).await {
        Ok(file) => Some(file),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot open progress file");
            None
        }
    }
}
