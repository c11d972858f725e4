//! Keepalive and Silence Detection
//!
//! The market channel expects a text `PING` every few seconds and answers
//! with `PONG`. Liveness is judged by inbound traffic of any kind: if no
//! frame (data or `PONG`) arrives within the silence window, the connection
//! is considered dead and the session reconnects.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Smallest silence check period, so tiny test windows do not spin.
const MIN_CHECK_PERIOD: Duration = Duration::from_millis(10);

/// Keepalive timing.
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// Interval between outbound `PING` frames.
    pub interval: Duration,
    /// Maximum time without any inbound frame.
    pub silence_window: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            silence_window: Duration::from_secs(30),
        }
    }
}

impl KeepaliveConfig {
    /// Create a configuration with custom values.
    #[must_use]
    pub const fn new(interval: Duration, silence_window: Duration) -> Self {
        Self {
            interval,
            silence_window,
        }
    }

    /// How often the silence window is checked.
    #[must_use]
    pub fn check_period(&self) -> Duration {
        (self.silence_window / 4).max(MIN_CHECK_PERIOD)
    }
}

/// Events emitted by the keepalive manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveEvent {
    /// Time to send a `PING` frame.
    SendKeepalive,
    /// No inbound frame within the silence window.
    SilenceTimeout {
        /// Time since the last inbound frame.
        silent_for: Duration,
    },
}

/// Last-inbound-frame clock shared with the receive loop.
#[derive(Debug)]
pub struct LivenessState {
    last_frame: RwLock<Instant>,
}

impl Default for LivenessState {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessState {
    /// Start the clock now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_frame: RwLock::new(Instant::now()),
        }
    }

    /// Record that an inbound frame arrived.
    pub fn record_frame(&self) {
        *self.last_frame.write() = Instant::now();
    }

    /// Time since the last inbound frame.
    #[must_use]
    pub fn silent_for(&self) -> Duration {
        self.last_frame.read().elapsed()
    }
}

/// Emits keepalive and silence events for one connection.
pub struct KeepaliveManager {
    config: KeepaliveConfig,
    liveness: Arc<LivenessState>,
    event_tx: mpsc::Sender<KeepaliveEvent>,
    cancel: CancellationToken,
}

impl KeepaliveManager {
    /// Create a keepalive manager.
    #[must_use]
    pub const fn new(
        config: KeepaliveConfig,
        liveness: Arc<LivenessState>,
        event_tx: mpsc::Sender<KeepaliveEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            liveness,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled, the receiver goes away, or silence is detected.
    pub async fn run(self) {
        let start = tokio::time::Instant::now();
        let mut keepalive = tokio::time::interval_at(start + self.config.interval, self.config.interval);
        keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let check_period = self.config.check_period();
        let mut check = tokio::time::interval_at(start + check_period, check_period);
        check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Keepalive manager cancelled");
                    break;
                }
                _ = keepalive.tick() => {
                    if self.event_tx.send(KeepaliveEvent::SendKeepalive).await.is_err() {
                        tracing::debug!("Event channel closed, stopping keepalive");
                        break;
                    }
                }
                _ = check.tick() => {
                    let silent_for = self.liveness.silent_for();
                    if silent_for > self.config.silence_window {
                        tracing::warn!(
                            silent_ms = u64::try_from(silent_for.as_millis()).unwrap_or(u64::MAX),
                            window_ms = u64::try_from(self.config.silence_window.as_millis()).unwrap_or(u64::MAX),
                            "Silence window exceeded"
                        );
                        let _ = self.event_tx.send(KeepaliveEvent::SilenceTimeout { silent_for }).await;
                        break;
                    }
                }
            }
        }
    }
}
