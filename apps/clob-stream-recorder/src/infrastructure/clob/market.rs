//! Market Channel Client
//!
//! Owns the single upstream WebSocket session and drives it through the
//! connection state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Subscribing -> Live
//!                     ^              |            |
//!                     |              v            v
//!                     +-------- Reconnecting <----+
//!
//! any non-terminal state -> Terminated (cancel or message limit)
//! ```
//!
//! There is no subscribe acknowledgement on the market channel, so the first
//! inbound text or binary frame (a `PONG` echo included) marks the session
//! live. Control frames do not. Every reconnect replays
//! the full subscription set in a fresh initial subscribe.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::auth::AuthMaterial;
use super::codec::{JsonCodec, KEEPALIVE_PING};
use super::heartbeat::{KeepaliveConfig, KeepaliveEvent, KeepaliveManager, LivenessState};
use super::reconnect::{BackoffConfig, BackoffPolicy};
use super::subscription::{ChannelKind, ProtocolError, SubscriptionOperation, SubscriptionProtocol};
use crate::application::ports::{RecordSink, SinkError};
use crate::application::services::FrameIngestor;
use crate::domain::stats::{SessionStats, StatsTracker};
use crate::domain::streaming::ConnectionState;
use crate::domain::subscription::{StreamIdentifier, SubscriptionSet};
use crate::infrastructure::config::RecorderConfig;
use crate::infrastructure::metrics;

/// Upper bound for sending a close frame on the way out.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// Error Types
// =============================================================================

/// Why a connection was lost. Recovered with backoff, never returned.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ConnectionError {
    /// Connect, read, or write failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The handshake did not finish in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The server sent a close frame.
    #[error("server closed the connection")]
    Closed,

    /// No inbound frame within the silence window.
    #[error("no inbound traffic for {0:?}")]
    Silence(Duration),

    /// The stream ended without a close frame.
    #[error("stream ended")]
    StreamEnded,
}

impl ConnectionError {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::ConnectTimeout(_) => "connect_timeout",
            Self::Closed => "closed",
            Self::Silence(_) => "silence",
            Self::StreamEnded => "stream_ended",
        }
    }
}

/// Errors that end a recording session.
#[derive(Debug, thiserror::Error)]
pub enum StreamClientError {
    /// The record store failed.
    #[error("persistence failure: {0}")]
    Persistence(#[from] SinkError),

    /// The initial subscribe could not be built.
    #[error("subscription protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The backoff policy ran out of attempts.
    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted {
        /// Attempts made since the last reset.
        attempts: u32,
    },
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for one market stream session.
#[derive(Debug, Clone)]
pub struct MarketStreamConfig {
    /// WebSocket endpoint.
    pub url: String,
    /// Channel to subscribe on.
    pub channel: ChannelKind,
    /// Request feature-flagged events.
    pub custom_features: bool,
    /// Auth material (user channel only).
    pub auth: Option<AuthMaterial>,
    /// Identifiers subscribed at startup.
    pub asset_ids: Vec<StreamIdentifier>,
    /// Keepalive and silence timing.
    pub keepalive: KeepaliveConfig,
    /// Reconnection backoff.
    pub backoff: BackoffConfig,
    /// Stop after this many logical messages.
    ///
    /// Checked once per frame, so an array frame that crosses the limit is
    /// still recorded in full and the total can end slightly above it.
    pub message_limit: Option<u64>,
    /// Interval between time-based sink flushes.
    pub flush_interval: Duration,
    /// Upper bound for the WebSocket handshake.
    pub connect_timeout: Duration,
}

impl MarketStreamConfig {
    /// Market channel configuration with default timings.
    #[must_use]
    pub fn new(url: impl Into<String>, asset_ids: Vec<StreamIdentifier>) -> Self {
        Self {
            url: url.into(),
            channel: ChannelKind::Market,
            custom_features: true,
            auth: None,
            asset_ids,
            keepalive: KeepaliveConfig::default(),
            backoff: BackoffConfig::default(),
            message_limit: None,
            flush_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Build the session configuration from the recorder configuration.
    #[must_use]
    pub fn from_recorder_config(config: &RecorderConfig) -> Self {
        let stream = &config.stream;
        Self {
            custom_features: stream.custom_features,
            keepalive: KeepaliveConfig::new(stream.keepalive_interval, stream.silence_timeout),
            backoff: BackoffConfig::from_settings(stream),
            message_limit: config.limits.message_limit,
            flush_interval: config.output.flush_interval,
            ..Self::new(stream.url.clone(), stream.asset_ids.clone())
        }
    }
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// A subscription change queued for the live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionCommand {
    /// Identifiers that actually changed.
    pub ids: Vec<StreamIdentifier>,
    /// Add or remove.
    pub operation: SubscriptionOperation,
}

/// Changes the subscription set of a running client.
///
/// The set is updated immediately, so a reconnect always replays the latest
/// set. The running connection receives an incremental payload.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    set: Arc<RwLock<SubscriptionSet>>,
    commands: mpsc::UnboundedSender<SubscriptionCommand>,
}

impl SubscriptionHandle {
    /// Subscribe to more identifiers. Returns the ones that were new.
    pub fn subscribe<I>(&self, ids: I) -> Vec<StreamIdentifier>
    where
        I: IntoIterator<Item = StreamIdentifier>,
    {
        let added = self.set.write().add(ids);
        self.enqueue(&added, SubscriptionOperation::Subscribe);
        added
    }

    /// Unsubscribe from identifiers. Returns the ones that were present.
    ///
    /// Removing every identifier is allowed; the next reconnect then sends
    /// an initial subscribe with an empty list.
    pub fn unsubscribe(&self, ids: &[StreamIdentifier]) -> Vec<StreamIdentifier> {
        let removed = self.set.write().remove(ids);
        self.enqueue(&removed, SubscriptionOperation::Unsubscribe);
        removed
    }

    /// Current identifiers in subscription order.
    #[must_use]
    pub fn current(&self) -> Vec<StreamIdentifier> {
        self.set.read().to_vec()
    }

    /// Number of subscribed identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.set.read().len()
    }

    /// Whether nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.read().is_empty()
    }

    fn enqueue(&self, ids: &[StreamIdentifier], operation: SubscriptionOperation) {
        if ids.is_empty() {
            return;
        }
        metrics::set_subscriptions(self.len());
        // The client owns a sender too, so this only fails after it is gone.
        let _ = self.commands.send(SubscriptionCommand {
            ids: ids.to_vec(),
            operation,
        });
    }
}

// =============================================================================
// Session Outcome
// =============================================================================

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cancellation token fired.
    Cancelled,
    /// The configured message limit was reached.
    MessageLimit,
}

impl StopReason {
    /// Label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::MessageLimit => "message_limit",
        }
    }
}

/// End-of-session report.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Final counters.
    pub stats: SessionStats,
    /// Why the session stopped.
    pub reason: StopReason,
    /// Wall time of the session.
    pub duration: Duration,
}

impl SessionSummary {
    /// Write the summary as one structured log event.
    pub fn log(&self) {
        tracing::info!(
            reason = self.reason.as_str(),
            duration_secs = self.duration.as_secs(),
            total = self.stats.total,
            parsed_ok = self.stats.parsed_ok,
            unknown = self.stats.unknown,
            undecodable = self.stats.undecodable,
            reconnects = self.stats.reconnects,
            last_event_type = self.stats.last_event_type.unwrap_or("none"),
            types = %self.stats.types_summary(),
            "Recording session finished"
        );
    }
}

enum ConnectionOutcome {
    Stopped(StopReason),
    Lost {
        error: ConnectionError,
        live_for: Option<Duration>,
    },
}

fn lost(error: ConnectionError, live_since: Option<Instant>) -> ConnectionOutcome {
    ConnectionOutcome::Lost {
        error,
        live_for: live_since.map(|since| since.elapsed()),
    }
}

// =============================================================================
// Market Stream Client
// =============================================================================

/// Market channel client.
///
/// Manages the connection lifecycle including:
/// - Initial subscribe and replay on reconnect
/// - Keepalive `PING` and silence detection
/// - Reconnection with exponential backoff
/// - Incremental subscription changes
pub struct MarketStreamClient {
    config: MarketStreamConfig,
    codec: JsonCodec,
    protocol: SubscriptionProtocol,
    ingestor: FrameIngestor,
    stats: Arc<StatsTracker>,
    subscriptions: Arc<RwLock<SubscriptionSet>>,
    command_tx: mpsc::UnboundedSender<SubscriptionCommand>,
    command_rx: mpsc::UnboundedReceiver<SubscriptionCommand>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl MarketStreamClient {
    /// Create a client. Nothing connects until [`MarketStreamClient::run`].
    #[must_use]
    pub fn new(
        config: MarketStreamConfig,
        stats: Arc<StatsTracker>,
        cancel: CancellationToken,
    ) -> Self {
        let protocol =
            SubscriptionProtocol::new(config.channel, config.custom_features, config.auth.clone());
        let subscriptions: SubscriptionSet = config.asset_ids.iter().cloned().collect();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            codec: JsonCodec::new(),
            protocol,
            ingestor: FrameIngestor::new(Arc::clone(&stats)),
            stats,
            subscriptions: Arc::new(RwLock::new(subscriptions)),
            command_tx,
            command_rx,
            state_tx,
            cancel,
            config,
        }
    }

    /// Handle for changing subscriptions while the client runs.
    #[must_use]
    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            set: Arc::clone(&self.subscriptions),
            commands: self.command_tx.clone(),
        }
    }

    /// Receiver tracking the connection state.
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Record until cancelled, the message limit is reached, or a fatal
    /// error occurs. The sink is always closed before returning.
    ///
    /// # Errors
    ///
    /// Returns an error on persistence failure, an unusable subscribe
    /// configuration, or when the backoff policy gives up.
    pub async fn run<S: RecordSink>(mut self, mut sink: S) -> Result<SessionSummary, StreamClientError> {
        let started = Instant::now();
        metrics::set_subscriptions(self.subscriptions.read().len());

        let outcome = self.run_sessions(&mut sink).await;
        let closed = sink.close().await;
        self.transition(ConnectionState::Terminated);

        if let (Err(_), Err(e)) = (&outcome, &closed) {
            tracing::error!(error = %e, "Record store close failed");
        }
        let reason = outcome?;
        closed?;

        let summary = SessionSummary {
            stats: self.stats.snapshot(),
            reason,
            duration: started.elapsed(),
        };
        summary.log();
        Ok(summary)
    }

    async fn run_sessions<S: RecordSink>(
        &mut self,
        sink: &mut S,
    ) -> Result<StopReason, StreamClientError> {
        self.protocol.validate()?;
        let mut backoff = BackoffPolicy::new(self.config.backoff.clone());

        loop {
            self.transition(ConnectionState::Connecting);

            let (error, live_for) = match self.connect_and_run(sink).await? {
                ConnectionOutcome::Stopped(reason) => return Ok(reason),
                ConnectionOutcome::Lost { error, live_for } => (error, live_for),
            };

            tracing::warn!(
                error = %error,
                live_ms = live_for.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
                "Market stream connection lost"
            );
            metrics::record_connection_error(error.kind());
            backoff.on_connection_lost(live_for);
            self.transition(ConnectionState::Reconnecting);
            sink.flush().await?;

            let Some(delay) = backoff.next_delay() else {
                return Err(StreamClientError::ReconnectExhausted {
                    attempts: backoff.attempt_count(),
                });
            };
            tracing::info!(
                attempt = backoff.attempt_count(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting to market stream"
            );

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Cancelled during reconnect delay");
                    return Ok(StopReason::Cancelled);
                }
                () = tokio::time::sleep(delay) => {}
            }

            self.stats.record_reconnect();
            metrics::record_reconnect();
        }
    }

    /// One connection, from handshake until it is lost or the session stops.
    async fn connect_and_run<S: RecordSink>(
        &mut self,
        sink: &mut S,
    ) -> Result<ConnectionOutcome, StreamClientError> {
        tracing::info!(url = %self.config.url, "Connecting to market stream");

        let connect = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(self.config.url.as_str()),
        );
        let ws_stream = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                return Ok(ConnectionOutcome::Stopped(StopReason::Cancelled));
            }
            result = connect => match result {
                Ok(Ok((ws_stream, _response))) => ws_stream,
                Ok(Err(e)) => return Ok(lost(ConnectionError::Transport(e.to_string()), None)),
                Err(_) => {
                    return Ok(lost(ConnectionError::ConnectTimeout(self.config.connect_timeout), None));
                }
            },
        };
        let (mut write, mut read) = ws_stream.split();

        // Queued changes are already in the set being replayed. The set may be
        // empty after unsubscribes; the empty list is still sent.
        while self.command_rx.try_recv().is_ok() {}

        let ids = self.subscriptions.read().to_vec();
        self.protocol.reset();
        let payload = self.protocol.build_initial_subscribe(&ids)?;
        if let Err(e) = write.send(Message::Text(payload.into())).await {
            return Ok(lost(ConnectionError::Transport(e.to_string()), None));
        }
        tracing::info!(
            channel = self.protocol.channel().as_str(),
            assets = ids.len(),
            "Initial subscribe sent"
        );
        self.transition(ConnectionState::Subscribing);

        let liveness = Arc::new(LivenessState::new());
        let (keepalive_tx, mut keepalive_rx) = mpsc::channel::<KeepaliveEvent>(8);
        let keepalive_cancel = self.cancel.child_token();
        let _keepalive_guard = keepalive_cancel.clone().drop_guard();
        tokio::spawn(
            KeepaliveManager::new(
                self.config.keepalive.clone(),
                Arc::clone(&liveness),
                keepalive_tx,
                keepalive_cancel,
            )
            .run(),
        );

        let flush_period = self.config.flush_interval;
        let mut flush_tick =
            tokio::time::interval_at(tokio::time::Instant::now() + flush_period, flush_period);
        flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut live_since: Option<Instant> = None;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = tokio::time::timeout(CLOSE_TIMEOUT, write.send(Message::Close(None))).await;
                    return Ok(ConnectionOutcome::Stopped(StopReason::Cancelled));
                }
                Some(event) = keepalive_rx.recv() => match event {
                    KeepaliveEvent::SendKeepalive => {
                        if let Err(e) = write.send(Message::Text(KEEPALIVE_PING.to_owned().into())).await {
                            return Ok(lost(ConnectionError::Transport(e.to_string()), live_since));
                        }
                        tracing::trace!("Keepalive sent");
                    }
                    KeepaliveEvent::SilenceTimeout { silent_for } => {
                        return Ok(lost(ConnectionError::Silence(silent_for), live_since));
                    }
                },
                Some(command) = self.command_rx.recv() => {
                    if let Some(payload) = self.update_payload(&command)
                        && let Err(e) = write.send(Message::Text(payload.into())).await
                    {
                        return Ok(lost(ConnectionError::Transport(e.to_string()), live_since));
                    }
                }
                _ = flush_tick.tick() => {
                    sink.flush().await?;
                }
                frame = read.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => {
                            return Ok(lost(ConnectionError::Transport(e.to_string()), live_since));
                        }
                        None => return Ok(lost(ConnectionError::StreamEnded, live_since)),
                    };

                    liveness.record_frame();

                    let started = Instant::now();
                    match frame {
                        Message::Text(text) => {
                            self.mark_live(&mut live_since);
                            if self.codec.is_keepalive_echo(text.as_str()) {
                                tracing::trace!("Keepalive echo received");
                            } else {
                                self.ingestor.ingest_text(text.as_str(), &mut *sink).await?;
                            }
                        }
                        Message::Binary(bytes) => {
                            self.mark_live(&mut live_since);
                            self.ingestor.ingest_binary(&bytes, &mut *sink).await?;
                        }
                        Message::Ping(data) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                return Ok(lost(ConnectionError::Transport(e.to_string()), live_since));
                            }
                        }
                        Message::Close(close) => {
                            tracing::info!(frame = ?close, "Server sent close frame");
                            return Ok(lost(ConnectionError::Closed, live_since));
                        }
                        Message::Pong(_) | Message::Frame(_) => {}
                    }
                    metrics::record_frame_duration(started.elapsed());

                    if let Some(limit) = self.config.message_limit
                        && self.stats.total() >= limit
                    {
                        tracing::info!(limit, "Message limit reached");
                        let _ = tokio::time::timeout(CLOSE_TIMEOUT, write.send(Message::Close(None))).await;
                        return Ok(ConnectionOutcome::Stopped(StopReason::MessageLimit));
                    }
                }
            }
        }
    }

    fn mark_live(&self, live_since: &mut Option<Instant>) {
        if live_since.is_none() {
            *live_since = Some(Instant::now());
            self.transition(ConnectionState::Live);
            tracing::info!("Market stream live");
        }
    }

    fn update_payload(&self, command: &SubscriptionCommand) -> Option<String> {
        match self
            .protocol
            .build_incremental_subscribe(&command.ids, command.operation)
        {
            Ok(payload) => {
                tracing::info!(
                    operation = ?command.operation,
                    assets = command.ids.len(),
                    "Sending subscription update"
                );
                Some(payload)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping subscription update");
                None
            }
        }
    }

    fn transition(&self, next: ConnectionState) {
        let current = *self.state_tx.borrow();
        if current == next || current.is_terminal() {
            return;
        }
        if !current.can_transition_to(next) {
            tracing::warn!(from = %current, to = %next, "Ignoring invalid state transition");
            return;
        }
        self.state_tx.send_replace(next);
        metrics::set_connection_state(next);
        tracing::debug!(from = %current, to = %next, "Connection state changed");
    }
}

// =============================================================================
// Tests
// =============================================================================
