#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! CLOB Stream Recorder - Market Channel Ingestion Client
//!
//! Maintains a single WebSocket connection to the CLOB market channel,
//! classifies every event it receives, and appends each one to an
//! append-only JSONL record store. Nothing is ever silently dropped: events
//! that do not match a known shape are recorded as `unknown` with their raw
//! payload.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: Pure types with no I/O
//!   - `streaming`: Event kinds and the connection state machine
//!   - `subscription`: Ordered subscription set
//!   - `stats`: Session counters
//!
//! - **Application**: Ports and use cases
//!   - `ports`: The `RecordSink` interface
//!   - `services`: Frame ingestion (classify, persist, count)
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `clob`: Market channel client, messages, keepalive, backoff
//!   - `persistence`: JSONL record store
//!   - `progress`: Periodic progress lines
//!   - `config`: Environment configuration
//!   - `health`: Health and metrics HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! market WS --> MarketStreamClient --> FrameIngestor --> JsonlSink --> *.jsonl
//!                      |                     |
//!                      v                     v
//!              ConnectionState         StatsTracker --> ProgressReporter
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core recording types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::stats::{SessionStats, StatsTracker};
pub use domain::streaming::{ConnectionState, EventKind};
pub use domain::subscription::{StreamIdentifier, SubscriptionSet};

// Ports and services
pub use application::ports::{RecordSink, SinkError};
pub use application::services::FrameIngestor;

// Market channel client
pub use infrastructure::clob::{
    ClassifiedMessage, InboundMessage, MarketStreamClient, MarketStreamConfig, SessionSummary,
    StopReason, StreamClientError, SubscriptionHandle,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, RecorderConfig};

// Persistence and progress
pub use infrastructure::persistence::JsonlSink;
pub use infrastructure::progress::{ProgressConfig, ProgressReporter};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
