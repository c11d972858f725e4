//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// CLOB market channel WebSocket client.
pub mod clob;

/// Configuration from environment variables.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// JSONL record store.
pub mod persistence;

/// Periodic progress lines.
pub mod progress;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;
