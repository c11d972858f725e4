//! Domain Layer - Core recording types.
//!
//! Pure types for the recorder: event kinds, the connection state machine,
//! the subscription set, and session statistics. Nothing here performs I/O.

/// Event kinds and connection lifecycle states.
pub mod streaming;

/// Insertion-ordered subscription set.
pub mod subscription;

/// Session counters and snapshots.
pub mod stats;
