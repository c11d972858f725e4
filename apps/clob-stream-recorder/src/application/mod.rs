//! Application Layer - Use cases and port definitions.
//!
//! The record sink port and the frame ingestion service that feeds it.

/// Port interfaces for external systems.
pub mod ports;

/// Frame ingestion: classify, persist, count.
pub mod services;
