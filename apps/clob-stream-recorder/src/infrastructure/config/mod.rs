//! Configuration Module
//!
//! Environment-driven configuration for the recorder.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_OUTPUT_PATH, DEFAULT_WS_URL, OutputSettings, RecorderConfig, RunLimits,
    ServerSettings, StreamSettings,
};
