//! Recorder Configuration Settings
//!
//! Configuration types for the recorder, loaded from environment variables.
//! Every variable except `RECORDER_ASSET_IDS` has a default.

use std::path::PathBuf;
use std::time::Duration;

/// Default market channel endpoint.
pub const DEFAULT_WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

/// Default JSONL output location.
pub const DEFAULT_OUTPUT_PATH: &str = "data/market_stream.jsonl";

/// Upstream connection settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// WebSocket endpoint.
    pub url: String,
    /// Asset ids to subscribe to at startup.
    pub asset_ids: Vec<String>,
    /// Request feature-flagged events.
    pub custom_features: bool,
    /// Interval between outbound `PING` frames.
    pub keepalive_interval: Duration,
    /// Maximum time without inbound traffic before reconnecting.
    pub silence_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Live time after which backoff starts over.
    pub reconnect_reset_after: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            asset_ids: Vec::new(),
            custom_features: true,
            keepalive_interval: Duration::from_secs(10),
            silence_timeout: Duration::from_secs(30),
            reconnect_delay_initial: Duration::from_millis(1_000),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            reconnect_reset_after: Duration::from_secs(60),
        }
    }
}

/// Record store and progress output settings.
#[derive(Debug, Clone)]
pub struct OutputSettings {
    /// JSONL record file.
    pub output_path: PathBuf,
    /// Optional progress line file.
    pub progress_path: Option<PathBuf>,
    /// Interval between progress lines.
    pub progress_interval: Duration,
    /// Flush the record file after this many records.
    pub flush_every: usize,
    /// Flush the record file at least this often.
    pub flush_interval: Duration,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            progress_path: None,
            progress_interval: Duration::from_secs(10),
            flush_every: 64,
            flush_interval: Duration::from_millis(1_000),
        }
    }
}

/// Run termination limits.
#[derive(Debug, Clone, Default)]
pub struct RunLimits {
    /// Stop after this many logical messages (`None` = unlimited).
    pub message_limit: Option<u64>,
    /// Stop after this much wall time (`None` = unlimited).
    pub max_runtime: Option<Duration>,
}

/// HTTP server settings.
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    /// Health and metrics port (`None` = server disabled).
    pub health_port: Option<u16>,
}

/// Complete recorder configuration.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Upstream connection settings.
    pub stream: StreamSettings,
    /// Output settings.
    pub output: OutputSettings,
    /// Termination limits.
    pub limits: RunLimits,
    /// Health server settings.
    pub server: ServerSettings,
}

impl RecorderConfig {
    /// Create configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, a value does not
    /// parse, or the combination is inconsistent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`RecorderConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        let raw_ids = env
            .get("RECORDER_ASSET_IDS")
            .ok_or_else(|| ConfigError::MissingEnvVar("RECORDER_ASSET_IDS".to_string()))?;
        let asset_ids = parse_list(&raw_ids);
        if asset_ids.is_empty() {
            return Err(ConfigError::EmptyValue("RECORDER_ASSET_IDS".to_string()));
        }

        let stream_defaults = StreamSettings::default();
        let stream = StreamSettings {
            url: env.get("RECORDER_WS_URL").unwrap_or(stream_defaults.url),
            asset_ids,
            custom_features: env.bool("RECORDER_CUSTOM_FEATURES", stream_defaults.custom_features)?,
            keepalive_interval: env.secs(
                "RECORDER_KEEPALIVE_INTERVAL_SECS",
                stream_defaults.keepalive_interval,
            )?,
            silence_timeout: env.secs(
                "RECORDER_SILENCE_TIMEOUT_SECS",
                stream_defaults.silence_timeout,
            )?,
            reconnect_delay_initial: env.millis(
                "RECORDER_RECONNECT_DELAY_INITIAL_MS",
                stream_defaults.reconnect_delay_initial,
            )?,
            reconnect_delay_max: env.secs(
                "RECORDER_RECONNECT_DELAY_MAX_SECS",
                stream_defaults.reconnect_delay_max,
            )?,
            reconnect_delay_multiplier: env.parse(
                "RECORDER_RECONNECT_DELAY_MULTIPLIER",
                stream_defaults.reconnect_delay_multiplier,
            )?,
            reconnect_reset_after: env.secs(
                "RECORDER_RECONNECT_RESET_AFTER_SECS",
                stream_defaults.reconnect_reset_after,
            )?,
        };

        let output_defaults = OutputSettings::default();
        let output = OutputSettings {
            output_path: env
                .get("RECORDER_OUTPUT_PATH")
                .map_or(output_defaults.output_path, PathBuf::from),
            progress_path: env.get("RECORDER_PROGRESS_PATH").map(PathBuf::from),
            progress_interval: env.secs(
                "RECORDER_PROGRESS_INTERVAL_SECS",
                output_defaults.progress_interval,
            )?,
            flush_every: env.parse("RECORDER_FLUSH_EVERY", output_defaults.flush_every)?,
            flush_interval: env.millis(
                "RECORDER_FLUSH_INTERVAL_MS",
                output_defaults.flush_interval,
            )?,
        };

        let message_limit: u64 = env.parse("RECORDER_MESSAGE_LIMIT", 0)?;
        let max_runtime_secs: u64 = env.parse("RECORDER_MAX_RUNTIME_SECS", 0)?;
        let limits = RunLimits {
            message_limit: (message_limit > 0).then_some(message_limit),
            max_runtime: (max_runtime_secs > 0).then(|| Duration::from_secs(max_runtime_secs)),
        };

        let health_port: u16 = env.parse("RECORDER_HEALTH_PORT", 0)?;
        let server = ServerSettings {
            health_port: (health_port > 0).then_some(health_port),
        };

        let config = Self {
            stream,
            output,
            limits,
            server,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let stream = &self.stream;
        if stream.asset_ids.is_empty() {
            return Err(ConfigError::EmptyValue("RECORDER_ASSET_IDS".to_string()));
        }
        if stream.keepalive_interval.is_zero() {
            return Err(ConfigError::Invalid("keepalive interval must be non-zero".into()));
        }
        if stream.silence_timeout <= stream.keepalive_interval {
            return Err(ConfigError::Invalid(format!(
                "silence timeout ({}s) must exceed keepalive interval ({}s)",
                stream.silence_timeout.as_secs(),
                stream.keepalive_interval.as_secs()
            )));
        }
        if stream.reconnect_delay_initial.is_zero() {
            return Err(ConfigError::Invalid("initial reconnect delay must be non-zero".into()));
        }
        if stream.reconnect_delay_max < stream.reconnect_delay_initial {
            return Err(ConfigError::Invalid(
                "maximum reconnect delay must not be below the initial delay".into(),
            ));
        }
        if !(stream.reconnect_delay_multiplier.is_finite() && stream.reconnect_delay_multiplier >= 1.0) {
            return Err(ConfigError::Invalid(
                "reconnect delay multiplier must be a finite number >= 1".into(),
            ));
        }
        if self.output.progress_interval.is_zero() || self.output.flush_interval.is_zero() {
            return Err(ConfigError::Invalid("progress and flush intervals must be non-zero".into()));
        }
        if self.output.flush_every == 0 {
            return Err(ConfigError::Invalid("flush batch size must be non-zero".into()));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable does not parse.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
    /// Values parse but do not fit together.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Split a comma separated list, dropping blanks.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-blank value for `key`.
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        }
    }

    fn bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value,
                }),
            },
        }
    }

    fn secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse::<u64>(key, default.as_secs()).map(Duration::from_secs)
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parse::<u64>(key, default_ms).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_with_only_asset_ids() {
        let config = RecorderConfig::from_lookup(lookup(&[("RECORDER_ASSET_IDS", "A, B,,C")])).unwrap();

        assert_eq!(config.stream.asset_ids, vec!["A", "B", "C"]);
        assert_eq!(config.stream.url, DEFAULT_WS_URL);
        assert!(config.stream.custom_features);
        assert_eq!(config.stream.keepalive_interval, Duration::from_secs(10));
        assert_eq!(config.stream.silence_timeout, Duration::from_secs(30));
        assert_eq!(config.stream.reconnect_delay_initial, Duration::from_secs(1));
        assert_eq!(config.stream.reconnect_delay_max, Duration::from_secs(30));
        assert_eq!(config.stream.reconnect_reset_after, Duration::from_secs(60));
        assert_eq!(config.output.output_path, PathBuf::from(DEFAULT_OUTPUT_PATH));
        assert!(config.output.progress_path.is_none());
        assert_eq!(config.output.flush_every, 64);
        assert_eq!(config.limits.message_limit, None);
        assert_eq!(config.limits.max_runtime, None);
        assert_eq!(config.server.health_port, None);
    }

    #[test]
    fn overrides_are_applied() {
        let config = RecorderConfig::from_lookup(lookup(&[
            ("RECORDER_ASSET_IDS", "A"),
            ("RECORDER_WS_URL", "ws://127.0.0.1:9000"),
            ("RECORDER_CUSTOM_FEATURES", "false"),
            ("RECORDER_MESSAGE_LIMIT", "500"),
            ("RECORDER_MAX_RUNTIME_SECS", "3600"),
            ("RECORDER_PROGRESS_PATH", "/tmp/progress.log"),
            ("RECORDER_RECONNECT_DELAY_INITIAL_MS", "250"),
            ("RECORDER_HEALTH_PORT", "8090"),
        ]))
        .unwrap();

        assert_eq!(config.stream.url, "ws://127.0.0.1:9000");
        assert!(!config.stream.custom_features);
        assert_eq!(config.limits.message_limit, Some(500));
        assert_eq!(config.limits.max_runtime, Some(Duration::from_secs(3600)));
        assert_eq!(config.output.progress_path, Some(PathBuf::from("/tmp/progress.log")));
        assert_eq!(config.stream.reconnect_delay_initial, Duration::from_millis(250));
        assert_eq!(config.server.health_port, Some(8090));
    }

    #[test]
    fn missing_asset_ids() {
        let err = RecorderConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "RECORDER_ASSET_IDS"));
    }

    #[test]
    fn blank_asset_ids() {
        let err = RecorderConfig::from_lookup(lookup(&[("RECORDER_ASSET_IDS", " , ")])).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));
    }

    #[test]
    fn unparsable_value_is_reported() {
        let err = RecorderConfig::from_lookup(lookup(&[
            ("RECORDER_ASSET_IDS", "A"),
            ("RECORDER_FLUSH_EVERY", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key, value } if key == "RECORDER_FLUSH_EVERY" && value == "lots"
        ));
    }

    #[test]
    fn silence_must_exceed_keepalive() {
        let err = RecorderConfig::from_lookup(lookup(&[
            ("RECORDER_ASSET_IDS", "A"),
            ("RECORDER_KEEPALIVE_INTERVAL_SECS", "30"),
            ("RECORDER_SILENCE_TIMEOUT_SECS", "30"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        for key in [
            "RECORDER_KEEPALIVE_INTERVAL_SECS",
            "RECORDER_PROGRESS_INTERVAL_SECS",
            "RECORDER_FLUSH_INTERVAL_MS",
            "RECORDER_FLUSH_EVERY",
        ] {
            let result = RecorderConfig::from_lookup(lookup(&[("RECORDER_ASSET_IDS", "A"), (key, "0")]));
            assert!(matches!(result, Err(ConfigError::Invalid(_))), "{key}");
        }
    }

    #[test]
    fn bool_spellings() {
        for (raw, expected) in [("1", true), ("YES", true), ("off", false), ("False", false)] {
            let config = RecorderConfig::from_lookup(lookup(&[
                ("RECORDER_ASSET_IDS", "A"),
                ("RECORDER_CUSTOM_FEATURES", raw),
            ]))
            .unwrap();
            assert_eq!(config.stream.custom_features, expected, "{raw}");
        }
    }
}
