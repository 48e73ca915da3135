use crate::filter::FilterSettings;
use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Complete Fieldwatch configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldwatchConfig {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Session filter timing
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Silence after which an active entity is dropped (seconds)
    #[serde(default = "default_entity_timeout")]
    pub entity_timeout_seconds: u64,
    /// Delay between cache replays while a heartbeat runs (milliseconds)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
    /// Minimum spacing of repeated updates for one entity (milliseconds)
    #[serde(default = "default_throttle_interval")]
    pub throttle_interval_ms: u64,
    /// Updates queued per viewer before new ones are dropped
    #[serde(default = "default_viewer_buffer")]
    pub viewer_buffer: usize,
}

fn default_entity_timeout() -> u64 {
    30
}

fn default_heartbeat_interval() -> u64 {
    1000
}

fn default_throttle_interval() -> u64 {
    250
}

fn default_viewer_buffer() -> usize {
    1024
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            entity_timeout_seconds: default_entity_timeout(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            throttle_interval_ms: default_throttle_interval(),
            viewer_buffer: default_viewer_buffer(),
        }
    }
}

impl FilterConfig {
    pub fn settings(&self) -> FilterSettings {
        FilterSettings {
            entity_timeout: Duration::from_secs(self.entity_timeout_seconds),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            throttle_interval: Duration::from_millis(self.throttle_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_bind_address() -> String {
    "0.0.0.0:3100".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// External monitor feed
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Raw states buffered for slow monitors before they lag
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    1000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl FieldwatchConfig {
    /// Reject settings the runtime cannot honour. A zero throttle interval is
    /// allowed and disables throttling.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.filter.entity_timeout_seconds == 0 {
            bail!("filter.entity_timeout_seconds must be greater than zero");
        }
        if self.filter.heartbeat_interval_ms == 0 {
            bail!("filter.heartbeat_interval_ms must be greater than zero");
        }
        if self.filter.viewer_buffer == 0 {
            bail!("filter.viewer_buffer must be greater than zero");
        }
        if self.monitor.channel_capacity == 0 {
            bail!("monitor.channel_capacity must be greater than zero");
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<FieldwatchConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: FieldwatchConfig =
        toml::from_str(&contents).with_context(|| format!("Invalid config file {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    Ok(config)
}

/// Configuration named by `FIELDWATCH_CONFIG`, defaults when unset or
/// missing. `FIELDWATCH_BIND` overrides the bind address.
pub fn load_from_env() -> anyhow::Result<FieldwatchConfig> {
    let mut config = match std::env::var("FIELDWATCH_CONFIG") {
        Ok(path) if Path::new(&path).exists() => load_config(&path)?,
        _ => FieldwatchConfig::default(),
    };

    if let Ok(bind) = std::env::var("FIELDWATCH_BIND") {
        config.server.bind_address = bind;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = FieldwatchConfig::default();
        assert_eq!(config.filter.entity_timeout_seconds, 30);
        assert_eq!(config.filter.heartbeat_interval_ms, 1000);
        assert_eq!(config.filter.throttle_interval_ms, 250);
        assert_eq!(config.server.bind_address, "0.0.0.0:3100");
        assert_eq!(config.monitor.channel_capacity, 1000);
        assert_eq!(config.filter.settings(), FilterSettings::default());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [filter]
            entity_timeout_seconds = 10
            heartbeat_interval_ms = 500
            throttle_interval_ms = 100
            viewer_buffer = 64

            [server]
            bind_address = "127.0.0.1:9000"

            [monitor]
            channel_capacity = 16
        "#;

        let config: FieldwatchConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.filter.viewer_buffer, 64);
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.monitor.channel_capacity, 16);

        let settings = config.filter.settings();
        assert_eq!(settings.entity_timeout, Duration::from_secs(10));
        assert_eq!(settings.heartbeat_interval, Duration::from_millis(500));
        assert_eq!(settings.throttle_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_partial_config() {
        // Missing sections and fields use defaults
        let toml = r#"
            [filter]
            entity_timeout_seconds = 5
        "#;

        let config: FieldwatchConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.filter.entity_timeout_seconds, 5);
        assert_eq!(config.filter.heartbeat_interval_ms, 1000);
        assert_eq!(config.server.bind_address, "0.0.0.0:3100");
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind_address = \"127.0.0.1:4000\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:4000");

        assert!(load_config(file.path().with_extension("missing")).is_err());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[filter]\nentity_timeout_seconds = \"soon\"").unwrap();

        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_zero_values_are_rejected() {
        let cases = [
            ("[filter]\nheartbeat_interval_ms = 0", "heartbeat_interval_ms"),
            ("[filter]\nviewer_buffer = 0", "viewer_buffer"),
            ("[filter]\nentity_timeout_seconds = 0", "entity_timeout_seconds"),
            ("[monitor]\nchannel_capacity = 0", "channel_capacity"),
        ];

        for (contents, field) in cases {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "{}", contents).unwrap();

            let err = load_config(file.path()).unwrap_err();
            assert!(format!("{:#}", err).contains(field), "{:#}", err);
        }
    }

    #[test]
    fn test_zero_throttle_is_accepted() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[filter]\nthrottle_interval_ms = 0").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.filter.settings().throttle_interval, Duration::ZERO);
    }
}
