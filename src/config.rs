//! Layered configuration.
//!
//! Values are resolved from (lowest to highest priority): built-in defaults,
//! an optional TOML file, `WATCHDOG_*` environment variables and command-line
//! overrides.
//!
//! ```toml
//! host = "broker.local"
//! port = 1883
//! application_id = "temperature-alarm"
//! threshold = 65.0
//! shutdown_token = "very-secret"
//! sensor_scheme = "property"
//! granularity = "source"
//! ```

use std::path::Path;
#[cfg(feature = "mqtt")]
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::controller::{ControllerSettings, TokenComparison};
use crate::error::{Result, WatchdogError};
use crate::ledger::KeyGranularity;
use crate::topic::{SensorScheme, TopicScheme};

/// Environment variable prefix, e.g. `WATCHDOG_HOST`.
pub const ENV_PREFIX: &str = "WATCHDOG";

/// Complete watchdog configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Hostname of the MQTT broker.
    pub host: String,
    /// Port of the MQTT broker.
    pub port: u16,
    /// Id of this application; prefix of all its topics.
    pub application_id: String,
    /// Temperature threshold in °C that raises an alarm.
    pub threshold: f64,
    /// Shared secret expected on the shutdown command.
    pub shutdown_token: String,
    pub token_comparison: TokenComparison,
    /// Property name the threshold is exposed under.
    pub threshold_property: String,
    pub sensor_scheme: SensorScheme,
    pub granularity: KeyGranularity,
    pub keep_alive_secs: u64,
    /// Default log filter when `RUST_LOG` is not set.
    pub log_level: String,
    /// Capacity of the MQTT client's request queue.
    pub channel_capacity: usize,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            application_id: "temperature-alarm".to_string(),
            threshold: 65.0,
            shutdown_token: "very-secret".to_string(),
            token_comparison: TokenComparison::Exact,
            threshold_property: "threshold".to_string(),
            sensor_scheme: SensorScheme::Property,
            granularity: KeyGranularity::Source,
            keep_alive_secs: 30,
            log_level: "info".to_string(),
            channel_capacity: 64,
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub application_id: Option<String>,
    pub threshold: Option<f64>,
}

/// Load configuration from an optional file, the environment and overrides.
pub fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<WatchdogConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path));
    }

    let config = builder
        .add_source(Environment::with_prefix(ENV_PREFIX))
        .set_override_option("host", overrides.host.clone())?
        .set_override_option("port", overrides.port.map(i64::from))?
        .set_override_option("application_id", overrides.application_id.clone())?
        .set_override_option("threshold", overrides.threshold)?
        .build()?;

    let parsed: WatchdogConfig = config.try_deserialize()?;
    parsed.validate()?;
    Ok(parsed)
}

impl WatchdogConfig {
    /// Reject values the watchdog cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.application_id.is_empty() {
            return Err(WatchdogError::Config(
                "application_id must not be empty".to_string(),
            ));
        }
        if self.application_id.contains(['/', '+', '#']) {
            return Err(WatchdogError::Config(format!(
                "application_id '{}' must not contain '/', '+' or '#'",
                self.application_id
            )));
        }
        if self.threshold_property.is_empty() || self.threshold_property.contains('/') {
            return Err(WatchdogError::Config(format!(
                "invalid threshold_property '{}'",
                self.threshold_property
            )));
        }
        if self.sensor_scheme.is_multi_component()
            && self.granularity != KeyGranularity::SourceAndComponent
        {
            return Err(WatchdogError::Config(format!(
                "sensor_scheme {:?} carries several components per source and needs granularity \"source-and-component\"",
                self.sensor_scheme
            )));
        }
        if !self.threshold.is_finite() {
            return Err(WatchdogError::Config(format!(
                "threshold must be finite, got {}",
                self.threshold
            )));
        }
        if self.port == 0 {
            return Err(WatchdogError::Config("port must not be 0".to_string()));
        }
        if self.keep_alive_secs < 5 {
            return Err(WatchdogError::Config(format!(
                "keep_alive_secs must be at least 5, got {}",
                self.keep_alive_secs
            )));
        }
        if self.channel_capacity == 0 {
            return Err(WatchdogError::Config(
                "channel_capacity must not be 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn topics(&self) -> TopicScheme {
        TopicScheme::new(&self.application_id, self.sensor_scheme)
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            topics: self.topics(),
            granularity: self.granularity,
            threshold_property: self.threshold_property.clone(),
            shutdown_token: self.shutdown_token.clone(),
            token_comparison: self.token_comparison,
            threshold: self.threshold,
        }
    }

    #[cfg(feature = "mqtt")]
    pub fn mqtt_settings(&self) -> crate::transport::MqttSettings {
        use crate::controller::DEAD;
        use crate::transport::OutboundMessage;

        crate::transport::MqttSettings {
            host: self.host.clone(),
            port: self.port,
            client_id: self.application_id.clone(),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            last_will: OutboundMessage::retained(self.topics().state(), DEAD),
            request_capacity: self.channel_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = WatchdogConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1883);
        assert_eq!(config.application_id, "temperature-alarm");
        assert_eq!(config.threshold, 65.0);
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
host = "broker.local"
port = 8883
application_id = "rack-7-watchdog"
threshold = 70.5
threshold_property = "cpu-threshold"
sensor_scheme = "sensor-prefix"
granularity = "source-and-component"
token_comparison = "constant-time"
"#,
        );

        let config = load_config(Some(file.path()), &ConfigOverrides::default()).unwrap();
        assert_eq!(config.host, "broker.local");
        assert_eq!(config.port, 8883);
        assert_eq!(config.application_id, "rack-7-watchdog");
        assert_eq!(config.threshold, 70.5);
        assert_eq!(config.threshold_property, "cpu-threshold");
        assert_eq!(config.sensor_scheme, SensorScheme::SensorPrefix);
        assert_eq!(config.granularity, KeyGranularity::SourceAndComponent);
        assert_eq!(config.token_comparison, TokenComparison::ConstantTime);
        // untouched fields keep their defaults
        assert_eq!(config.shutdown_token, "very-secret");
    }

    #[test]
    fn test_overrides_win_over_file() {
        let file = write_config("host = \"broker.local\"\nthreshold = 70.0\n");
        let overrides = ConfigOverrides {
            host: Some("override.local".to_string()),
            port: Some(1884),
            application_id: None,
            threshold: Some(80.0),
        };

        let config = load_config(Some(file.path()), &overrides).unwrap();
        assert_eq!(config.host, "override.local");
        assert_eq!(config.port, 1884);
        assert_eq!(config.threshold, 80.0);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = load_config(
            Some(Path::new("/nonexistent/watchdog.toml")),
            &ConfigOverrides::default(),
        );
        assert!(matches!(result, Err(WatchdogError::Config(_))));
    }

    #[test]
    fn test_invalid_application_id() {
        let config = WatchdogConfig {
            application_id: "a/b".to_string(),
            ..WatchdogConfig::default()
        };
        assert!(config.validate().is_err());

        let config = WatchdogConfig {
            application_id: String::new(),
            ..WatchdogConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multi_component_scheme_needs_component_keys() {
        let config = WatchdogConfig {
            sensor_scheme: SensorScheme::ComponentProperty,
            ..WatchdogConfig::default()
        };
        assert!(matches!(config.validate(), Err(WatchdogError::Config(_))));

        let config = WatchdogConfig {
            sensor_scheme: SensorScheme::ComponentProperty,
            granularity: KeyGranularity::SourceAndComponent,
            ..WatchdogConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_keep_alive() {
        let config = WatchdogConfig {
            keep_alive_secs: 1,
            ..WatchdogConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_controller_settings() {
        let settings = WatchdogConfig::default().controller_settings();
        assert_eq!(settings.topics.application_id(), "temperature-alarm");
        assert_eq!(settings.threshold_property, "threshold");
        assert_eq!(settings.threshold, 65.0);
    }

    #[cfg(feature = "mqtt")]
    #[test]
    fn test_mqtt_settings_last_will() {
        let settings = WatchdogConfig::default().mqtt_settings();
        assert_eq!(settings.last_will.topic, "temperature-alarm/STATE");
        assert_eq!(settings.last_will.payload, "DEAD");
        assert!(settings.last_will.retain);
        assert_eq!(settings.keep_alive, Duration::from_secs(30));
    }
}
