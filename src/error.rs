//! Error types for the watchdog.

use thiserror::Error;
use tracing::{debug, error, warn};

/// Errors that can occur while handling bus traffic or starting a session.
///
/// Everything except failures during startup is recovered locally: the
/// dispatcher reports the error and moves on to the next message.
#[derive(Debug, Error)]
pub enum WatchdogError {
    /// The payload did not carry a parsable measurement.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The measurement carries a unit the watchdog cannot compare.
    #[error("Not implemented: unit '{0}' is not supported")]
    UnrecognizedUnit(String),

    /// A command was received with the wrong shared secret.
    #[error("{0}: refused")]
    UnauthorizedCommand(String),

    /// The transport failed to publish, subscribe or deliver.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// The topic does not match any route.
    #[error("{0} unhandled")]
    UnhandledTopic(String),

    /// The configuration could not be loaded or is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A document could not be serialized.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, WatchdogError>;

impl WatchdogError {
    /// Log the error at the severity matching its kind.
    pub fn report(&self, topic: &str) {
        match self {
            WatchdogError::UnhandledTopic(_) => debug!(topic, "{}", self),
            WatchdogError::TransportFailure(_) | WatchdogError::Serialization(_) => {
                error!(topic, "{}", self)
            }
            _ => warn!(topic, "{}", self),
        }
    }
}

impl From<config::ConfigError> for WatchdogError {
    fn from(err: config::ConfigError) -> Self {
        WatchdogError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for WatchdogError {
    fn from(err: serde_json::Error) -> Self {
        WatchdogError::Serialization(err.to_string())
    }
}

#[cfg(feature = "mqtt")]
impl From<rumqttc::ClientError> for WatchdogError {
    fn from(err: rumqttc::ClientError) -> Self {
        WatchdogError::TransportFailure(err.to_string())
    }
}
