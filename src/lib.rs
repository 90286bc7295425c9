//! # temperature-watchdog
//!
//! A telemetry watchdog for pub/sub message buses. It listens for temperature
//! readings published by remote applications, compares each reading against a
//! configurable threshold and publishes alarm / resolved transitions back onto
//! the bus. It announces its own liveness and accepts remote commands
//! (shutdown, rebirth, threshold update).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Session                             │
//! │  inbound ──▶ ┌────────────┐   ┌───────┐   ┌─────────┐        │
//! │  (mpsc)      │ Controller │──▶│ topic │   │ payload │        │
//! │              │            │──▶└───────┘   └─────────┘        │
//! │              │            │──────────────▶┌─────────┐        │
//! │              └─────┬──────┘               │ ledger  │        │
//! │                    │ publish              └─────────┘        │
//! │                    ▼                                         │
//! │              ┌────────────┐                                  │
//! │              │ Transport  │◀── MqttTransport | ChannelTransport
//! │              └────────────┘                                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`topic`]**: classifies topics into commands, property updates and
//!   remote readings, and builds the topics this application publishes
//! - **[`payload`]**: decodes `"<value><unit>"` payloads and renders them back
//! - **[`ledger`]**: per-source alarm state with duplicate suppression
//! - **[`controller`]**: dispatches each message and publishes the outcome
//! - **[`session`]**: birth, dispatch loop, local/remote shutdown race
//! - **[`transport`]**: bus abstraction ([`Transport`]) with MQTT and
//!   in-memory implementations
//! - **[`config`]**: layered configuration (file, environment, overrides)
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! temperature-watchdog run --host localhost --port 1883 --threshold 65
//! ```
//!
//! ### As a library with the in-memory transport
//!
//! ```
//! use temperature_watchdog::transport::{ChannelTransport, InboundMessage};
//! use temperature_watchdog::{Session, ShutdownReason, WatchdogConfig};
//!
//! # tokio_test::block_on(async {
//! let (connection, mut peer) = ChannelTransport::create("in-memory");
//! let session = Session::new(connection, WatchdogConfig::default().controller_settings());
//!
//! peer.send(InboundMessage::new("node-1/property/temperature/cpu", "70°C"));
//! peer.send(InboundMessage::new("temperature-alarm/command/shutdown", "very-secret"));
//!
//! let reason = session.run(std::future::pending()).await.unwrap();
//! assert_eq!(reason, ShutdownReason::Remote);
//!
//! let alarm = peer
//!     .drain()
//!     .into_iter()
//!     .find(|m| m.topic == "temperature-alarm/property/alarms/node-1")
//!     .unwrap();
//! assert_eq!(alarm.payload, "70°C above 65°C");
//! # });
//! ```

pub mod birth;
pub mod config;
pub mod controller;
pub mod error;
pub mod ledger;
pub mod payload;
pub mod session;
pub mod topic;
pub mod transport;

pub use config::{load_config, ConfigOverrides, WatchdogConfig};
pub use controller::{Controller, ControllerSettings, ControllerState, Dispatch, TokenComparison};
pub use error::{Result, WatchdogError};
pub use ledger::{AlarmKey, AlarmLedger, AlarmRecord, Emission, KeyGranularity};
pub use payload::{Measurement, CELSIUS};
pub use session::{Session, ShutdownReason};
pub use topic::{Route, SensorScheme, TopicScheme};
pub use transport::{Connection, InboundMessage, OutboundMessage, Transport};
