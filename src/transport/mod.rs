//! Transport abstraction for the pub/sub bus.
//!
//! The watchdog core only needs to publish, subscribe and unsubscribe; inbound
//! traffic arrives on an unbounded channel that the session consumes from a
//! single task. Implementations:
//!
//! - [`ChannelTransport`]: in-memory, for tests and embedding
//! - [`MqttTransport`]: MQTT broker connection (requires the `mqtt` feature)

mod channel;
#[cfg(feature = "mqtt")]
mod mqtt;

pub use channel::{ChannelPeer, ChannelTransport};
#[cfg(feature = "mqtt")]
pub use mqtt::{MqttSettings, MqttTransport};

use std::fmt::Debug;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// A message received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Build a message from a raw payload, replacing invalid UTF-8.
    pub fn from_bytes(topic: impl Into<String>, payload: &[u8]) -> Self {
        Self::new(topic, String::from_utf8_lossy(payload))
    }
}

/// A message to publish on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }

    /// A message the broker keeps for late subscribers.
    pub fn retained(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            retain: true,
            ..Self::new(topic, payload)
        }
    }
}

/// Operations the watchdog needs from the bus.
///
/// `publish` hands the message to the transport and returns without waiting
/// for broker acknowledgement.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn publish(&self, message: OutboundMessage) -> Result<()>;

    async fn subscribe(&self, filter: &str) -> Result<()>;

    async fn unsubscribe(&self, filter: &str) -> Result<()>;

    /// Drop the connection. Nothing is published after this.
    async fn close(&self) -> Result<()>;

    /// Human-readable description of the endpoint.
    fn description(&self) -> &str;
}

/// An open transport together with its inbound message stream.
#[derive(Debug)]
pub struct Connection<T> {
    pub transport: T,
    pub inbound: mpsc::UnboundedReceiver<InboundMessage>,
}
