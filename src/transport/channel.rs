//! In-memory transport.
//!
//! Publications are forwarded to a [`ChannelPeer`] and inbound messages are
//! injected through it, so a whole session can run without a broker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Connection, InboundMessage, OutboundMessage, Transport};
use crate::error::{Result, WatchdogError};

/// A transport backed by tokio channels.
///
/// # Example
///
/// ```
/// use temperature_watchdog::transport::{ChannelTransport, InboundMessage};
///
/// let (connection, peer) = ChannelTransport::create("in-memory");
/// peer.send(InboundMessage::new("node-1/property/temperature/cpu", "70°C"));
/// ```
#[derive(Debug)]
pub struct ChannelTransport {
    published: mpsc::UnboundedSender<OutboundMessage>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
    refused: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    description: String,
}

/// The far side of a [`ChannelTransport`].
#[derive(Debug)]
pub struct ChannelPeer {
    inbound: mpsc::UnboundedSender<InboundMessage>,
    /// Everything the transport has published, in order.
    pub published: mpsc::UnboundedReceiver<OutboundMessage>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
    refused: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl ChannelTransport {
    /// Create a connected transport and its peer.
    pub fn create(description: &str) -> (Connection<Self>, ChannelPeer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (published_tx, published_rx) = mpsc::unbounded_channel();
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        let failing = Arc::new(AtomicBool::new(false));
        let refused = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let transport = Self {
            published: published_tx,
            subscriptions: subscriptions.clone(),
            failing: failing.clone(),
            refused: refused.clone(),
            closed: closed.clone(),
            description: format!("channel: {}", description),
        };
        let peer = ChannelPeer {
            inbound: inbound_tx,
            published: published_rx,
            subscriptions,
            failing,
            refused,
            closed,
        };

        (
            Connection {
                transport,
                inbound: inbound_rx,
            },
            peer,
        )
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.is_closed() {
            return Err(WatchdogError::TransportFailure(
                "transport is closed".to_string(),
            ));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(WatchdogError::TransportFailure(
                "simulated transport failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn publish(&self, message: OutboundMessage) -> Result<()> {
        self.ensure_usable()?;
        self.published
            .send(message)
            .map_err(|_| WatchdogError::TransportFailure("peer dropped".to_string()))
    }

    async fn subscribe(&self, filter: &str) -> Result<()> {
        self.ensure_usable()?;
        if self.refused.lock().iter().any(|f| f == filter) {
            return Err(WatchdogError::TransportFailure(format!(
                "subscription to {} refused",
                filter
            )));
        }
        let mut subscriptions = self.subscriptions.lock();
        if !subscriptions.iter().any(|f| f == filter) {
            subscriptions.push(filter.to_string());
        }
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> Result<()> {
        self.ensure_usable()?;
        self.subscriptions.lock().retain(|f| f != filter);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl ChannelPeer {
    /// Deliver a message to the session. Returns `false` once the session is gone.
    pub fn send(&self, message: InboundMessage) -> bool {
        self.inbound.send(message).is_ok()
    }

    /// Filters currently subscribed.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }

    /// Make every subsequent transport operation fail (or succeed again).
    pub fn fail_operations(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make subscribing to `filter` fail.
    pub fn refuse_subscription(&self, filter: &str) {
        self.refused.lock().push(filter.to_string());
    }

    /// Whether the transport side has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Drain publications that are already queued.
    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.published.try_recv() {
            messages.push(message);
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_peer() {
        let (connection, mut peer) = ChannelTransport::create("test");
        connection
            .transport
            .publish(OutboundMessage::retained("app/STATE", "ALIVE"))
            .await
            .unwrap();

        let published = peer.drain();
        assert_eq!(published, vec![OutboundMessage::retained("app/STATE", "ALIVE")]);
    }

    #[tokio::test]
    async fn test_inbound_reaches_connection() {
        let (mut connection, peer) = ChannelTransport::create("test");
        assert!(peer.send(InboundMessage::new("a/b", "1°C")));

        let received = connection.inbound.recv().await.unwrap();
        assert_eq!(received.topic, "a/b");
    }

    #[tokio::test]
    async fn test_subscriptions_are_tracked() {
        let (connection, peer) = ChannelTransport::create("test");
        let transport = connection.transport;

        transport.subscribe("a/#").await.unwrap();
        transport.subscribe("b/+").await.unwrap();
        transport.subscribe("a/#").await.unwrap();
        assert_eq!(peer.subscriptions(), vec!["a/#", "b/+"]);

        transport.unsubscribe("a/#").await.unwrap();
        assert_eq!(peer.subscriptions(), vec!["b/+"]);
    }

    #[tokio::test]
    async fn test_failures_and_close() {
        let (connection, peer) = ChannelTransport::create("test");
        let transport = connection.transport;

        peer.fail_operations(true);
        assert!(matches!(
            transport.publish(OutboundMessage::new("t", "p")).await,
            Err(WatchdogError::TransportFailure(_))
        ));
        peer.fail_operations(false);
        assert!(transport.publish(OutboundMessage::new("t", "p")).await.is_ok());

        transport.close().await.unwrap();
        assert!(transport.is_closed());
        assert!(peer.is_closed());
        assert!(transport.publish(OutboundMessage::new("t", "p")).await.is_err());
    }

    #[tokio::test]
    async fn test_refused_subscription() {
        let (connection, peer) = ChannelTransport::create("test");
        let transport = connection.transport;
        peer.refuse_subscription("b/+");

        transport.subscribe("a/#").await.unwrap();
        assert!(matches!(
            transport.subscribe("b/+").await,
            Err(WatchdogError::TransportFailure(_))
        ));
        assert_eq!(peer.subscriptions(), vec!["a/#"]);
    }

    #[test]
    fn test_description() {
        let (connection, _peer) = ChannelTransport::create("in-memory");
        assert_eq!(connection.transport.description(), "channel: in-memory");
    }
}
