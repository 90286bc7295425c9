//! MQTT transport built on rumqttc.
//!
//! The connection is established with a retained last will, so the broker
//! announces the application's death when the socket goes away without a
//! clean DISCONNECT. A background task drives the event loop, forwards
//! publications to the inbound channel and restores subscriptions after a
//! reconnect.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Connection, InboundMessage, OutboundMessage, Transport};
use crate::error::{Result, WatchdogError};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Connection parameters for [`MqttTransport::connect`].
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Published by the broker on ungraceful disconnect.
    pub last_will: OutboundMessage,
    /// Capacity of the client's outgoing request queue.
    pub request_capacity: usize,
}

/// A transport connected to an MQTT broker.
pub struct MqttTransport {
    client: AsyncClient,
    subscriptions: Arc<Mutex<Vec<String>>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    description: String,
}

impl MqttTransport {
    /// Connect to the broker and wait for its acknowledgement.
    ///
    /// Fails if the first connection attempt is refused or cannot be made.
    pub async fn connect(settings: MqttSettings) -> Result<Connection<Self>> {
        let description = format!("mqtt://{}:{}", settings.host, settings.port);

        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);
        options.set_last_will(LastWill::new(
            settings.last_will.topic.clone(),
            settings.last_will.payload.clone().into_bytes(),
            QoS::AtLeastOnce,
            settings.last_will.retain,
        ));

        let (client, mut eventloop) = AsyncClient::new(options, settings.request_capacity);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("Connected to {} ({:?})", description, ack.code);
                    break;
                }
                Ok(event) => debug!("MQTT event before ConnAck: {:?}", event),
                Err(e) => {
                    return Err(WatchdogError::TransportFailure(format!(
                        "failed to connect to {}: {}",
                        description, e
                    )));
                }
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        let handle = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            tx,
            subscriptions.clone(),
        ));

        Ok(Connection {
            transport: Self {
                client,
                subscriptions,
                event_loop: Mutex::new(Some(handle)),
                description,
            },
            inbound: rx,
        })
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    subscriptions: Arc<Mutex<Vec<String>>>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage::from_bytes(publish.topic, &publish.payload);
                if inbound.send(message).is_err() {
                    info!("Inbound receiver dropped, stopping MQTT event loop");
                    break;
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                // Clean session: the broker forgot our subscriptions
                let filters = subscriptions.lock().clone();
                info!("Reconnected, restoring {} subscriptions", filters.len());
                for filter in filters {
                    // try_subscribe: awaiting here would stall the event loop
                    if let Err(e) = client.try_subscribe(filter.clone(), QoS::AtLeastOnce) {
                        warn!("Failed to restore subscription {}: {}", filter, e);
                    }
                }
            }
            Ok(event) => debug!("MQTT event: {:?}", event),
            Err(e) => {
                error!("MQTT connection error: {}", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, message: OutboundMessage) -> Result<()> {
        self.client
            .publish(
                message.topic,
                QoS::AtLeastOnce,
                message.retain,
                message.payload.into_bytes(),
            )
            .await?;
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<()> {
        self.client.subscribe(filter, QoS::AtLeastOnce).await?;
        let mut subscriptions = self.subscriptions.lock();
        if !subscriptions.iter().any(|f| f == filter) {
            subscriptions.push(filter.to_string());
        }
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> Result<()> {
        self.subscriptions.lock().retain(|f| f != filter);
        self.client.unsubscribe(filter).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // No DISCONNECT: dropping the socket makes the broker publish the last will
        if let Some(handle) = self.event_loop.lock().take() {
            handle.abort();
        }
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("description", &self.description)
            .field("subscriptions", &*self.subscriptions.lock())
            .finish()
    }
}
