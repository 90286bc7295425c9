//! Watchdog controller: routes inbound messages and publishes the outcome.
//!
//! ```text
//!  Idle ──start()──▶ Running ──shutdown──▶ ShuttingDown ──stop()──▶ Stopped
//!                     │   ▲
//!                     └───┘ dispatch()
//! ```
//!
//! The controller owns the alarm ledger and the threshold. It is driven by a
//! single task, so a ledger update and the publish that reflects it happen
//! before the next message is looked at.

use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::birth;
use crate::error::{Result, WatchdogError};
use crate::ledger::{AlarmKey, AlarmLedger, Emission, KeyGranularity};
use crate::payload::{self, CELSIUS};
use crate::topic::{Route, TopicScheme};
use crate::transport::{InboundMessage, OutboundMessage, Transport};

/// Payload of the liveness topic while running.
pub const ALIVE: &str = "ALIVE";
/// Payload of the last will.
pub const DEAD: &str = "DEAD";
/// Payload published when an alarm clears.
pub const RESOLVED: &str = "resolved";

/// Lifecycle state of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

/// How the shutdown token is compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenComparison {
    #[default]
    Exact,
    /// Examines every byte regardless of where the first mismatch is.
    ConstantTime,
}

impl TokenComparison {
    pub fn matches(&self, presented: &str, expected: &str) -> bool {
        match self {
            TokenComparison::Exact => presented == expected,
            TokenComparison::ConstantTime => {
                let (a, b) = (presented.as_bytes(), expected.as_bytes());
                a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
            }
        }
    }
}

/// Everything a controller needs besides its transport.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub topics: TopicScheme,
    pub granularity: KeyGranularity,
    /// Property name of the threshold, e.g. `threshold` or `cpu-threshold`.
    pub threshold_property: String,
    pub shutdown_token: String,
    pub token_comparison: TokenComparison,
    /// Initial threshold in °C.
    pub threshold: f64,
}

/// What handling one message amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// A reading was evaluated against the ledger.
    Reading(Emission),
    ThresholdUpdated { previous: f64, current: f64 },
    ShutdownRequested,
    Rebirth,
    /// Command or property this application does not know.
    Ignored,
}

/// Routes messages through the topic grammar, codec and ledger.
#[derive(Debug)]
pub struct Controller<T> {
    transport: T,
    settings: ControllerSettings,
    threshold: f64,
    ledger: AlarmLedger,
    state: ControllerState,
    remote_shutdown: Option<oneshot::Sender<()>>,
}

impl<T: Transport> Controller<T> {
    /// Create an idle controller. `remote_shutdown` fires when a valid
    /// shutdown command arrives.
    pub fn new(
        transport: T,
        settings: ControllerSettings,
        remote_shutdown: oneshot::Sender<()>,
    ) -> Self {
        Self {
            transport,
            threshold: settings.threshold,
            settings,
            ledger: AlarmLedger::new(),
            state: ControllerState::Idle,
            remote_shutdown: Some(remote_shutdown),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn ledger(&self) -> &AlarmLedger {
        &self.ledger
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn topics(&self) -> &TopicScheme {
        &self.settings.topics
    }

    /// Announce birth and subscribe. Any failure here is fatal to the session.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != ControllerState::Idle {
            return Ok(());
        }

        self.publish_birth().await?;

        for filter in self.settings.topics.subscriptions() {
            self.transport.subscribe(&filter).await?;
            info!("Subscribed to: {}", filter);
        }

        self.state = ControllerState::Running;
        Ok(())
    }

    /// Publish liveness, manifest, active alarms and the threshold.
    pub async fn publish_birth(&self) -> Result<()> {
        let topics = &self.settings.topics;

        self.transport
            .publish(OutboundMessage::retained(topics.state(), ALIVE))
            .await?;

        let manifest = birth::encode_manifest(topics, &self.settings.threshold_property)?;
        self.transport
            .publish(OutboundMessage::retained(topics.birth(), manifest))
            .await?;

        for (key, record) in self.ledger.iter() {
            self.transport
                .publish(OutboundMessage::new(
                    topics.alarm(key),
                    alarm_payload(record.value, record.threshold),
                ))
                .await?;
        }

        self.publish_threshold().await
    }

    async fn publish_threshold(&self) -> Result<()> {
        let topic = self
            .settings
            .topics
            .property(&self.settings.threshold_property);
        self.transport
            .publish(OutboundMessage::new(
                topic,
                payload::encode(self.threshold, CELSIUS),
            ))
            .await
    }

    /// Handle one inbound message.
    ///
    /// Errors are meant to be reported by the caller; none of them leave the
    /// controller in an inconsistent state.
    pub async fn dispatch(&mut self, message: &InboundMessage) -> Result<Dispatch> {
        if self.state != ControllerState::Running {
            debug!(topic = %message.topic, "Not running, dropping message");
            return Ok(Dispatch::Ignored);
        }

        match self.settings.topics.classify(&message.topic) {
            Route::Command(name) => self.handle_command(name, message).await,
            Route::PropertySet(name) => self.handle_property_set(name, message).await,
            Route::RemoteTemperature { source, component } => {
                self.handle_temperature(source, component, &message.payload)
                    .await
            }
            Route::Unhandled => Err(WatchdogError::UnhandledTopic(message.topic.clone())),
        }
    }

    async fn handle_command(&mut self, name: &str, message: &InboundMessage) -> Result<Dispatch> {
        match name {
            "shutdown" => {
                let settings = &self.settings;
                if !settings
                    .token_comparison
                    .matches(&message.payload, &settings.shutdown_token)
                {
                    return Err(WatchdogError::UnauthorizedCommand(message.topic.clone()));
                }
                info!("Shutting down by remote request");
                self.begin_shutdown();
                if let Some(tx) = self.remote_shutdown.take() {
                    let _ = tx.send(());
                }
                Ok(Dispatch::ShutdownRequested)
            }
            "rebirth" => {
                info!("Publishing birth as requested from remote");
                self.publish_birth().await?;
                Ok(Dispatch::Rebirth)
            }
            other => {
                debug!(topic = %message.topic, "Unknown command '{}'", other);
                Ok(Dispatch::Ignored)
            }
        }
    }

    async fn handle_property_set(
        &mut self,
        name: &str,
        message: &InboundMessage,
    ) -> Result<Dispatch> {
        if name != self.settings.threshold_property {
            debug!(topic = %message.topic, "Unknown property '{}'", name);
            return Ok(Dispatch::Ignored);
        }

        let current = payload::decode(&message.payload)?.into_celsius()?;
        let previous = self.threshold;
        self.threshold = current;
        info!(
            "{}: updated temperature threshold from {} to {}",
            message.topic,
            payload::encode(previous, CELSIUS),
            payload::encode(current, CELSIUS)
        );

        self.publish_threshold().await?;
        Ok(Dispatch::ThresholdUpdated { previous, current })
    }

    async fn handle_temperature(
        &mut self,
        source: &str,
        component: &str,
        raw: &str,
    ) -> Result<Dispatch> {
        let value = payload::decode(raw)?.into_celsius()?;
        let key = self.settings.granularity.key(source, component);
        let previous = self.ledger.record(&key);
        let emission = self.ledger.evaluate(key.clone(), value, self.threshold);

        if let Err(e) = self.announce(source, component, value, &emission).await {
            // the bus never saw the transition, so neither does the ledger
            self.ledger.restore(key, previous);
            return Err(e);
        }

        Ok(Dispatch::Reading(emission))
    }

    async fn announce(
        &self,
        source: &str,
        component: &str,
        value: f64,
        emission: &Emission,
    ) -> Result<()> {
        match emission {
            Emission::AlarmRaised {
                key,
                value,
                threshold,
            } => {
                warn!(
                    source,
                    component,
                    "temperature alarm! ({} {} above {})",
                    key,
                    payload::encode(*value, CELSIUS),
                    payload::encode(*threshold, CELSIUS)
                );
                self.publish_alarm(key, alarm_payload(*value, *threshold))
                    .await?;
            }
            Emission::AlarmResolved { key, value } => {
                info!(
                    source,
                    component,
                    "temperature of {} back to normal ({})",
                    key,
                    payload::encode(*value, CELSIUS)
                );
                self.publish_alarm(key, RESOLVED.to_string()).await?;
            }
            Emission::AlarmSustainedSilently { recorded } => debug!(
                source,
                component,
                "temperature is {} (still above threshold, alarmed at {})",
                payload::encode(value, CELSIUS),
                payload::encode(*recorded, CELSIUS)
            ),
            Emission::NoAlarm => debug!(
                source,
                component,
                "temperature is {}",
                payload::encode(value, CELSIUS)
            ),
        }

        Ok(())
    }

    async fn publish_alarm(&self, key: &AlarmKey, payload: String) -> Result<()> {
        self.transport
            .publish(OutboundMessage::new(self.settings.topics.alarm(key), payload))
            .await
    }

    /// Stop accepting messages.
    pub fn begin_shutdown(&mut self) {
        if matches!(self.state, ControllerState::Idle | ControllerState::Running) {
            self.state = ControllerState::ShuttingDown;
        }
    }

    /// Release subscriptions and close the transport. Publishes nothing; the
    /// broker announces death through the last will.
    pub async fn stop(&mut self) -> Result<()> {
        self.begin_shutdown();
        if self.state == ControllerState::Stopped {
            return Ok(());
        }

        let mut result = Ok(());
        for filter in self.settings.topics.subscriptions() {
            if let Err(e) = self.transport.unsubscribe(&filter).await {
                e.report(&filter);
                result = Err(e);
            }
        }
        self.transport.close().await?;
        self.state = ControllerState::Stopped;
        result
    }
}

/// `"<value>°C above <threshold>°C"`
pub fn alarm_payload(value: f64, threshold: f64) -> String {
    format!(
        "{} above {}",
        payload::encode(value, CELSIUS),
        payload::encode(threshold, CELSIUS)
    )
}
