//! Session lifecycle.
//!
//! A session announces birth, subscribes, and then dispatches inbound
//! messages one at a time until either the local shutdown future completes or
//! a valid remote shutdown command arrives. Both signals are checked before
//! every dispatch, so once one of them fires no further message is handled.

use std::future::Future;

use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::controller::{Controller, ControllerSettings};
use crate::error::{Result, WatchdogError};
use crate::transport::{Connection, InboundMessage, Transport};

/// Which signal ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The local shutdown future completed (e.g. Ctrl-C).
    Local,
    /// A shutdown command with the correct token was received.
    Remote,
}

/// One run of the watchdog over one connection.
#[derive(Debug)]
pub struct Session<T> {
    controller: Controller<T>,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
    remote_shutdown: oneshot::Receiver<()>,
}

impl<T: Transport> Session<T> {
    pub fn new(connection: Connection<T>, settings: ControllerSettings) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            controller: Controller::new(connection.transport, settings, tx),
            inbound: connection.inbound,
            remote_shutdown: rx,
        }
    }

    pub fn controller(&self) -> &Controller<T> {
        &self.controller
    }

    /// Run until shutdown and release the transport.
    ///
    /// Fails if birth or subscription fails, or if the inbound stream ends.
    /// The transport is released in every case.
    pub async fn run<F>(self, local_shutdown: F) -> Result<ShutdownReason>
    where
        F: Future<Output = ()>,
    {
        let Session {
            mut controller,
            mut inbound,
            mut remote_shutdown,
        } = self;

        if let Err(e) = controller.start().await {
            // release whatever was subscribed before the failure
            if let Err(stop_err) = controller.stop().await {
                stop_err.report(controller.transport().description());
            }
            return Err(e);
        }
        info!(
            "Watching {} as '{}'",
            controller.transport().description(),
            controller.topics().application_id()
        );

        tokio::pin!(local_shutdown);

        let outcome = loop {
            tokio::select! {
                biased;

                _ = &mut local_shutdown => {
                    info!("Shutdown requested locally");
                    break Ok(ShutdownReason::Local);
                }
                _ = &mut remote_shutdown => {
                    break Ok(ShutdownReason::Remote);
                }
                message = inbound.recv() => match message {
                    Some(message) => {
                        if let Err(e) = controller.dispatch(&message).await {
                            e.report(&message.topic);
                        }
                    }
                    None => {
                        break Err(WatchdogError::TransportFailure(
                            "inbound message stream closed".to_string(),
                        ));
                    }
                }
            }
        };

        controller.begin_shutdown();
        let stopped = controller.stop().await;

        let reason = outcome?;
        stopped?;
        info!("Bye!");
        Ok(reason)
    }
}
