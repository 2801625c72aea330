//! `RelayActor` - single owner of all relay state.
//!
//! The actor holds the [`SessionCoordinator`] and applies mailbox messages
//! one at a time, so every state change is serialized without locks. Each
//! gateway connection talks to it through a cloned [`RelayActorHandle`].
//!
//! # Graceful Shutdown
//!
//! On shutdown (explicit request or parent token cancellation), the actor:
//! 1. Stops accepting new connections
//! 2. Answers requests still queued in its mailbox
//! 3. Discards all state, which closes every connection mailbox

use crate::coordinator::SessionCoordinator;
use crate::errors::RelayError;
use crate::events::InboundEvent;
use crate::state::ConnectionSink;

use super::messages::{RelayMessage, RelayStatus};
use super::metrics::MailboxMonitor;

use common::types::ConnectionId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the relay mailbox.
const RELAY_CHANNEL_BUFFER: usize = 4096;

/// Time allowed to answer queued requests when shutdown came from the
/// parent token rather than an explicit request.
const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Handle to the `RelayActor`.
///
/// Cheap to clone. Request/reply methods wait for the actor's answer;
/// `dispatch` and `disconnect` only wait for mailbox capacity.
#[derive(Debug, Clone)]
pub struct RelayActorHandle {
    sender: mpsc::Sender<RelayMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
}

impl RelayActorHandle {
    /// Spawn a `RelayActor` and return a handle plus its task handle.
    ///
    /// The actor stops when `cancel_token` (or any parent of it) is cancelled.
    #[must_use]
    pub fn spawn(
        relay_id: String,
        coordinator: SessionCoordinator,
        cancel_token: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(RELAY_CHANNEL_BUFFER);
        let mailbox = Arc::new(MailboxMonitor::new(relay_id.clone()));

        let actor = RelayActor {
            relay_id,
            receiver,
            cancel_token: cancel_token.clone(),
            coordinator,
            accepting_new: true,
            shutdown_deadline: DEFAULT_SHUTDOWN_DEADLINE,
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        (
            Self {
                sender,
                cancel_token,
                mailbox,
            },
            task_handle,
        )
    }

    /// Register a connection and its outbound mailbox.
    ///
    /// Fails with [`RelayError::Draining`] once shutdown has started.
    pub async fn connect(
        &self,
        conn_id: ConnectionId,
        sink: ConnectionSink,
    ) -> Result<(), RelayError> {
        let (tx, rx) = oneshot::channel();
        self.send(RelayMessage::Connect {
            conn_id,
            sink,
            respond_to: tx,
        })
        .await
        .map_err(|e| self.draining_or(e))?;

        rx.await.map_err(|e| {
            self.draining_or(RelayError::Internal(format!(
                "response receive failed: {e}"
            )))
        })?
    }

    /// Hand an inbound event to the relay. Does not wait for it to be applied.
    pub async fn dispatch(
        &self,
        conn_id: ConnectionId,
        event: InboundEvent,
    ) -> Result<(), RelayError> {
        self.send(RelayMessage::Inbound { conn_id, event }).await
    }

    /// Report that a connection's transport closed.
    pub async fn disconnect(&self, conn_id: ConnectionId) -> Result<(), RelayError> {
        self.send(RelayMessage::Disconnect { conn_id }).await
    }

    /// Get the current relay status.
    pub async fn get_status(&self) -> Result<RelayStatus, RelayError> {
        let (tx, rx) = oneshot::channel();
        self.send(RelayMessage::GetStatus { respond_to: tx })
            .await?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), RelayError> {
        let (tx, rx) = oneshot::channel();
        self.send(RelayMessage::Shutdown {
            deadline,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))?
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for tasks that must stop with the relay.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    async fn send(&self, message: RelayMessage) -> Result<(), RelayError> {
        self.mailbox.record_enqueue();
        self.sender.send(message).await.map_err(|e| {
            self.mailbox.record_dequeue();
            RelayError::Internal(format!("channel send failed: {e}"))
        })
    }

    fn draining_or(&self, err: RelayError) -> RelayError {
        if self.cancel_token.is_cancelled() {
            RelayError::Draining
        } else {
            err
        }
    }
}

/// The `RelayActor` implementation.
pub struct RelayActor {
    relay_id: String,
    receiver: mpsc::Receiver<RelayMessage>,
    cancel_token: CancellationToken,
    coordinator: SessionCoordinator,
    /// Whether new connections are accepted.
    accepting_new: bool,
    /// Time allowed to answer queued requests during shutdown.
    shutdown_deadline: Duration,
    mailbox: Arc<MailboxMonitor>,
}

impl RelayActor {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "relay.actor", fields(relay_id = %self.relay_id))]
    async fn run(mut self) {
        info!(
            target: "relay.actor",
            relay_id = %self.relay_id,
            "RelayActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "relay.actor",
                        relay_id = %self.relay_id,
                        "RelayActor received cancellation signal"
                    );
                    self.graceful_shutdown();
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message);
                            self.mailbox.record_dequeue();
                        }
                        None => {
                            info!(
                                target: "relay.actor",
                                relay_id = %self.relay_id,
                                "RelayActor channel closed, exiting"
                            );
                            self.coordinator.clear();
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "relay.actor",
            relay_id = %self.relay_id,
            messages_processed = self.mailbox.messages_processed(),
            peak_mailbox_depth = self.mailbox.peak_depth(),
            "RelayActor stopped"
        );
    }

    fn handle_message(&mut self, message: RelayMessage) {
        match message {
            RelayMessage::Connect {
                conn_id,
                sink,
                respond_to,
            } => {
                let result = self.connect(conn_id, sink);
                let _ = respond_to.send(result);
            }

            RelayMessage::Inbound { conn_id, event } => {
                self.coordinator.handle_event(&conn_id, event);
            }

            RelayMessage::Disconnect { conn_id } => {
                self.coordinator.disconnect(&conn_id);
            }

            RelayMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            RelayMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                self.initiate_shutdown(deadline);
                let _ = respond_to.send(Ok(()));
            }
        }
    }

    fn connect(&mut self, conn_id: ConnectionId, sink: ConnectionSink) -> Result<(), RelayError> {
        if !self.accepting_new {
            return Err(RelayError::Draining);
        }

        if self.coordinator.connect(conn_id, sink) {
            Ok(())
        } else {
            Err(RelayError::Internal(
                "connection ID already registered".to_string(),
            ))
        }
    }

    fn get_status(&self) -> RelayStatus {
        RelayStatus {
            session_count: self.coordinator.session_count(),
            connection_count: self.coordinator.connection_count(),
            archived_messages: self.coordinator.archived_messages(),
            mailbox_depth: self.mailbox.current_depth(),
            mailbox_level: self.mailbox.current_level(),
            is_draining: !self.accepting_new,
        }
    }

    fn initiate_shutdown(&mut self, deadline: Duration) {
        info!(
            target: "relay.actor",
            relay_id = %self.relay_id,
            sessions = self.coordinator.session_count(),
            connections = self.coordinator.connection_count(),
            deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            "Initiating graceful shutdown"
        );

        self.accepting_new = false;
        self.shutdown_deadline = deadline;

        // The run loop picks this up on its next iteration.
        self.cancel_token.cancel();
    }

    /// Answer queued requests, then discard all state.
    fn graceful_shutdown(&mut self) {
        self.accepting_new = false;
        self.receiver.close();

        let deadline = Instant::now() + self.shutdown_deadline;
        let mut discarded = 0usize;

        while let Ok(message) = self.receiver.try_recv() {
            self.mailbox.record_dequeue();
            if Instant::now() >= deadline {
                warn!(
                    target: "relay.actor",
                    relay_id = %self.relay_id,
                    "Shutdown deadline reached with messages still queued"
                );
                break;
            }

            match message {
                RelayMessage::Connect { respond_to, .. } => {
                    let _ = respond_to.send(Err(RelayError::Draining));
                }
                RelayMessage::GetStatus { respond_to } => {
                    let _ = respond_to.send(self.get_status());
                }
                RelayMessage::Shutdown { respond_to, .. } => {
                    let _ = respond_to.send(Ok(()));
                }
                RelayMessage::Inbound { .. } | RelayMessage::Disconnect { .. } => {
                    discarded += 1;
                }
            }
        }

        debug!(
            target: "relay.actor",
            relay_id = %self.relay_id,
            discarded_events = discarded,
            sessions = self.coordinator.session_count(),
            connections = self.coordinator.connection_count(),
            "Discarding relay state"
        );
        self.coordinator.clear();

        info!(
            target: "relay.actor",
            relay_id = %self.relay_id,
            "Graceful shutdown complete"
        );
    }
}
