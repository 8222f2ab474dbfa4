//! `RoomActor` - per-room actor that owns one [`Room`].
//!
//! Each `RoomActor`:
//! - Owns the room's peer registry and role graph
//! - Processes one mailbox message at a time, so no two operations on a room
//!   ever interleave
//! - Hands the room's lifecycle events (`connection`, `disconnect`) to its
//!   [`ConnectionPolicy`] after every message
//!
//! Peers' outbound queues are fed directly by the room; `ConnectionActor`s
//! drain them into the sockets. Connection tokens are children of the room's
//! token, so cancelling a room closes its connections.

use crate::errors::RelayError;
use crate::observability::metrics as prom;
use crate::room::{
    ConnectResponse, ConnectionPolicy, Peer, PeerId, PeerInfo, Room, RoomEvent, RoomOptions,
    RoomState, SendTarget, SignalRequest,
};

use super::messages::RoomMessage;
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 500;

/// Handle to a `RoomActor`.
#[derive(Clone, Debug)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    name: String,
}

impl RoomActorHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask to join the room. Returns the acknowledgment payload; whether the
    /// peer is registered is up to the room's policy.
    pub async fn connect_request(
        &self,
        peer: Peer,
        payload: Option<Value>,
    ) -> Result<ConnectResponse, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::ConnectRequest {
                peer,
                payload,
                respond_to: tx,
            })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    /// Forward a signal. Fire-and-forget: dropped signals are not reported.
    pub async fn signal(&self, source: PeerId, request: SignalRequest) -> Result<(), RelayError> {
        self.sender
            .send(RoomMessage::Signal { source, request })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))
    }

    /// Report that a peer's transport went away.
    pub async fn disconnect(&self, peer_id: PeerId) -> Result<(), RelayError> {
        self.sender
            .send(RoomMessage::Disconnect { peer_id })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))
    }

    pub async fn connect_roles(&self, a: String, b: String) -> Result<(), RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::ConnectRoles {
                a,
                b,
                respond_to: tx,
            })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    pub async fn disconnect_roles(&self, a: String, b: String) -> Result<(), RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::DisconnectRoles {
                a,
                b,
                respond_to: tx,
            })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    /// Administrative push. Returns how many peers the event was queued for.
    pub async fn send_to(
        &self,
        targets: Vec<SendTarget>,
        event: String,
        data: Option<Value>,
    ) -> Result<usize, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::SendTo {
                targets,
                event,
                data,
                respond_to: tx,
            })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    /// Peers currently authorized relative to a registered peer.
    pub async fn authorized_peers(&self, peer_id: PeerId) -> Result<Vec<PeerInfo>, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::AuthorizedPeers {
                peer_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))?
    }

    pub async fn is_registered(&self, peer_id: PeerId) -> Result<bool, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::IsRegistered {
                peer_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    pub async fn get_state(&self) -> Result<RoomState, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::GetState { respond_to: tx })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the room actor and, through child tokens, its connections.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Token for a connection actor serving this room.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

#[cfg(test)]
impl RoomActorHandle {
    /// A handle with no actor behind it; messages sit in the returned
    /// receiver until the test reads them.
    pub(crate) fn detached(name: &str) -> (Self, mpsc::Receiver<RoomMessage>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);
        let handle = Self {
            sender,
            cancel_token: CancellationToken::new(),
            name: name.to_string(),
        };
        (handle, receiver)
    }
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    name: String,
    room: Room,
    policy: Box<dyn ConnectionPolicy>,
    receiver: mpsc::Receiver<RoomMessage>,
    /// Child of the dispatcher's token.
    cancel_token: CancellationToken,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl RoomActor {
    /// Spawn a new room actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        name: String,
        options: RoomOptions,
        policy: Box<dyn ConnectionPolicy>,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);

        let actor = Self {
            name: name.clone(),
            room: Room::new(name.clone(), options),
            policy,
            receiver,
            cancel_token: cancel_token.clone(),
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Room, &name),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            name,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "relay.actor.room", fields(room = %self.name))]
    async fn run(mut self) {
        info!(
            target: "relay.actor.room",
            room = %self.name,
            "RoomActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "relay.actor.room",
                        room = %self.name,
                        "RoomActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_dequeue(self.receiver.len());
                            let kind = message.kind();
                            let started = Instant::now();
                            self.handle_message(message);
                            self.dispatch_events();
                            prom::record_message_latency(kind, started.elapsed());
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "relay.actor.room",
                                room = %self.name,
                                "RoomActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "relay.actor.room",
            room = %self.name,
            peers = self.room.peer_count(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomActor stopped"
        );
    }

    fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::ConnectRequest {
                peer,
                payload,
                respond_to,
            } => {
                let response = self.room.handle_connect_request(peer, payload);
                // Registration and roster events must be queued before the ack
                self.dispatch_events();
                let _ = respond_to.send(response);
            }

            RoomMessage::Signal { source, request } => {
                let target = request.target.clone();
                if !self.room.handle_signal(&source, request) {
                    debug!(
                        target: "relay.actor.room",
                        room = %self.name,
                        source = %source,
                        target = %target,
                        "Signal dropped"
                    );
                }
            }

            RoomMessage::Disconnect { peer_id } => {
                self.room.handle_disconnect(&peer_id);
            }

            RoomMessage::ConnectRoles { a, b, respond_to } => {
                self.room.connect_roles(&a, &b);
                let _ = respond_to.send(());
            }

            RoomMessage::DisconnectRoles { a, b, respond_to } => {
                self.room.disconnect_roles(&a, &b);
                let _ = respond_to.send(());
            }

            RoomMessage::SendTo {
                targets,
                event,
                data,
                respond_to,
            } => {
                let delivered = self.room.send_to_many(targets, &event, data);
                debug!(
                    target: "relay.actor.room",
                    room = %self.name,
                    event = %event,
                    delivered,
                    "Administrative send"
                );
                let _ = respond_to.send(delivered);
            }

            RoomMessage::AuthorizedPeers {
                peer_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.room.authorized_peers_for(&peer_id));
            }

            RoomMessage::IsRegistered {
                peer_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.room.is_registered(&peer_id));
            }

            RoomMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.room.state());
            }
        }
    }

    /// Hand queued lifecycle events to the policy, oldest first. Events the
    /// policy itself causes are handled in the same pass.
    fn dispatch_events(&mut self) {
        loop {
            let events = self.room.take_events();
            if events.is_empty() {
                break;
            }
            for event in events {
                match event {
                    RoomEvent::Connection { peer, payload } => {
                        self.policy.on_connection(&mut self.room, peer, payload);
                    }
                    RoomEvent::Disconnect { peer } => {
                        self.policy.on_disconnect(&mut self.room, &peer);
                    }
                }
            }
        }
    }
}
