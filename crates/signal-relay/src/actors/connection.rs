//! `ConnectionActor` - per-WebSocket writer.
//!
//! Each `ConnectionActor`:
//! - Serves exactly one peer in one room
//! - Drains the peer's outbound queue and writes every event to the socket as
//!   one JSON text frame
//!
//! The reading half of the socket stays with the transport task, which turns
//! client frames into [`RoomActorHandle`](super::RoomActorHandle) calls.
//!
//! # Lifecycle
//!
//! 1. Spawned by the transport right after the WebSocket upgrade
//! 2. Runs until cancelled, the outbound queue closes, or a write fails
//! 3. Cancellation propagates from the room's token

use crate::room::{OutboundEvent, PeerId};

use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use futures::{Sink, SinkExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Handle to a `ConnectionActor`.
#[derive(Clone, Debug)]
pub struct ConnectionActorHandle {
    cancel_token: CancellationToken,
    peer_id: PeerId,
}

impl ConnectionActorHandle {
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Stop writing and close the socket.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Resolves once the actor has been cancelled.
    pub async fn cancelled(&self) {
        self.cancel_token.cancelled().await;
    }
}

/// The `ConnectionActor` implementation.
pub struct ConnectionActor<S> {
    peer_id: PeerId,
    room: String,
    /// Outbound queue fed by the room.
    receiver: mpsc::Receiver<OutboundEvent>,
    sink: S,
    /// Child of the room's token.
    cancel_token: CancellationToken,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl<S> ConnectionActor<S>
where
    S: Sink<String> + Unpin + Send + 'static,
    S::Error: Display,
{
    /// Spawn a connection actor writing to `sink`.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        peer_id: PeerId,
        room: String,
        receiver: mpsc::Receiver<OutboundEvent>,
        sink: S,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        metrics.connection_created();

        let actor = Self {
            peer_id: peer_id.clone(),
            room,
            receiver,
            sink,
            cancel_token: cancel_token.clone(),
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Connection, peer_id.as_str()),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConnectionActorHandle {
            cancel_token,
            peer_id,
        };

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "relay.actor.connection",
        fields(peer_id = %self.peer_id, room = %self.room)
    )]
    async fn run(mut self) {
        debug!(
            target: "relay.actor.connection",
            peer_id = %self.peer_id,
            room = %self.room,
            "ConnectionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "relay.actor.connection",
                        peer_id = %self.peer_id,
                        "ConnectionActor received cancellation signal"
                    );
                    break;
                }

                event = self.receiver.recv() => {
                    match event {
                        Some(event) => {
                            self.mailbox.record_dequeue(self.receiver.len());
                            let ok = self.write(&event).await;
                            self.metrics.record_message_processed();

                            if !ok {
                                break;
                            }
                        }
                        None => {
                            debug!(
                                target: "relay.actor.connection",
                                peer_id = %self.peer_id,
                                "Outbound queue closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.close().await;

        info!(
            target: "relay.actor.connection",
            peer_id = %self.peer_id,
            room = %self.room,
            messages_processed = self.mailbox.messages_processed(),
            "ConnectionActor stopped"
        );
    }

    /// Write one event. Returns `false` if the socket is unusable.
    async fn write(&mut self, event: &OutboundEvent) -> bool {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    target: "relay.actor.connection",
                    peer_id = %self.peer_id,
                    event = %event.event,
                    error = %e,
                    "Failed to encode outbound event"
                );
                return true;
            }
        };

        match self.sink.send(frame).await {
            Ok(()) => true,
            Err(e) => {
                debug!(
                    target: "relay.actor.connection",
                    peer_id = %self.peer_id,
                    error = %e,
                    "Socket write failed"
                );
                false
            }
        }
    }

    async fn close(&mut self) {
        // Stop the room from queueing more events for us
        self.receiver.close();
        // Let the reader side observe the shutdown
        self.cancel_token.cancel();

        if let Err(e) = self.sink.close().await {
            debug!(
                target: "relay.actor.connection",
                peer_id = %self.peer_id,
                error = %e,
                "Socket close failed"
            );
        }
        self.metrics.connection_closed();
    }
}
