//! `RoomDispatcherActor` - singleton registry of room actors.
//!
//! The dispatcher is the top-level actor:
//!
//! - Singleton per relay instance
//! - Creates room actors on first use (create-if-absent)
//! - Owns the root `CancellationToken` for graceful shutdown
//! - Monitors room actor health (panic detection via `JoinHandle`)
//!
//! All registry operations go through one mailbox, so two concurrent
//! `get_or_create_room` calls for the same name always observe the same room.
//!
//! # Graceful Shutdown
//!
//! On shutdown, the dispatcher:
//! 1. Sets `accepting_new = false`
//! 2. Cancels the root `CancellationToken` (propagates to rooms and connections)
//! 3. Waits up to the deadline for room actors to stop

use crate::errors::RelayError;
use crate::room::{ConnectionPolicy, RegisterOnConnect, RoomOptions};

use super::messages::{DispatcherMessage, DispatcherStatus, RoomInfo};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::room::{RoomActor, RoomActorHandle};

use futures::future::join_all;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the dispatcher mailbox.
const DISPATCHER_CHANNEL_BUFFER: usize = 1000;

/// Longest accepted room name.
pub const MAX_ROOM_NAME_LEN: usize = 128;

/// Wait applied to a room actor removed at runtime.
const ROOM_REMOVAL_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `list_rooms` waits for each room to report its state.
const ROOM_QUERY_TIMEOUT: Duration = Duration::from_secs(1);

/// Builds the connection policy for a newly created room.
pub type PolicyFactory = Arc<dyn Fn(&str) -> Box<dyn ConnectionPolicy> + Send + Sync>;

/// Settings applied to every room the dispatcher creates.
#[derive(Clone)]
pub struct DispatcherSettings {
    pub room_options: RoomOptions,
    /// Creation is refused once this many rooms are live.
    pub max_rooms: usize,
    pub policy_factory: PolicyFactory,
}

impl DispatcherSettings {
    /// Settings with the [`RegisterOnConnect`] policy.
    #[must_use]
    pub fn new(room_options: RoomOptions, max_rooms: usize) -> Self {
        Self {
            room_options,
            max_rooms,
            policy_factory: Arc::new(|_: &str| -> Box<dyn ConnectionPolicy> {
                Box::new(RegisterOnConnect)
            }),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy_factory: PolicyFactory) -> Self {
        self.policy_factory = policy_factory;
        self
    }
}

impl fmt::Debug for DispatcherSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherSettings")
            .field("room_options", &self.room_options)
            .field("max_rooms", &self.max_rooms)
            .finish_non_exhaustive()
    }
}

/// Room names are 1-128 characters of `[A-Za-z0-9._-]`.
pub fn validate_room_name(name: &str) -> Result<(), RelayError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_ROOM_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(RelayError::InvalidRoomName(name.to_string()))
    }
}

/// Handle to the `RoomDispatcherActor`.
#[derive(Clone, Debug)]
pub struct RoomDispatcherActorHandle {
    sender: mpsc::Sender<DispatcherMessage>,
    cancel_token: CancellationToken,
}

impl RoomDispatcherActorHandle {
    /// Spawn the dispatcher and return a handle to it.
    #[must_use]
    pub fn new(settings: DispatcherSettings, metrics: Arc<ActorMetrics>) -> Self {
        let (sender, receiver) = mpsc::channel(DISPATCHER_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = RoomDispatcherActor::new(receiver, cancel_token.clone(), settings, metrics);
        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Return the room named `name`, creating it if absent.
    pub async fn get_or_create_room(&self, name: String) -> Result<RoomActorHandle, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::GetOrCreateRoom {
                name,
                respond_to: tx,
            })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))?
    }

    /// Return an existing room.
    pub async fn get_room(&self, name: String) -> Result<RoomActorHandle, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::GetRoom {
                name,
                respond_to: tx,
            })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))?
    }

    /// Stop a room; its connections are closed.
    pub async fn remove_room(&self, name: String) -> Result<(), RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::RemoveRoom {
                name,
                respond_to: tx,
            })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))?
    }

    pub async fn list_rooms(&self) -> Result<Vec<RoomInfo>, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::ListRooms { respond_to: tx })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    pub async fn get_status(&self) -> Result<DispatcherStatus, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    /// Stop accepting rooms and drain existing ones within `deadline`.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::Shutdown {
                deadline,
                respond_to: tx,
            })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

struct ManagedRoom {
    handle: RoomActorHandle,
    task_handle: JoinHandle<()>,
    created_at: i64,
}

/// The `RoomDispatcherActor` implementation.
pub struct RoomDispatcherActor {
    receiver: mpsc::Receiver<DispatcherMessage>,
    /// Root token.
    cancel_token: CancellationToken,
    rooms: HashMap<String, ManagedRoom>,
    settings: DispatcherSettings,
    accepting_new: bool,
    shutdown_deadline: Duration,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl RoomDispatcherActor {
    fn new(
        receiver: mpsc::Receiver<DispatcherMessage>,
        cancel_token: CancellationToken,
        settings: DispatcherSettings,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        Self {
            receiver,
            cancel_token,
            rooms: HashMap::new(),
            settings,
            accepting_new: true,
            shutdown_deadline: Duration::from_secs(30),
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Dispatcher, "dispatcher"),
        }
    }

    #[instrument(skip_all, name = "relay.actor.dispatcher", fields(max_rooms = self.settings.max_rooms))]
    async fn run(mut self) {
        info!(
            target: "relay.actor.dispatcher",
            max_rooms = self.settings.max_rooms,
            "RoomDispatcherActor started"
        );

        loop {
            self.check_room_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "relay.actor.dispatcher",
                        "RoomDispatcherActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_dequeue(self.receiver.len());
                            self.handle_message(message);
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "relay.actor.dispatcher",
                                "RoomDispatcherActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "relay.actor.dispatcher",
            rooms_remaining = self.rooms.len(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomDispatcherActor stopped"
        );
    }

    fn handle_message(&mut self, message: DispatcherMessage) {
        match message {
            DispatcherMessage::GetOrCreateRoom { name, respond_to } => {
                let _ = respond_to.send(self.get_or_create_room(name));
            }

            DispatcherMessage::GetRoom { name, respond_to } => {
                let result = self
                    .rooms
                    .get(&name)
                    .map(|managed| managed.handle.clone())
                    .ok_or(RelayError::RoomNotFound(name));
                let _ = respond_to.send(result);
            }

            DispatcherMessage::RemoveRoom { name, respond_to } => {
                let _ = respond_to.send(self.remove_room(&name));
            }

            DispatcherMessage::ListRooms { respond_to } => {
                // Rooms are queried off the message loop; a busy room must
                // not hold up room creation.
                let rooms = self.room_snapshot();
                tokio::spawn(async move {
                    let _ = respond_to.send(collect_room_infos(rooms).await);
                });
            }

            DispatcherMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            DispatcherMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                let _ = respond_to.send(self.initiate_shutdown(deadline));
            }
        }
    }

    fn get_or_create_room(&mut self, name: String) -> Result<RoomActorHandle, RelayError> {
        if !self.accepting_new {
            return Err(RelayError::Draining);
        }

        if let Some(managed) = self.rooms.get(&name) {
            return Ok(managed.handle.clone());
        }

        validate_room_name(&name)?;

        if self.rooms.len() >= self.settings.max_rooms {
            warn!(
                target: "relay.actor.dispatcher",
                max_rooms = self.settings.max_rooms,
                "Room capacity reached, refusing creation"
            );
            return Err(RelayError::CapacityExceeded {
                max_rooms: self.settings.max_rooms,
            });
        }

        debug!(
            target: "relay.actor.dispatcher",
            room = %name,
            "Creating room actor"
        );

        let policy = (self.settings.policy_factory)(&name);
        let (handle, task_handle) = RoomActor::spawn(
            name.clone(),
            self.settings.room_options.clone(),
            policy,
            self.cancel_token.child_token(),
            Arc::clone(&self.metrics),
        );

        self.rooms.insert(
            name.clone(),
            ManagedRoom {
                handle: handle.clone(),
                task_handle,
                created_at: chrono::Utc::now().timestamp(),
            },
        );
        self.metrics.room_created();

        info!(
            target: "relay.actor.dispatcher",
            room = %name,
            total_rooms = self.rooms.len(),
            "Room actor created"
        );

        Ok(handle)
    }

    /// Cancel a room without blocking the message loop on its exit.
    fn remove_room(&mut self, name: &str) -> Result<(), RelayError> {
        let managed = self
            .rooms
            .remove(name)
            .ok_or_else(|| RelayError::RoomNotFound(name.to_string()))?;

        managed.handle.cancel();

        let room = name.to_string();
        tokio::spawn(async move {
            match tokio::time::timeout(ROOM_REMOVAL_TIMEOUT, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "relay.actor.dispatcher",
                        room = %room,
                        "Room actor task completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "relay.actor.dispatcher",
                        room = %room,
                        error = ?e,
                        "Room actor task panicked during removal"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "relay.actor.dispatcher",
                        room = %room,
                        "Room actor task cleanup timed out"
                    );
                }
            }
        });

        self.metrics.room_removed();

        info!(
            target: "relay.actor.dispatcher",
            room = %name,
            total_rooms = self.rooms.len(),
            "Room actor removed"
        );

        Ok(())
    }

    fn room_snapshot(&self) -> Vec<(String, RoomActorHandle, i64)> {
        self.rooms
            .iter()
            .map(|(name, managed)| (name.clone(), managed.handle.clone(), managed.created_at))
            .collect()
    }

    fn get_status(&self) -> DispatcherStatus {
        DispatcherStatus {
            room_count: self.rooms.len(),
            connection_count: self.metrics.connection_count(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    fn initiate_shutdown(&mut self, deadline: Duration) -> Result<(), RelayError> {
        info!(
            target: "relay.actor.dispatcher",
            room_count = self.rooms.len(),
            deadline_secs = deadline.as_secs(),
            "Initiating graceful shutdown"
        );

        self.accepting_new = false;
        self.shutdown_deadline = deadline;

        // Propagates to every room and connection
        self.cancel_token.cancel();

        Ok(())
    }

    async fn graceful_shutdown(&mut self) {
        info!(
            target: "relay.actor.dispatcher",
            room_count = self.rooms.len(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;

        for managed in self.rooms.values() {
            managed.handle.cancel();
        }

        let deadline = tokio::time::Instant::now() + self.shutdown_deadline;
        for (name, managed) in self.rooms.drain() {
            match tokio::time::timeout_at(deadline, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "relay.actor.dispatcher",
                        room = %name,
                        "Room actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "relay.actor.dispatcher",
                        room = %name,
                        error = ?e,
                        "Room actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "relay.actor.dispatcher",
                        room = %name,
                        "Room actor shutdown timed out"
                    );
                }
            }
            self.metrics.room_removed();
        }

        info!(
            target: "relay.actor.dispatcher",
            "Graceful shutdown complete"
        );
    }

    async fn check_room_health(&mut self) {
        let finished: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();

        for name in finished {
            let Some(managed) = self.rooms.remove(&name) else {
                continue;
            };
            warn!(
                target: "relay.actor.dispatcher",
                room = %name,
                "Room actor task finished unexpectedly"
            );

            match managed.task_handle.await {
                Ok(()) => {
                    info!(
                        target: "relay.actor.dispatcher",
                        room = %name,
                        "Room actor exited cleanly"
                    );
                }
                Err(join_error) => {
                    if join_error.is_panic() {
                        error!(
                            target: "relay.actor.dispatcher",
                            room = %name,
                            error = ?join_error,
                            "Room actor panicked - triggering investigation"
                        );
                        self.metrics.record_panic(ActorType::Room);
                    }
                }
            }

            self.metrics.room_removed();
        }
    }
}

/// Query every room for its peer count, sorted by name. A room that does
/// not answer within [`ROOM_QUERY_TIMEOUT`] is reported with zero peers.
async fn collect_room_infos(rooms: Vec<(String, RoomActorHandle, i64)>) -> Vec<RoomInfo> {
    let queries = rooms.into_iter().map(|(name, handle, created_at)| async move {
        let peer_count = match tokio::time::timeout(ROOM_QUERY_TIMEOUT, handle.get_state()).await {
            Ok(Ok(state)) => state.peers.len(),
            Ok(Err(e)) => {
                warn!(
                    target: "relay.actor.dispatcher",
                    room = %name,
                    error = %e,
                    "Failed to query room actor state"
                );
                0
            }
            Err(_) => {
                warn!(
                    target: "relay.actor.dispatcher",
                    room = %name,
                    "Room actor state query timed out"
                );
                0
            }
        };
        RoomInfo {
            name,
            peer_count,
            created_at,
        }
    });

    let mut infos = join_all(queries).await;
    infos.sort_by(|a, b| a.name.cmp(&b.name));
    infos
}
