//! Matchmaking service
//!
//! Assigns sessions to rooms under a single assignment lock, so a session is
//! either fully placed (bots created, routing installed) or not placed at
//! all. Default policy is self-play-first: a registration with no mode
//! preference gets its own self-play room immediately rather than waiting
//! for an opponent.

use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::queue::PvpQueue;
use crate::config::Config;
use crate::game::room::{MatchRoom, RoomCommand, RoomHandle, RoomRegistry, Seat};
use crate::game::SessionInput;
use crate::ws::protocol::{ClientMsg, MatchMode};

/// Matchmaking failures surfaced to the session
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    /// Retryable: the room cap is reached, try again shortly
    #[error("no room available, retry shortly")]
    NoRoomAvailable,

    #[error("session is already registered")]
    AlreadyRegistered,

    #[error("room {0} not found")]
    UnknownRoom(Uuid),

    /// The target room shut down while the command was in flight
    #[error("room is shutting down")]
    RoomClosed,
}

/// Result of a successful registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Placed in a room; the room confirms with a `registered` frame
    Assigned { room_id: Uuid },
    /// PvP: waiting for an opponent at the given 1-based position
    Queued { position: usize },
}

pub struct MatchmakingService {
    config: Arc<Config>,
    registry: Arc<RoomRegistry>,
    /// Assignment lock; every placement decision happens under it
    queue: Mutex<PvpQueue>,
    /// session id -> room id routing table
    assignments: DashMap<Uuid, Uuid>,
}

impl MatchmakingService {
    pub fn new(config: Arc<Config>, registry: Arc<RoomRegistry>) -> Self {
        Self {
            config,
            registry,
            queue: Mutex::new(PvpQueue::default()),
            assignments: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Place a session according to its mode preference. Atomic: on any
    /// error the session ends up neither queued nor assigned.
    pub async fn register(
        &self,
        seat: Seat,
        mode: Option<MatchMode>,
        model_ref: Option<String>,
    ) -> Result<RegisterOutcome, MatchmakingError> {
        let session_id = seat.session_id;
        let mut queue = self.queue.lock().await;
        if self.assignments.contains_key(&session_id) || queue.contains(session_id) {
            return Err(MatchmakingError::AlreadyRegistered);
        }

        info!(
            %session_id,
            player_id = %seat.player_id,
            mode = ?mode,
            model_ref = model_ref.as_deref().unwrap_or("-"),
            "registering session"
        );

        match mode {
            Some(MatchMode::Pvp) => {
                let Some(peer) = queue.pop() else {
                    let position = queue.push(seat);
                    return Ok(RegisterOutcome::Queued { position });
                };
                self.pair_pvp(&mut queue, peer, seat).await
            }
            Some(MatchMode::Practice) => self.place_solo(MatchMode::Practice, seat).await,
            Some(MatchMode::SelfPlay) => self.place_solo(MatchMode::SelfPlay, seat).await,
            // No preference: complete a waiting PvP pair if one exists,
            // otherwise self-play-first
            None => {
                if let Some(peer) = queue.pop() {
                    self.pair_pvp(&mut queue, peer, seat).await
                } else {
                    self.place_solo(MatchMode::SelfPlay, seat).await
                }
            }
        }
    }

    async fn place_solo(
        &self,
        mode: MatchMode,
        seat: Seat,
    ) -> Result<RegisterOutcome, MatchmakingError> {
        let session_id = seat.session_id;
        let handle = self.spawn_room(mode)?;
        let room_id = handle.id;
        self.attach(&handle, seat).await?;
        self.assignments.insert(session_id, room_id);
        Ok(RegisterOutcome::Assigned { room_id })
    }

    async fn pair_pvp(
        &self,
        queue: &mut PvpQueue,
        peer: super::queue::WaitingSession,
        seat: Seat,
    ) -> Result<RegisterOutcome, MatchmakingError> {
        let session_id = seat.session_id;
        let handle = match self.spawn_room(MatchMode::Pvp) {
            Ok(handle) => handle,
            Err(err) => {
                // The peer keeps its place at the head of the queue
                queue.requeue_front(peer);
                return Err(err);
            }
        };
        let room_id = handle.id;
        let peer_session = peer.seat.session_id;
        if let Err(err) = self.attach(&handle, peer.seat).await {
            warn!(room_id = %room_id, "pvp peer attach failed: {err}");
            return Err(err);
        }
        self.assignments.insert(peer_session, room_id);
        if let Err(err) = self.attach(&handle, seat).await {
            // Peer stays placed; the new session reports the error
            warn!(room_id = %room_id, "second pvp attach failed: {err}");
            return Err(err);
        }
        self.assignments.insert(session_id, room_id);
        Ok(RegisterOutcome::Assigned { room_id })
    }

    /// Attach a viewer session to an existing room
    pub async fn spectate(&self, seat: Seat, room_id: Uuid) -> Result<(), MatchmakingError> {
        let session_id = seat.session_id;
        let _queue = self.queue.lock().await;
        if self.assignments.contains_key(&session_id) {
            return Err(MatchmakingError::AlreadyRegistered);
        }
        let handle = self
            .registry
            .get(&room_id)
            .ok_or(MatchmakingError::UnknownRoom(room_id))?;
        self.attach(&handle, seat).await?;
        self.assignments.insert(session_id, room_id);
        Ok(())
    }

    /// Forward a client message to the session's room
    pub async fn route(&self, input: SessionInput) {
        let session_id = input.session_id;
        let Some(room_id) = self.assignments.get(&session_id).map(|e| *e.value()) else {
            // Queued sessions can still leave; everything else is dropped
            if matches!(input.msg, ClientMsg::Leave) {
                self.queue.lock().await.remove(session_id);
            } else {
                debug!(%session_id, "message from unassigned session dropped");
            }
            return;
        };

        let Some(handle) = self.registry.get(&room_id) else {
            warn!(%session_id, %room_id, "assigned room no longer exists");
            self.assignments.remove(&session_id);
            return;
        };
        if handle
            .command_tx
            .send(RoomCommand::Client(input))
            .await
            .is_err()
        {
            self.assignments.remove(&session_id);
        }
    }

    /// Remove a session entirely: dequeue if waiting, detach if placed
    pub async fn unregister(&self, session_id: Uuid) {
        self.queue.lock().await.remove(session_id);
        let Some((_, room_id)) = self.assignments.remove(&session_id) else {
            return;
        };
        if let Some(handle) = self.registry.get(&room_id) {
            let _ = handle
                .command_tx
                .send(RoomCommand::Detach { session_id })
                .await;
        }
        info!(%session_id, %room_id, "session unregistered");
    }

    fn spawn_room(&self, mode: MatchMode) -> Result<RoomHandle, MatchmakingError> {
        if self.registry.len() >= self.config.max_rooms {
            warn!(max_rooms = self.config.max_rooms, "room cap reached");
            return Err(MatchmakingError::NoRoomAvailable);
        }

        let seed: u64 = rand::thread_rng().gen();
        let (room, handle) = MatchRoom::new(
            mode,
            self.config.arena_width,
            self.config.arena_height,
            seed,
        );
        info!(room_id = %handle.id, %mode, seed, "room created");
        self.registry.insert(handle.clone());

        let registry = self.registry.clone();
        let room_id = handle.id;
        tokio::spawn(async move {
            room.run().await;
            registry.remove(&room_id);
            info!(room_id = %room_id, "room torn down");
        });

        Ok(handle)
    }

    async fn attach(&self, handle: &RoomHandle, seat: Seat) -> Result<(), MatchmakingError> {
        handle
            .command_tx
            .send(RoomCommand::Attach(seat))
            .await
            .map_err(|_| MatchmakingError::RoomClosed)
    }
}
