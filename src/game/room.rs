//! Match rooms
//!
//! One room owns one `WorldState` and runs it on a dedicated tokio task.
//! Everything reaching the room goes through its command inbox and is
//! drained at tick boundaries, so the simulation itself never locks. Output
//! flows through each session's broadcast channel; a slow consumer lags and
//! drops old frames instead of stalling the tick loop.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::lifecycle::{self, LifecycleTransition};
use super::resolver;
use super::snapshot;
use super::world::{BotKind, WorldState};
use super::{BotId, Intent, SessionInput};
use crate::util::time::{tick_period, unix_millis, SPEED_MULTIPLIERS};
use crate::ws::protocol::{ClientMsg, ErrorCode, GameEvent, MatchMode, ServerMsg};

/// Command inbox capacity per room
const COMMAND_BUFFER: usize = 256;
/// Outbound frames buffered per session before lagging drops the oldest
const SESSION_BUFFER: usize = 64;
/// Ticks a freshly created room waits for its first attach before closing
const UNCLAIMED_GRACE_TICKS: u32 = 600;
/// Scripted opponents per practice room
const PRACTICE_OPPONENTS: usize = 2;
/// Synthetic clones per self-play session
const SELF_PLAY_CLONES: usize = 2;

/// A session joining a room
#[derive(Debug, Clone)]
pub struct Seat {
    pub session_id: Uuid,
    pub player_id: Uuid,
    pub bot_name: String,
    /// Viewers receive snapshots but control no bots
    pub viewer: bool,
    pub tx: broadcast::Sender<ServerMsg>,
}

/// Commands processed at the next tick boundary
#[derive(Debug)]
pub enum RoomCommand {
    Attach(Seat),
    Detach { session_id: Uuid },
    Client(SessionInput),
}

/// Shared handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: Uuid,
    pub mode: MatchMode,
    pub command_tx: mpsc::Sender<RoomCommand>,
    /// Attached non-viewer sessions
    pub player_count: Arc<AtomicUsize>,
    pub created_at: u64,
}

/// All live rooms, keyed by room id
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<Uuid, RoomHandle>,
}

impl RoomRegistry {
    pub fn insert(&self, handle: RoomHandle) {
        self.rooms.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<RoomHandle> {
        self.rooms.remove(id).map(|(_, handle)| handle)
    }

    pub fn get(&self, id: &Uuid) -> Option<RoomHandle> {
        self.rooms.get(id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn total_players(&self) -> usize {
        self.rooms
            .iter()
            .map(|entry| entry.player_count.load(Ordering::Relaxed))
            .sum()
    }

    pub fn handles(&self) -> Vec<RoomHandle> {
        self.rooms.iter().map(|entry| entry.clone()).collect()
    }
}

struct SeatState {
    seat: Seat,
    /// Bots this session controls, primary first
    bots: Vec<BotId>,
    /// Highest input sequence number seen per bot
    last_seq: HashMap<BotId, u32>,
}

struct ScriptedState {
    intent: Intent,
    next_change_tick: u64,
}

/// One match room and its authoritative world
pub struct MatchRoom {
    id: Uuid,
    mode: MatchMode,
    world: WorldState,
    rng: ChaCha8Rng,

    seats: HashMap<Uuid, SeatState>,
    /// Latest-wins intent per bot, reused when no fresh input arrives
    intents: BTreeMap<BotId, Intent>,
    /// Id-ordered so RNG draws map to drones identically across runs
    scripted: BTreeMap<BotId, ScriptedState>,

    speed_multiplier: u32,
    pending_speed: Option<u32>,
    selected_bot: Option<BotId>,
    debug: bool,

    command_rx: mpsc::Receiver<RoomCommand>,
    player_count: Arc<AtomicUsize>,
    started: bool,
    ever_attached: bool,
    unclaimed_ticks: u32,
}

impl MatchRoom {
    pub fn new(mode: MatchMode, width: f32, height: f32, seed: u64) -> (Self, RoomHandle) {
        let id = Uuid::new_v4();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let player_count = Arc::new(AtomicUsize::new(0));

        let room = Self {
            id,
            mode,
            world: WorldState::new(width, height),
            rng: ChaCha8Rng::seed_from_u64(seed),
            seats: HashMap::new(),
            intents: BTreeMap::new(),
            scripted: BTreeMap::new(),
            speed_multiplier: 1,
            pending_speed: None,
            selected_bot: None,
            debug: false,
            command_rx,
            player_count: player_count.clone(),
            started: false,
            ever_attached: false,
            unclaimed_ticks: 0,
        };
        let handle = RoomHandle {
            id,
            mode,
            command_tx,
            player_count,
            created_at: unix_millis(),
        };
        (room, handle)
    }

    /// Run the room to completion. Returns when the last session detaches
    /// or the room is never claimed.
    pub async fn run(mut self) {
        info!(room_id = %self.id, mode = %self.mode, "room started");

        let mut period = tick_period(self.speed_multiplier);
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            self.drain_commands();

            if self.should_close() {
                break;
            }
            if self.running() {
                self.step();
            }

            // Speed changes take effect at the tick boundary; the tick
            // counter and dt are untouched.
            if let Some(multiplier) = self.pending_speed.take() {
                if multiplier != self.speed_multiplier {
                    info!(room_id = %self.id, multiplier, "speed multiplier changed");
                    self.speed_multiplier = multiplier;
                    period = tick_period(multiplier);
                    interval = interval_at(Instant::now() + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                }
            }
        }

        info!(room_id = %self.id, ticks = self.world.tick(), "room closed");
    }

    /// PvP rooms idle at tick zero until both seats are filled
    fn running(&mut self) -> bool {
        if self.started {
            return true;
        }
        let players = self.real_players();
        self.started = match self.mode {
            MatchMode::Pvp => players >= 2,
            MatchMode::SelfPlay | MatchMode::Practice => players >= 1,
        };
        self.started
    }

    fn real_players(&self) -> usize {
        self.seats.values().filter(|s| !s.seat.viewer).count()
    }

    fn should_close(&mut self) -> bool {
        if self.ever_attached {
            return self.real_players() == 0;
        }
        self.unclaimed_ticks += 1;
        self.unclaimed_ticks > UNCLAIMED_GRACE_TICKS
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            match command {
                RoomCommand::Attach(seat) => self.handle_attach(seat),
                RoomCommand::Detach { session_id } => self.handle_detach(session_id),
                RoomCommand::Client(input) => self.handle_client(input),
            }
        }
    }

    fn handle_attach(&mut self, seat: Seat) {
        let session_id = seat.session_id;
        if self.seats.contains_key(&session_id) {
            warn!(room_id = %self.id, %session_id, "duplicate attach ignored");
            return;
        }

        let mut bot_ids = Vec::new();
        if !seat.viewer {
            bot_ids.push(
                self.world
                    .add_bot(session_id, seat.bot_name.clone(), BotKind::Primary),
            );
            match self.mode {
                MatchMode::SelfPlay => {
                    for n in 1..=SELF_PLAY_CLONES {
                        bot_ids.push(self.world.add_bot(
                            session_id,
                            format!("{}-clone-{n}", seat.bot_name),
                            BotKind::Clone,
                        ));
                    }
                }
                MatchMode::Practice => self.ensure_scripted_opponents(),
                MatchMode::Pvp => {}
            }
            for &id in &bot_ids {
                self.intents.insert(id, Intent::default());
            }
            self.ever_attached = true;
            self.player_count.fetch_add(1, Ordering::Relaxed);
        }

        let _ = seat.tx.send(ServerMsg::Registered {
            room_id: self.id,
            mode: self.mode,
            bot_ids: bot_ids.clone(),
            arena_width: self.world.width,
            arena_height: self.world.height,
            walls: self.world.walls().to_vec(),
        });
        self.broadcast(ServerMsg::PeerJoined {
            player_id: seat.player_id,
            bot_ids: bot_ids.clone(),
        });

        info!(
            room_id = %self.id,
            %session_id,
            player_id = %seat.player_id,
            viewer = seat.viewer,
            bots = bot_ids.len(),
            "session attached"
        );
        self.seats.insert(
            session_id,
            SeatState {
                seat,
                bots: bot_ids,
                last_seq: HashMap::new(),
            },
        );
    }

    fn handle_detach(&mut self, session_id: Uuid) {
        let Some(state) = self.seats.remove(&session_id) else {
            return;
        };
        for bot_id in &state.bots {
            self.world.remove_bot(*bot_id);
            self.intents.remove(bot_id);
        }
        if !state.seat.viewer {
            self.player_count.fetch_sub(1, Ordering::Relaxed);
        }
        self.broadcast(ServerMsg::PeerLeft {
            player_id: state.seat.player_id,
        });
        info!(room_id = %self.id, %session_id, "session detached");
    }

    fn handle_client(&mut self, input: SessionInput) {
        let session_id = input.session_id;
        match input.msg {
            ClientMsg::Input {
                bot_id,
                seq,
                thrust_x,
                thrust_y,
                aim_angle,
                fire,
            } => {
                let Some(state) = self.seats.get_mut(&session_id) else {
                    warn!(room_id = %self.id, %session_id, "input from unattached session");
                    return;
                };
                if !state.bots.contains(&bot_id) {
                    self.send_error(session_id, ErrorCode::UnknownBot, "bot not controlled by this session");
                    return;
                }
                // Latest-wins: stale sequence numbers are dropped
                if let Some(&last) = state.last_seq.get(&bot_id) {
                    if seq < last {
                        debug!(room_id = %self.id, %bot_id, seq, last, "stale input dropped");
                        return;
                    }
                }
                state.last_seq.insert(bot_id, seq);
                self.intents.insert(
                    bot_id,
                    Intent {
                        thrust_x,
                        thrust_y,
                        aim_angle,
                        fire,
                    }
                    .sanitized(),
                );
            }
            ClientMsg::SetSpeed { multiplier } => {
                if SPEED_MULTIPLIERS.contains(&multiplier) {
                    self.pending_speed = Some(multiplier);
                } else {
                    self.send_error(
                        session_id,
                        ErrorCode::InvalidSpeed,
                        "speed multiplier must be one of 1, 2, 4, 10",
                    );
                }
            }
            ClientMsg::SelectBot { bot_id } => {
                if let Some(id) = bot_id {
                    if self.world.bot(id).is_none() {
                        self.send_error(session_id, ErrorCode::UnknownBot, "no such bot");
                        return;
                    }
                }
                self.selected_bot = bot_id;
            }
            ClientMsg::ToggleDebug => {
                self.debug = !self.debug;
            }
            ClientMsg::Ping { t } => {
                if let Some(state) = self.seats.get(&session_id) {
                    let _ = state.seat.tx.send(ServerMsg::Pong { t });
                }
            }
            ClientMsg::Leave => self.handle_detach(session_id),
            ClientMsg::Register { .. } | ClientMsg::Spectate { .. } => {
                self.send_error(session_id, ErrorCode::BadMessage, "session already registered");
            }
        }
    }

    /// Advance the simulation by one tick and publish its output
    fn step(&mut self) {
        let transitions = lifecycle::advance(&self.world);
        let mut events: Vec<GameEvent> = transitions
            .iter()
            .filter_map(|t| match t {
                LifecycleTransition::Respawn { bot_id, .. } => {
                    Some(GameEvent::Respawn { bot_id: *bot_id })
                }
                _ => None,
            })
            .collect();
        self.world.apply_transitions(transitions);

        self.drive_scripted_bots();

        let output = resolver::resolve(&self.world, &self.intents);

        for &shooter in &output.fired {
            events.push(GameEvent::Shot { shooter });
        }
        for hit in &output.hits {
            events.push(GameEvent::Hit {
                shooter: hit.owner,
                target: hit.target,
                damage: hit.damage,
            });
        }

        // Terminal observations are built against the pre-death world so the
        // victim's final frame still shows what killed it.
        let mut notices = Vec::new();
        for death in &output.deaths {
            events.push(GameEvent::Death {
                victim: death.victim,
                killer: death.killer,
            });
            notices.push((
                death.victim,
                death.killer,
                snapshot::build_observation(&self.world, death.victim),
            ));
        }

        self.world.apply_tick(output);

        for (victim, killer, last_observation) in notices {
            self.send_to_owner(
                victim,
                ServerMsg::DeathEvent {
                    bot_id: victim,
                    kill_credit: false,
                    other_bot: killer,
                    last_observation,
                },
            );
            if let Some(killer) = killer {
                self.send_to_owner(
                    killer,
                    ServerMsg::DeathEvent {
                        bot_id: killer,
                        kill_credit: true,
                        other_bot: Some(victim),
                        last_observation: None,
                    },
                );
            }
        }

        for state in self.seats.values() {
            if state.seat.viewer {
                continue;
            }
            for &bot_id in &state.bots {
                if let Some(obs) = snapshot::build_observation(&self.world, bot_id) {
                    let _ = state.seat.tx.send(ServerMsg::Observation { bot_id, obs });
                }
            }
        }

        let snap = snapshot::build_snapshot(
            &self.world,
            self.speed_multiplier,
            events,
            self.selected_bot,
            self.debug,
        );
        self.broadcast(ServerMsg::Snapshot(snap));
    }

    /// Practice opponents wander on room-seeded randomness, so a given seed
    /// replays the same match.
    fn drive_scripted_bots(&mut self) {
        let tick = self.world.tick();
        for (&bot_id, state) in self.scripted.iter_mut() {
            if tick >= state.next_change_tick {
                let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
                state.intent = Intent {
                    thrust_x: angle.cos(),
                    thrust_y: angle.sin(),
                    aim_angle: angle,
                    fire: false,
                };
                state.next_change_tick = tick + self.rng.gen_range(30..90);
            }
            self.intents.insert(bot_id, state.intent);
        }
    }

    fn ensure_scripted_opponents(&mut self) {
        while self.scripted.len() < PRACTICE_OPPONENTS {
            let n = self.scripted.len() + 1;
            let id = self
                .world
                .add_bot(Uuid::nil(), format!("drone-{n}"), BotKind::Scripted);
            self.scripted.insert(
                id,
                ScriptedState {
                    intent: Intent::default(),
                    next_change_tick: 0,
                },
            );
        }
    }

    fn broadcast(&self, msg: ServerMsg) {
        for state in self.seats.values() {
            let _ = state.seat.tx.send(msg.clone());
        }
    }

    fn send_to_owner(&self, bot_id: BotId, msg: ServerMsg) {
        let Some(state) = self
            .seats
            .values()
            .find(|s| s.bots.contains(&bot_id))
        else {
            return;
        };
        let _ = state.seat.tx.send(msg);
    }

    fn send_error(&self, session_id: Uuid, code: ErrorCode, message: &str) {
        if let Some(state) = self.seats.get(&session_id) {
            let _ = state.seat.tx.send(ServerMsg::Error {
                code,
                message: message.to_string(),
            });
        }
    }
}
