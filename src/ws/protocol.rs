//! WebSocket wire protocol
//!
//! JSON text frames, tagged with a `type` field on both directions. The
//! protocol layer never trusts the client: intents are sanitized before they
//! reach a room and malformed frames answer with an `error` message instead
//! of closing the socket.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::world::{Bot, BotKind, BotState, Bullet};
use crate::game::{BotId, BulletId};

/// How a room pairs its participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// One session controlling a primary bot plus synthetic clones
    SelfPlay,
    /// Two distinct sessions, one primary bot each
    Pvp,
    /// One session against scripted opponents
    Practice,
}

impl std::fmt::Display for MatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchMode::SelfPlay => write!(f, "self_play"),
            MatchMode::Pvp => write!(f, "pvp"),
            MatchMode::Practice => write!(f, "practice"),
        }
    }
}

/// Axis-aligned wall rectangle, shared by the world and the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Messages from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// First frame on an agent socket: request a room assignment
    Register {
        player_id: Uuid,
        bot_name: String,
        /// Preferred mode; omitted means self-play-first policy
        #[serde(default)]
        mode: Option<MatchMode>,
        /// Opaque model/policy reference, logged but never interpreted
        #[serde(default)]
        model_ref: Option<String>,
    },
    /// First frame on a viewer socket: observe an existing room
    Spectate { room_id: Uuid },
    /// Action for one controlled bot, applied latest-wins at the next tick
    Input {
        bot_id: BotId,
        /// Client-side sequence number; stale frames are dropped
        seq: u32,
        thrust_x: f32,
        thrust_y: f32,
        aim_angle: f32,
        #[serde(default)]
        fire: bool,
    },
    /// Change the room's wall-clock speed multiplier
    SetSpeed { multiplier: u32 },
    /// Focus one bot in viewer output
    SelectBot {
        #[serde(default)]
        bot_id: Option<BotId>,
    },
    /// Toggle debug overlays in viewer output
    ToggleDebug,
    Ping { t: u64 },
    Leave,
}

/// Messages from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Sent once on connect, before registration
    Welcome { session_id: Uuid, server_time: u64 },
    /// Room assignment confirmed; static arena data included once
    Registered {
        room_id: Uuid,
        mode: MatchMode,
        /// Bots this session controls, primary first
        bot_ids: Vec<BotId>,
        arena_width: f32,
        arena_height: f32,
        walls: Vec<Wall>,
    },
    /// PvP registration accepted but waiting for an opponent
    Queued { position: usize },
    /// Another session joined the room
    PeerJoined { player_id: Uuid, bot_ids: Vec<BotId> },
    /// Another session left the room
    PeerLeft { player_id: Uuid },
    /// Per-bot observation, one per controlled bot per tick
    Observation { bot_id: BotId, obs: Observation },
    /// Full world snapshot, broadcast to every session each tick
    Snapshot(WorldSnapshot),
    /// Directed death/kill notification for one controlled bot
    DeathEvent {
        bot_id: BotId,
        /// True when this bot is credited with the kill
        kill_credit: bool,
        /// The victim (on a kill) or the credited killer (on a death)
        other_bot: Option<BotId>,
        /// Final pre-death observation; present on the victim's event
        last_observation: Option<Observation>,
    },
    Error { code: ErrorCode, message: String },
    Pong { t: u64 },
}

/// Machine-readable error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadMessage,
    NotRegistered,
    UnknownBot,
    UnknownRoom,
    InvalidSpeed,
    NoRoomAvailable,
    RateLimited,
}

/// What one bot perceives at one tick. Fixed shape so learning agents can
/// map it onto a flat feature vector without schema negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub tick: u64,
    pub self_x: f32,
    pub self_y: f32,
    pub self_health: i32,
    pub self_aim: f32,
    pub self_state: BotState,
    /// Nearest other solid bot, if any
    pub enemy: Option<EnemyObs>,
    /// Bullets within sensing range, nearest first
    pub bullets: Vec<BulletObs>,
    /// Unobstructed line to the nearest enemy
    pub has_line_of_sight: bool,
    /// Distances to the four arena bounds
    pub bound_left: f32,
    pub bound_right: f32,
    pub bound_top: f32,
    pub bound_bottom: f32,
}

/// Nearest-enemy features, relative to the observing bot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnemyObs {
    pub bot_id: BotId,
    pub dx: f32,
    pub dy: f32,
    pub distance: f32,
    /// Absolute angle from self to enemy, radians
    pub angle: f32,
    pub health: i32,
}

/// One nearby bullet, relative to the observing bot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BulletObs {
    pub dx: f32,
    pub dy: f32,
    pub vel_x: f32,
    pub vel_y: f32,
}

/// One bot as seen in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotSnapshot {
    pub id: BotId,
    pub owner: Uuid,
    pub name: String,
    pub kind: BotKind,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub aim_angle: f32,
    pub health: i32,
    pub state: BotState,
    pub kills: u32,
    pub deaths: u32,
}

impl From<&Bot> for BotSnapshot {
    fn from(bot: &Bot) -> Self {
        Self {
            id: bot.id,
            owner: bot.owner,
            name: bot.name.clone(),
            kind: bot.kind,
            x: bot.x,
            y: bot.y,
            vel_x: bot.vel_x,
            vel_y: bot.vel_y,
            aim_angle: bot.aim_angle,
            health: bot.health,
            state: bot.state,
            kills: bot.kills,
            deaths: bot.deaths,
        }
    }
}

/// One bullet as seen in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BulletSnapshot {
    pub id: BulletId,
    pub owner: BotId,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
}

impl From<&Bullet> for BulletSnapshot {
    fn from(bullet: &Bullet) -> Self {
        Self {
            id: bullet.id,
            owner: bullet.owner,
            x: bullet.x,
            y: bullet.y,
            vel_x: bullet.vel_x,
            vel_y: bullet.vel_y,
        }
    }
}

/// Full room state at one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub elapsed_secs: f32,
    pub speed_multiplier: u32,
    pub bots: Vec<BotSnapshot>,
    pub bullets: Vec<BulletSnapshot>,
    /// Combat events resolved this tick
    pub events: Vec<GameEvent>,
    /// Viewer focus, if set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_bot: Option<BotId>,
    #[serde(default)]
    pub debug: bool,
}

/// A discrete combat event within one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    Shot { shooter: BotId },
    Hit { shooter: BotId, target: BotId, damage: i32 },
    Death { victim: BotId, killer: Option<BotId> },
    Respawn { bot_id: BotId },
}
