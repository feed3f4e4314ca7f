//! Simulation modules

pub mod geometry;
pub mod lifecycle;
pub mod resolver;
pub mod room;
pub mod snapshot;
pub mod world;

pub use room::{MatchRoom, RoomHandle, RoomRegistry};
pub use world::{Bot, BotState, Bullet, WorldState};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ws::protocol::ClientMsg;

/// Per-room bot identifier. Assigned sequentially by the owning room;
/// also the deterministic tie-break key (lowest id wins).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct BotId(pub u32);

impl std::fmt::Display for BotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bot-{}", self.0)
    }
}

/// Per-room bullet identifier, assigned in firing order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct BulletId(pub u32);

/// A bot's desired action for the upcoming tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Intent {
    /// Desired thrust, each axis in [-1, 1]; clamped to unit length overall
    pub thrust_x: f32,
    pub thrust_y: f32,
    /// Aim direction in radians [0, 2π)
    pub aim_angle: f32,
    /// Fire this tick (subject to cooldown)
    pub fire: bool,
}

impl Intent {
    /// Sanitize a client-supplied intent. Malformed fields are clamped or
    /// zeroed rather than rejected wholesale; NaN never reaches the resolver.
    pub fn sanitized(self) -> Self {
        let mut tx = if self.thrust_x.is_finite() { self.thrust_x } else { 0.0 };
        let mut ty = if self.thrust_y.is_finite() { self.thrust_y } else { 0.0 };
        tx = tx.clamp(-1.0, 1.0);
        ty = ty.clamp(-1.0, 1.0);

        // Clamp thrust vector to unit length
        let mag_sq = tx * tx + ty * ty;
        if mag_sq > 1.0 {
            let mag = mag_sq.sqrt();
            tx /= mag;
            ty /= mag;
        }

        let aim = if self.aim_angle.is_finite() {
            self.aim_angle.rem_euclid(std::f32::consts::TAU)
        } else {
            0.0
        };

        Self {
            thrust_x: tx,
            thrust_y: ty,
            aim_angle: aim,
            fire: self.fire,
        }
    }
}

/// Message received from a session, routed into its room's inbox
#[derive(Debug, Clone)]
pub struct SessionInput {
    pub session_id: Uuid,
    pub msg: ClientMsg,
    pub received_at: u64,
}
