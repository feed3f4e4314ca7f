//! Authoritative world state for one match room
//!
//! Owned exclusively by the room's tick task. All per-tick mutation goes
//! through `apply_transitions` and `apply_tick`, each invoked exactly once
//! per tick by the owning room; everything else is read-only.

use std::collections::BTreeMap;

use tracing::error;
use uuid::Uuid;

use super::geometry;
use super::lifecycle::LifecycleTransition;
use super::resolver::TickOutput;
use super::{BotId, BulletId};
use crate::ws::protocol::Wall;

/// Maximum (and respawn) health
pub const MAX_HEALTH: i32 = 100;
/// Bot collision radius
pub const BOT_RADIUS: f32 = 15.0;
/// Thickness of the boundary walls
pub const WALL_THICKNESS: f32 = 20.0;

/// Bot lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotState {
    /// Fully solid and vulnerable
    Alive,
    /// Just died; transitions to Respawning on the next tick
    Dead,
    /// Waiting out the respawn delay; no collision, intents ignored
    Respawning,
    /// Back in the world but undamageable
    Invulnerable,
}

impl BotState {
    /// Solid bots participate in movement and collision resolution
    pub fn is_solid(self) -> bool {
        matches!(self, BotState::Alive | BotState::Invulnerable)
    }

    /// Only Alive bots can take damage
    pub fn is_damageable(self) -> bool {
        matches!(self, BotState::Alive)
    }
}

/// How a bot is controlled
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotKind {
    /// A session's primary bot
    Primary,
    /// Self-play clone fed by the same session's action stream
    Clone,
    /// Built-in practice opponent driven by the room
    Scripted,
}

/// One bot in the arena
#[derive(Debug, Clone)]
pub struct Bot {
    pub id: BotId,
    /// Owning session; scripted bots carry the room's nil owner
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

    /// Tick of the last successful shot
    pub last_shot_tick: Option<u64>,
    /// Tick at which the bot died (drives respawn timing)
    pub death_tick: Option<u64>,
    /// Tick at which invulnerability ends
    pub invulnerable_until_tick: Option<u64>,

    pub kills: u32,
    pub deaths: u32,
}

/// One bullet in flight
#[derive(Debug, Clone)]
pub struct Bullet {
    pub id: BulletId,
    pub owner: BotId,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub radius: f32,
    pub created_tick: u64,
}

/// The authoritative world of one match room
pub struct WorldState {
    pub width: f32,
    pub height: f32,
    bots: BTreeMap<BotId, Bot>,
    bullets: BTreeMap<BulletId, Bullet>,
    walls: Vec<Wall>,
    tick: u64,
    next_bot_id: u32,
    next_bullet_id: u32,

    // Room statistics
    pub total_kills: u64,
    pub total_deaths: u64,
    pub total_bullets_fired: u64,
}

impl WorldState {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            bots: BTreeMap::new(),
            bullets: BTreeMap::new(),
            walls: build_arena_walls(width, height),
            tick: 0,
            next_bot_id: 1,
            next_bullet_id: 1,
            total_kills: 0,
            total_deaths: 0,
            total_bullets_fired: 0,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Elapsed simulation time in seconds
    pub fn elapsed_secs(&self) -> f32 {
        self.tick as f32 * crate::util::time::tick_delta()
    }

    pub fn bots(&self) -> &BTreeMap<BotId, Bot> {
        &self.bots
    }

    pub fn bullets(&self) -> &BTreeMap<BulletId, Bullet> {
        &self.bullets
    }

    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    pub fn bot(&self, id: BotId) -> Option<&Bot> {
        self.bots.get(&id)
    }

    /// Direct bot access for unit tests only
    #[cfg(test)]
    pub fn bot_mut(&mut self, id: BotId) -> Option<&mut Bot> {
        self.bots.get_mut(&id)
    }

    /// Add a bot at a clear spawn point. Structural mutation reserved to the
    /// owning room (session attach, clone/scripted creation).
    pub fn add_bot(&mut self, owner: Uuid, name: String, kind: BotKind) -> BotId {
        let id = BotId(self.next_bot_id);
        self.next_bot_id += 1;

        let (x, y) = self.find_spawn_position();
        self.bots.insert(
            id,
            Bot {
                id,
                owner,
                name,
                kind,
                x,
                y,
                vel_x: 0.0,
                vel_y: 0.0,
                aim_angle: 0.0,
                health: MAX_HEALTH,
                state: BotState::Alive,
                last_shot_tick: None,
                death_tick: None,
                invulnerable_until_tick: None,
                kills: 0,
                deaths: 0,
            },
        );
        id
    }

    /// Remove a bot (session detach). Reserved to the owning room.
    pub fn remove_bot(&mut self, id: BotId) -> Option<Bot> {
        self.bots.remove(&id)
    }

    /// Pick an initial spawn point clear of walls and bounds: fixed corner
    /// and mid positions tried in order, arena center as fallback.
    pub fn find_spawn_position(&self) -> (f32, f32) {
        let w = self.width;
        let h = self.height;
        let candidates = [
            (w * 0.125, h * 0.167),
            (w * 0.875, h * 0.167),
            (w * 0.125, h * 0.833),
            (w * 0.875, h * 0.833),
            (w * 0.25, h * 0.5),
            (w * 0.75, h * 0.5),
            (w * 0.5, h * 0.25),
            (w * 0.5, h * 0.75),
        ];

        for &(x, y) in &candidates {
            if self.is_position_clear(x, y, BOT_RADIUS + 5.0) {
                return (x, y);
            }
        }
        (w / 2.0, h / 2.0)
    }

    /// Check that a circle at (x, y) stays in bounds and off every wall
    pub fn is_position_clear(&self, x: f32, y: f32, radius: f32) -> bool {
        if x - radius < 0.0 || x + radius > self.width {
            return false;
        }
        if y - radius < 0.0 || y + radius > self.height {
            return false;
        }
        !self.walls.iter().any(|wall| {
            geometry::circle_rect_overlap(x, y, radius, wall.x, wall.y, wall.width, wall.height)
        })
    }

    /// Check line of sight between two points against the wall list
    pub fn line_of_sight(&self, x0: f32, y0: f32, x1: f32, y1: f32) -> bool {
        !self.walls.iter().any(|wall| {
            geometry::segment_hits_rect(x0, y0, x1, y1, wall.x, wall.y, wall.width, wall.height)
        })
    }

    /// Apply lifecycle transitions for this tick. Runs before the resolver
    /// so a respawn and a fresh intent in the same tick stay consistent.
    pub fn apply_transitions(&mut self, transitions: Vec<LifecycleTransition>) {
        for transition in transitions {
            match transition {
                LifecycleTransition::BeginRespawnWait { bot_id } => {
                    if let Some(bot) = self.bots.get_mut(&bot_id) {
                        bot.state = BotState::Respawning;
                    }
                }
                LifecycleTransition::Respawn {
                    bot_id,
                    invulnerable_until_tick,
                } => {
                    if let Some(bot) = self.bots.get_mut(&bot_id) {
                        // Respawn in place at the death location
                        bot.state = BotState::Invulnerable;
                        bot.health = MAX_HEALTH;
                        bot.vel_x = 0.0;
                        bot.vel_y = 0.0;
                        bot.invulnerable_until_tick = Some(invulnerable_until_tick);
                        bot.death_tick = None;
                    }
                }
                LifecycleTransition::EndInvulnerability { bot_id } => {
                    if let Some(bot) = self.bots.get_mut(&bot_id) {
                        bot.state = BotState::Alive;
                        bot.invulnerable_until_tick = None;
                    }
                }
            }
        }
    }

    /// Apply one tick's resolver output. The only combat/physics mutation
    /// entry point; must be invoked exactly once per tick by the owning room.
    pub fn apply_tick(&mut self, output: TickOutput) {
        // 1. Bot movement and aim
        for mv in output.moves {
            if let Some(bot) = self.bots.get_mut(&mv.bot_id) {
                bot.x = mv.x;
                bot.y = mv.y;
                bot.vel_x = mv.vel_x;
                bot.vel_y = mv.vel_y;
                bot.aim_angle = mv.aim_angle;
            }
        }

        // 2. Bullet movement
        for (id, x, y) in output.bullet_moves {
            if let Some(bullet) = self.bullets.get_mut(&id) {
                bullet.x = x;
                bullet.y = y;
            }
        }

        // 3. Bullet removal (wall hits, bot hits, out of bounds). Removal is
        // visible in this tick's snapshot; no bullet outlives it.
        for id in output.bullet_removals {
            self.bullets.remove(&id);
        }

        // 4. Damage
        for hit in &output.hits {
            if let Some(bot) = self.bots.get_mut(&hit.target) {
                if !bot.state.is_damageable() {
                    error!(bot_id = %hit.target, state = ?bot.state, "hit resolved against undamageable bot");
                    debug_assert!(false, "resolver produced hit on undamageable bot");
                    continue;
                }
                bot.health -= hit.damage;
                if bot.health < 0 {
                    bot.health = 0;
                }
            }
        }

        // 5. Deaths and kill credit
        for death in &output.deaths {
            if let Some(bot) = self.bots.get_mut(&death.victim) {
                bot.state = BotState::Dead;
                bot.health = 0;
                bot.death_tick = Some(self.tick);
                bot.deaths += 1;
                self.total_deaths += 1;
            }
            if let Some(killer) = death.killer {
                if let Some(bot) = self.bots.get_mut(&killer) {
                    bot.kills += 1;
                    self.total_kills += 1;
                }
            }
        }

        // 6. New bullets
        for spawn in output.bullet_spawns {
            let id = BulletId(self.next_bullet_id);
            self.next_bullet_id += 1;
            self.bullets.insert(
                id,
                Bullet {
                    id,
                    owner: spawn.owner,
                    x: spawn.x,
                    y: spawn.y,
                    vel_x: spawn.vel_x,
                    vel_y: spawn.vel_y,
                    radius: super::resolver::BULLET_RADIUS,
                    created_tick: self.tick,
                },
            );
            self.total_bullets_fired += 1;
        }

        // 7. Cooldown bookkeeping
        for bot_id in output.fired {
            if let Some(bot) = self.bots.get_mut(&bot_id) {
                bot.last_shot_tick = Some(self.tick);
            }
        }

        self.check_invariants();
        self.tick += 1;
    }

    /// Defensive invariant checks. Violations indicate a resolver or
    /// matchmaking bug and are reported loudly rather than tolerated.
    fn check_invariants(&self) {
        for bot in self.bots.values() {
            if bot.health < 0 || bot.health > MAX_HEALTH {
                error!(bot_id = %bot.id, health = bot.health, "bot health out of range");
                debug_assert!(false, "bot health out of range");
            }
            if bot.state.is_solid()
                && !geometry::point_in_bounds(bot.x, bot.y, self.width, self.height)
            {
                error!(bot_id = %bot.id, x = bot.x, y = bot.y, "solid bot out of arena bounds");
                debug_assert!(false, "solid bot out of bounds");
            }
        }
    }
}

/// Boundary walls plus the two fixed center obstacles
fn build_arena_walls(width: f32, height: f32) -> Vec<Wall> {
    let t = WALL_THICKNESS;
    let cx = width / 2.0;
    let cy = height / 2.0;
    vec![
        Wall { x: 0.0, y: 0.0, width, height: t },
        Wall { x: 0.0, y: height - t, width, height: t },
        Wall { x: 0.0, y: 0.0, width: t, height },
        Wall { x: width - t, y: 0.0, width: t, height },
        // Center cross obstacles
        Wall { x: cx - 60.0, y: cy - 15.0, width: 120.0, height: 30.0 },
        Wall { x: cx - 15.0, y: cy - 80.0, width: 30.0, height: 160.0 },
    ]
}
