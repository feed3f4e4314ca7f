//! Snapshot and observation assembly
//!
//! Pure read-only views over a `WorldState`. Snapshots go to every session;
//! observations are per-bot feature bundles for learning agents, built from
//! the same state the snapshot reflects.

use super::world::WorldState;
use super::BotId;
use crate::ws::protocol::{
    BotSnapshot, BulletObs, BulletSnapshot, EnemyObs, GameEvent, Observation, WorldSnapshot,
};

/// Bullets beyond this distance are omitted from observations
pub const BULLET_SENSE_RANGE: f32 = 300.0;

/// Build the per-tick snapshot broadcast to all sessions
pub fn build_snapshot(
    world: &WorldState,
    speed_multiplier: u32,
    events: Vec<GameEvent>,
    selected_bot: Option<BotId>,
    debug: bool,
) -> WorldSnapshot {
    WorldSnapshot {
        tick: world.tick(),
        elapsed_secs: world.elapsed_secs(),
        speed_multiplier,
        bots: world.bots().values().map(BotSnapshot::from).collect(),
        bullets: world.bullets().values().map(BulletSnapshot::from).collect(),
        events,
        selected_bot,
        debug,
    }
}

/// Build one bot's observation. Returns None for unknown bots; dead and
/// respawning bots still observe so agents see their terminal frames.
pub fn build_observation(world: &WorldState, bot_id: BotId) -> Option<Observation> {
    let bot = world.bot(bot_id)?;

    // Nearest other solid bot; id order breaks exact-distance ties
    let enemy = world
        .bots()
        .values()
        .filter(|other| other.id != bot_id && other.state.is_solid())
        .map(|other| {
            let dx = other.x - bot.x;
            let dy = other.y - bot.y;
            (dx * dx + dy * dy, other)
        })
        .min_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(dist_sq, other)| {
            let dx = other.x - bot.x;
            let dy = other.y - bot.y;
            EnemyObs {
                bot_id: other.id,
                dx,
                dy,
                distance: dist_sq.sqrt(),
                angle: dy.atan2(dx),
                health: other.health,
            }
        });

    let has_line_of_sight = enemy.is_some_and(|e| {
        world.line_of_sight(bot.x, bot.y, bot.x + e.dx, bot.y + e.dy)
    });

    let mut bullets: Vec<(f32, BulletObs)> = world
        .bullets()
        .values()
        .filter(|bullet| bullet.owner != bot_id)
        .filter_map(|bullet| {
            let dx = bullet.x - bot.x;
            let dy = bullet.y - bot.y;
            let dist_sq = dx * dx + dy * dy;
            if dist_sq > BULLET_SENSE_RANGE * BULLET_SENSE_RANGE {
                return None;
            }
            Some((
                dist_sq,
                BulletObs {
                    dx,
                    dy,
                    vel_x: bullet.vel_x,
                    vel_y: bullet.vel_y,
                },
            ))
        })
        .collect();
    bullets.sort_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    Some(Observation {
        tick: world.tick(),
        self_x: bot.x,
        self_y: bot.y,
        self_health: bot.health,
        self_aim: bot.aim_angle,
        self_state: bot.state,
        enemy,
        bullets: bullets.into_iter().map(|(_, b)| b).collect(),
        has_line_of_sight,
        bound_left: bot.x,
        bound_right: world.width - bot.x,
        bound_top: bot.y,
        bound_bottom: world.height - bot.y,
    })
}
