//! Physics and combat resolver
//!
//! `resolve` is a pure function of the current world state and one intent
//! per bot; it never mutates the world itself. Steps run in a fixed order
//! and every collection is iterated in id order, so identical inputs produce
//! bit-identical outputs regardless of run or thread.

use std::collections::BTreeMap;

use super::geometry;
use super::world::{WorldState, BOT_RADIUS};
use super::{BotId, BulletId, Intent};
use crate::util::time::{tick_delta, ticks_for_secs};

/// Maximum bot speed in pixels per second
pub const MAX_BOT_SPEED: f32 = 200.0;
/// Bullet speed in pixels per second
pub const BULLET_SPEED: f32 = 400.0;
/// Bullet collision radius
pub const BULLET_RADIUS: f32 = 3.0;
/// Distance from bot center at which bullets spawn
pub const BULLET_SPAWN_OFFSET: f32 = 25.0;
/// Damage per bullet hit
pub const HIT_DAMAGE: i32 = 25;
/// Minimum time between shots
pub const FIRE_COOLDOWN_SECS: f32 = 0.3;

pub fn fire_cooldown_ticks() -> u64 {
    ticks_for_secs(FIRE_COOLDOWN_SECS)
}

/// New position, velocity and aim for one bot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BotMove {
    pub bot_id: BotId,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub aim_angle: f32,
}

/// A bullet striking a bot this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub bullet: BulletId,
    /// Shooter (bullet owner)
    pub owner: BotId,
    pub target: BotId,
    pub damage: i32,
}

/// A bot whose health reached zero this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Death {
    pub victim: BotId,
    /// Credited killer; lowest owner id wins simultaneous-kill ties
    pub killer: Option<BotId>,
}

/// A bullet to create this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulletSpawn {
    pub owner: BotId,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
}

/// Everything `WorldState::apply_tick` needs to advance one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutput {
    pub moves: Vec<BotMove>,
    pub bullet_moves: Vec<(BulletId, f32, f32)>,
    pub bullet_removals: Vec<BulletId>,
    pub hits: Vec<Hit>,
    pub deaths: Vec<Death>,
    pub bullet_spawns: Vec<BulletSpawn>,
    /// Bots whose last-shot tick must be recorded
    pub fired: Vec<BotId>,
}

/// Resolve one tick. Bots missing from `intents` coast with a default
/// intent; the room guarantees latest-wins reuse so that is the cold path.
pub fn resolve(world: &WorldState, intents: &BTreeMap<BotId, Intent>) -> TickOutput {
    let dt = tick_delta();
    let mut output = TickOutput::default();

    // Working positions for this tick, id-ordered
    let mut positions: BTreeMap<BotId, (f32, f32, f32, f32, f32)> = BTreeMap::new();

    // 1. Integrate bot movement: velocity is thrust-derived directly,
    // clamped to arena bounds, blocked by interior walls per axis.
    for bot in world.bots().values() {
        if !bot.state.is_solid() {
            continue;
        }
        let intent = intents.get(&bot.id).copied().unwrap_or_default();

        let mut vel_x = intent.thrust_x * MAX_BOT_SPEED;
        let mut vel_y = intent.thrust_y * MAX_BOT_SPEED;

        let target_x = (bot.x + vel_x * dt).clamp(BOT_RADIUS, world.width - BOT_RADIUS);
        let target_y = (bot.y + vel_y * dt).clamp(BOT_RADIUS, world.height - BOT_RADIUS);

        let new_x = if world.is_position_clear(target_x, bot.y, BOT_RADIUS) {
            target_x
        } else {
            vel_x = 0.0;
            bot.x
        };
        let new_y = if world.is_position_clear(new_x, target_y, BOT_RADIUS) {
            target_y
        } else {
            vel_y = 0.0;
            bot.y
        };

        positions.insert(bot.id, (new_x, new_y, vel_x, vel_y, intent.aim_angle));
    }

    // 2+3. Integrate bullets along their swept segment and resolve the
    // earliest collision on the path (walls and solid bots, owner excluded).
    let mut hits: Vec<Hit> = Vec::new();
    for bullet in world.bullets().values() {
        let end_x = bullet.x + bullet.vel_x * dt;
        let end_y = bullet.y + bullet.vel_y * dt;

        let mut wall_t: Option<f32> = None;
        for wall in world.walls() {
            // Inflate the wall by the bullet radius for the point sweep
            let t = geometry::segment_rect_hit_t(
                bullet.x,
                bullet.y,
                end_x,
                end_y,
                wall.x - bullet.radius,
                wall.y - bullet.radius,
                wall.width + bullet.radius * 2.0,
                wall.height + bullet.radius * 2.0,
            );
            if let Some(t) = t {
                wall_t = Some(wall_t.map_or(t, |best: f32| best.min(t)));
            }
        }

        let mut bot_hit: Option<(f32, BotId)> = None;
        for (&bot_id, &(bx, by, ..)) in &positions {
            if bot_id == bullet.owner {
                continue;
            }
            let t = geometry::segment_hits_circle(
                bullet.x,
                bullet.y,
                end_x,
                end_y,
                bx,
                by,
                BOT_RADIUS + bullet.radius,
            );
            if let Some(t) = t {
                // Ties go to the lowest bot id via iteration order
                if bot_hit.map_or(true, |(best, _)| t < best) {
                    bot_hit = Some((t, bot_id));
                }
            }
        }

        match bot_hit {
            Some((bt, target)) if !wall_t.is_some_and(|wt| wt < bt) => {
                // Invulnerable bots stop bullets but take no damage
                if world.bot(target).is_some_and(|b| b.state.is_damageable()) {
                    hits.push(Hit {
                        bullet: bullet.id,
                        owner: bullet.owner,
                        target,
                        damage: HIT_DAMAGE,
                    });
                }
                output.bullet_removals.push(bullet.id);
            }
            _ if wall_t.is_some() => {
                output.bullet_removals.push(bullet.id);
            }
            _ => {
                if geometry::point_in_bounds(end_x, end_y, world.width, world.height) {
                    output.bullet_moves.push((bullet.id, end_x, end_y));
                } else {
                    output.bullet_removals.push(bullet.id);
                }
            }
        }
    }

    // 4. Bot-vs-bot elastic separation, simultaneous over all overlapping
    // pairs from the post-integration snapshot so iteration order cannot
    // favor either bot.
    let ids: Vec<BotId> = positions.keys().copied().collect();
    let mut displacement: BTreeMap<BotId, (f32, f32)> = BTreeMap::new();
    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            let (x1, y1, ..) = positions[&ids[i]];
            let (x2, y2, ..) = positions[&ids[j]];

            let dx = x2 - x1;
            let dy = y2 - y1;
            let dist_sq = dx * dx + dy * dy;
            let min_dist = BOT_RADIUS * 2.0;
            if dist_sq >= min_dist * min_dist {
                continue;
            }

            let dist = dist_sq.sqrt();
            let (nx, ny) = if dist > 1e-4 {
                (dx / dist, dy / dist)
            } else {
                // Coincident centers: deterministic axis, lower id goes left
                (1.0, 0.0)
            };
            let push = (min_dist - dist) / 2.0;

            let d1 = displacement.entry(ids[i]).or_insert((0.0, 0.0));
            d1.0 -= nx * push;
            d1.1 -= ny * push;
            let d2 = displacement.entry(ids[j]).or_insert((0.0, 0.0));
            d2.0 += nx * push;
            d2.1 += ny * push;
        }
    }
    for (bot_id, (dx, dy)) in displacement {
        if let Some(pos) = positions.get_mut(&bot_id) {
            let nx = (pos.0 + dx).clamp(BOT_RADIUS, world.width - BOT_RADIUS);
            let ny = (pos.1 + dy).clamp(BOT_RADIUS, world.height - BOT_RADIUS);
            // Separation must not wedge a bot into a wall; slide per axis
            // like regular movement, falling back to the pre-separation spot
            if world.is_position_clear(nx, ny, BOT_RADIUS) {
                pos.0 = nx;
                pos.1 = ny;
            } else if world.is_position_clear(nx, pos.1, BOT_RADIUS) {
                pos.0 = nx;
            } else if world.is_position_clear(pos.0, ny, BOT_RADIUS) {
                pos.1 = ny;
            }
        }
    }

    // 5. Fire intents, gated by tick-arithmetic cooldown. Only Alive bots
    // may fire; Invulnerable bots move but hold fire.
    for bot in world.bots().values() {
        if !bot.state.is_damageable() {
            continue;
        }
        let intent = intents.get(&bot.id).copied().unwrap_or_default();
        if !intent.fire {
            continue;
        }
        let ready = match bot.last_shot_tick {
            None => true,
            Some(last) => world.tick().saturating_sub(last) >= fire_cooldown_ticks(),
        };
        if !ready {
            continue;
        }

        let Some(&(bx, by, _, _, aim)) = positions.get(&bot.id) else {
            continue;
        };
        output.bullet_spawns.push(BulletSpawn {
            owner: bot.id,
            x: bx + aim.cos() * BULLET_SPAWN_OFFSET,
            y: by + aim.sin() * BULLET_SPAWN_OFFSET,
            vel_x: aim.cos() * BULLET_SPEED,
            vel_y: aim.sin() * BULLET_SPEED,
        });
        output.fired.push(bot.id);
    }

    // 6. Deaths
    output.deaths = deaths_from_hits(world, &hits);
    output.hits = hits;

    // Emit moves last so the output reflects post-separation positions
    for (bot_id, (x, y, vel_x, vel_y, aim_angle)) in positions {
        output.moves.push(BotMove {
            bot_id,
            x,
            y,
            vel_x,
            vel_y,
            aim_angle,
        });
    }

    output
}

/// Fold one tick's hits into deaths, accumulating damage per victim in
/// bullet-id order. Kill-credit candidacy starts at the hit that brings the
/// victim to zero; earlier hits in the same tick do not count, and the
/// lowest candidate bot id wins ties.
fn deaths_from_hits(world: &WorldState, hits: &[Hit]) -> Vec<Death> {
    let mut remaining: BTreeMap<BotId, i32> = BTreeMap::new();
    let mut candidates: BTreeMap<BotId, Vec<BotId>> = BTreeMap::new();
    for hit in hits {
        let health = remaining
            .entry(hit.target)
            .or_insert_with(|| world.bot(hit.target).map_or(0, |b| b.health));
        *health -= hit.damage;
        if *health <= 0 {
            candidates.entry(hit.target).or_default().push(hit.owner);
        }
    }
    remaining
        .into_iter()
        .filter(|&(_, health)| health <= 0)
        .map(|(victim, _)| Death {
            victim,
            killer: candidates
                .get(&victim)
                .and_then(|owners| owners.iter().min())
                .copied(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::world::{BotKind, MAX_HEALTH};
    use crate::game::BotState;
    use uuid::Uuid;

    fn world_with_bots(n: usize) -> (WorldState, Vec<BotId>) {
        let mut world = WorldState::new(800.0, 600.0);
        let ids = (0..n)
            .map(|i| world.add_bot(Uuid::new_v4(), format!("bot{i}"), BotKind::Primary))
            .collect();
        (world, ids)
    }

    fn intent(tx: f32, ty: f32, aim: f32, fire: bool) -> Intent {
        Intent {
            thrust_x: tx,
            thrust_y: ty,
            aim_angle: aim,
            fire,
        }
        .sanitized()
    }

    #[test]
    fn resolve_is_deterministic() {
        let (world, ids) = world_with_bots(4);
        let mut intents = BTreeMap::new();
        for (i, &id) in ids.iter().enumerate() {
            intents.insert(id, intent(0.7, -0.3, i as f32, i % 2 == 0));
        }

        let a = resolve(&world, &intents);
        let b = resolve(&world, &intents);
        assert_eq!(a, b);
    }

    #[test]
    fn movement_scales_with_thrust_and_dt() {
        let (world, ids) = world_with_bots(1);
        let bot = world.bot(ids[0]).unwrap();
        let (x0, y0) = (bot.x, bot.y);

        let mut intents = BTreeMap::new();
        intents.insert(ids[0], intent(1.0, 0.0, 0.0, false));
        let output = resolve(&world, &intents);

        let mv = output.moves.iter().find(|m| m.bot_id == ids[0]).unwrap();
        assert!((mv.x - (x0 + MAX_BOT_SPEED * tick_delta())).abs() < 1e-3);
        assert_eq!(mv.y, y0);
    }

    #[test]
    fn bots_never_leave_arena_bounds() {
        let (mut world, ids) = world_with_bots(1);
        let mut intents = BTreeMap::new();
        intents.insert(ids[0], intent(-1.0, -1.0, 0.0, false));

        for _ in 0..2000 {
            let output = resolve(&world, &intents);
            world.apply_tick(output);
            let bot = world.bot(ids[0]).unwrap();
            assert!(bot.x >= 0.0 && bot.x <= world.width);
            assert!(bot.y >= 0.0 && bot.y <= world.height);
        }
    }

    #[test]
    fn fire_respects_cooldown() {
        let (mut world, ids) = world_with_bots(1);
        let mut intents = BTreeMap::new();
        intents.insert(ids[0], intent(0.0, 0.0, 0.0, true));

        let mut spawned = 0;
        let ticks = fire_cooldown_ticks() * 3;
        for _ in 0..ticks {
            let output = resolve(&world, &intents);
            spawned += output.bullet_spawns.len();
            world.apply_tick(output);
        }
        // One immediate shot plus one per full cooldown elapsed
        assert_eq!(spawned as u64, 1 + (ticks - 1) / fire_cooldown_ticks());
    }

    #[test]
    fn dead_and_respawning_bots_ignore_intents() {
        for state in [BotState::Dead, BotState::Respawning] {
            let (mut world, ids) = world_with_bots(1);
            let (x0, y0) = {
                let bot = world.bot_mut(ids[0]).unwrap();
                bot.state = state;
                (bot.x, bot.y)
            };

            let mut intents = BTreeMap::new();
            intents.insert(ids[0], intent(1.0, 0.0, 0.0, true));
            let output = resolve(&world, &intents);

            assert!(output.moves.is_empty(), "{state:?} bot must not move");
            assert!(output.bullet_spawns.is_empty(), "{state:?} bot must not fire");
            let bot = world.bot(ids[0]).unwrap();
            assert_eq!((bot.x, bot.y), (x0, y0));
        }
    }

    #[test]
    fn overlapping_bots_separate_symmetrically() {
        let (mut world, ids) = world_with_bots(2);
        // Force an overlap via controlled moves
        let output = TickOutput {
            moves: vec![
                BotMove {
                    bot_id: ids[0],
                    x: 400.0,
                    y: 100.0,
                    vel_x: 0.0,
                    vel_y: 0.0,
                    aim_angle: 0.0,
                },
                BotMove {
                    bot_id: ids[1],
                    x: 410.0,
                    y: 100.0,
                    vel_x: 0.0,
                    vel_y: 0.0,
                    aim_angle: 0.0,
                },
            ],
            ..Default::default()
        };
        world.apply_tick(output);

        let output = resolve(&world, &BTreeMap::new());
        let m0 = output.moves.iter().find(|m| m.bot_id == ids[0]).unwrap();
        let m1 = output.moves.iter().find(|m| m.bot_id == ids[1]).unwrap();

        // Pushed apart along the center axis by equal amounts
        let gap = m1.x - m0.x;
        assert!((gap - BOT_RADIUS * 2.0).abs() < 1e-3);
        assert!((400.0 - m0.x - (m1.x - 410.0)).abs() < 1e-3);
        assert_eq!(m0.y, 100.0);
        assert_eq!(m1.y, 100.0);
    }

    #[test]
    fn separation_never_pushes_a_bot_into_a_wall() {
        let (mut world, ids) = world_with_bots(2);
        // Overlapping pair just west of the center vertical obstacle; naive
        // separation would shove the right bot into it
        let output = TickOutput {
            moves: vec![
                BotMove {
                    bot_id: ids[0],
                    x: 360.0,
                    y: 250.0,
                    vel_x: 0.0,
                    vel_y: 0.0,
                    aim_angle: 0.0,
                },
                BotMove {
                    bot_id: ids[1],
                    x: 368.0,
                    y: 250.0,
                    vel_x: 0.0,
                    vel_y: 0.0,
                    aim_angle: 0.0,
                },
            ],
            ..Default::default()
        };
        world.apply_tick(output);

        let output = resolve(&world, &BTreeMap::new());
        for mv in &output.moves {
            assert!(
                world.is_position_clear(mv.x, mv.y, BOT_RADIUS),
                "bot {} separated into a wall at ({}, {})",
                mv.bot_id,
                mv.x,
                mv.y
            );
        }

        // The pair still moved apart where room allowed it
        let m0 = output.moves.iter().find(|m| m.bot_id == ids[0]).unwrap();
        let m1 = output.moves.iter().find(|m| m.bot_id == ids[1]).unwrap();
        assert!(m1.x - m0.x > 8.0);
    }

    #[test]
    fn swept_bullet_hits_and_damages_target() {
        let (mut world, ids) = world_with_bots(2);
        // Shooter at (100, 100) aiming at a target at (160, 100)
        let output = TickOutput {
            moves: vec![
                BotMove {
                    bot_id: ids[0],
                    x: 100.0,
                    y: 100.0,
                    vel_x: 0.0,
                    vel_y: 0.0,
                    aim_angle: 0.0,
                },
                BotMove {
                    bot_id: ids[1],
                    x: 160.0,
                    y: 100.0,
                    vel_x: 0.0,
                    vel_y: 0.0,
                    aim_angle: 0.0,
                },
            ],
            ..Default::default()
        };
        world.apply_tick(output);

        let mut intents = BTreeMap::new();
        intents.insert(ids[0], intent(0.0, 0.0, 0.0, true));
        let output = resolve(&world, &intents);
        assert_eq!(output.bullet_spawns.len(), 1);
        world.apply_tick(output);

        // Let the bullet fly until it connects
        let mut hit = false;
        for _ in 0..20 {
            let output = resolve(&world, &BTreeMap::new());
            if output.hits.iter().any(|h| h.target == ids[1]) {
                hit = true;
                world.apply_tick(output);
                break;
            }
            world.apply_tick(output);
        }
        assert!(hit, "bullet should reach the target");
        assert_eq!(world.bot(ids[1]).unwrap().health, MAX_HEALTH - HIT_DAMAGE);
        assert!(world.bullets().is_empty(), "bullet destroyed on hit");
    }

    #[test]
    fn invulnerable_bot_stops_bullets_without_damage() {
        let (mut world, ids) = world_with_bots(2);
        let output = TickOutput {
            moves: vec![
                BotMove {
                    bot_id: ids[0],
                    x: 100.0,
                    y: 100.0,
                    vel_x: 0.0,
                    vel_y: 0.0,
                    aim_angle: 0.0,
                },
                BotMove {
                    bot_id: ids[1],
                    x: 130.0,
                    y: 100.0,
                    vel_x: 0.0,
                    vel_y: 0.0,
                    aim_angle: 0.0,
                },
            ],
            ..Default::default()
        };
        world.apply_tick(output);
        world.bot_mut(ids[1]).unwrap().state = BotState::Invulnerable;

        let mut intents = BTreeMap::new();
        intents.insert(ids[0], intent(0.0, 0.0, 0.0, true));
        let output = resolve(&world, &intents);
        world.apply_tick(output);

        let mut destroyed = false;
        for _ in 0..20 {
            let output = resolve(&world, &BTreeMap::new());
            assert!(output.hits.is_empty());
            if !output.bullet_removals.is_empty() {
                destroyed = true;
                world.apply_tick(output);
                break;
            }
            world.apply_tick(output);
        }
        assert!(destroyed, "bullet should be stopped by the invulnerable bot");
        assert_eq!(world.bot(ids[1]).unwrap().health, MAX_HEALTH);
    }

    #[test]
    fn kill_credit_requires_a_lethal_hit() {
        let (mut world, ids) = world_with_bots(3);
        let victim = ids[2];
        world.bot_mut(victim).unwrap().health = 50;

        // ids[0] softens the victim, ids[1] lands the killing blow; the
        // earlier non-lethal hit earns no credit despite the lower id
        let hits = vec![
            Hit {
                bullet: BulletId(1),
                owner: ids[0],
                target: victim,
                damage: HIT_DAMAGE,
            },
            Hit {
                bullet: BulletId(2),
                owner: ids[1],
                target: victim,
                damage: HIT_DAMAGE,
            },
        ];

        let deaths = deaths_from_hits(&world, &hits);
        assert_eq!(
            deaths,
            vec![Death {
                victim,
                killer: Some(ids[1]),
            }]
        );
    }

    #[test]
    fn simultaneous_lethal_hits_credit_the_lowest_owner_id() {
        let (mut world, ids) = world_with_bots(3);
        let victim = ids[2];
        world.bot_mut(victim).unwrap().health = 25;

        // Both hits land at or past zero; the tie goes to the lowest id
        let hits = vec![
            Hit {
                bullet: BulletId(1),
                owner: ids[1],
                target: victim,
                damage: HIT_DAMAGE,
            },
            Hit {
                bullet: BulletId(2),
                owner: ids[0],
                target: victim,
                damage: HIT_DAMAGE,
            },
        ];

        let deaths = deaths_from_hits(&world, &hits);
        assert_eq!(
            deaths,
            vec![Death {
                victim,
                killer: Some(ids[0]),
            }]
        );
    }
}
