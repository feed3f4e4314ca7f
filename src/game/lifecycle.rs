//! Bot lifecycle state machine
//!
//! Alive → Dead → Respawning → Invulnerable → Alive. Transition timing is a
//! pure function of the tick counter and each bot's recorded event ticks,
//! decoupled from physics. The room runs `advance` once per tick, before the
//! resolver, so a respawn and a fresh intent in the same tick are consistent.

use super::world::WorldState;
use super::BotId;
use crate::util::time::ticks_for_secs;

/// Delay between death and respawn
pub const RESPAWN_DELAY_SECS: f32 = 1.0;
/// Post-respawn invulnerability window
pub const INVULNERABILITY_SECS: f32 = 1.0;

pub fn respawn_delay_ticks() -> u64 {
    ticks_for_secs(RESPAWN_DELAY_SECS)
}

pub fn invulnerability_ticks() -> u64 {
    ticks_for_secs(INVULNERABILITY_SECS)
}

/// A state transition to apply to one bot this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleTransition {
    /// Dead → Respawning, automatic one tick after death
    BeginRespawnWait { bot_id: BotId },
    /// Respawning → Invulnerable at the death location with full health
    Respawn {
        bot_id: BotId,
        invulnerable_until_tick: u64,
    },
    /// Invulnerable → Alive
    EndInvulnerability { bot_id: BotId },
}

/// Compute this tick's transitions from the current world state
pub fn advance(world: &WorldState) -> Vec<LifecycleTransition> {
    let tick = world.tick();
    let mut transitions = Vec::new();

    for bot in world.bots().values() {
        match bot.state {
            super::BotState::Dead => {
                transitions.push(LifecycleTransition::BeginRespawnWait { bot_id: bot.id });
            }
            super::BotState::Respawning => {
                let Some(death_tick) = bot.death_tick else {
                    tracing::error!(bot_id = %bot.id, "respawning bot without death tick");
                    debug_assert!(false, "respawning bot without death tick");
                    continue;
                };
                if tick.saturating_sub(death_tick) >= respawn_delay_ticks() {
                    transitions.push(LifecycleTransition::Respawn {
                        bot_id: bot.id,
                        invulnerable_until_tick: tick + invulnerability_ticks(),
                    });
                }
            }
            super::BotState::Invulnerable => {
                if bot
                    .invulnerable_until_tick
                    .is_some_and(|until| tick >= until)
                {
                    transitions.push(LifecycleTransition::EndInvulnerability { bot_id: bot.id });
                }
            }
            super::BotState::Alive => {}
        }
    }

    transitions
}
