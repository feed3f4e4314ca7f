//! Authoritative arena battle server
//!
//! Real-time 2D arena simulation for reinforcement-learning bot combat.
//! Rooms run a fixed 60 TPS simulation on dedicated tasks; sessions connect
//! over WebSocket, get matched into rooms, and stream per-bot observations
//! back while their intents feed the next tick.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod matchmaking;
pub mod util;
pub mod ws;
