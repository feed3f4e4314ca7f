//! HTTP surface: health, room listing and the WebSocket upgrade

pub mod routes;
