//! WebSocket transport: protocol types and session handling

pub mod handler;
pub mod protocol;
