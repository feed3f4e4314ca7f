//! WebSocket session handling
//!
//! One socket is one session. The first frame must register (agent) or
//! spectate (viewer); after that the socket splits into a reader that routes
//! client frames into the assigned room and a writer that drains the
//! session's broadcast channel. A session that cannot keep up lags and loses
//! old frames rather than stalling the room.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::SessionInput;
use crate::matchmaking::{MatchmakingError, RegisterOutcome};
use crate::util::rate_limit::SessionRateLimiter;
use crate::util::time::{unix_millis, Timer};
use crate::ws::protocol::{ClientMsg, ErrorCode, ServerMsg};

/// Outbound frames buffered per session before lagging drops the oldest
const SESSION_BUFFER: usize = 64;
/// How long a fresh socket may idle before its first register/spectate frame
const REGISTER_DEADLINE: Duration = Duration::from_secs(30);
/// Longest accepted bot name; longer names are truncated, not rejected
const MAX_BOT_NAME: usize = 32;

pub async fn ws_upgrade(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4();
    let timer = Timer::new();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, rx) = broadcast::channel::<ServerMsg>(SESSION_BUFFER);

    if send_frame(
        &mut ws_tx,
        &ServerMsg::Welcome {
            session_id,
            server_time: unix_millis(),
        },
    )
    .await
    .is_err()
    {
        return;
    }

    if !handshake(session_id, &state, &mut ws_tx, &mut ws_rx, &tx).await {
        let _ = ws_tx.close().await;
        return;
    }

    // Writer drains the session channel until it closes or the socket drops
    let mut writer = tokio::spawn(async move { write_loop(ws_tx, rx).await });

    read_loop(session_id, &state, &mut ws_rx).await;

    state.matchmaking.unregister(session_id).await;
    writer.abort();
    let _ = (&mut writer).await;
    info!(%session_id, duration_ms = timer.elapsed_ms(), "session closed");
}

/// Process the mandatory first frame. Returns false when the socket should
/// close without entering the streaming phase.
async fn handshake(
    session_id: Uuid,
    state: &AppState,
    ws_tx: &mut SplitSink<WebSocket, Message>,
    ws_rx: &mut SplitStream<WebSocket>,
    tx: &broadcast::Sender<ServerMsg>,
) -> bool {
    let first = match timeout(REGISTER_DEADLINE, ws_rx.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(_) => return false,
        Err(_) => {
            debug!(%session_id, "register deadline expired");
            return false;
        }
    };

    let msg: ClientMsg = match serde_json::from_str(&first) {
        Ok(msg) => msg,
        Err(err) => {
            let _ = send_frame(
                ws_tx,
                &ServerMsg::Error {
                    code: ErrorCode::BadMessage,
                    message: format!("malformed frame: {err}"),
                },
            )
            .await;
            return false;
        }
    };

    let result = match msg {
        ClientMsg::Register {
            player_id,
            bot_name,
            mode,
            model_ref,
        } => {
            let seat = crate::game::room::Seat {
                session_id,
                player_id,
                bot_name: clean_name(bot_name),
                viewer: false,
                tx: tx.clone(),
            };
            match state.matchmaking.register(seat, mode, model_ref).await {
                // The room confirms with a `registered` frame on the channel
                Ok(RegisterOutcome::Assigned { .. }) => Ok(()),
                Ok(RegisterOutcome::Queued { position }) => {
                    let _ = tx.send(ServerMsg::Queued { position });
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }
        ClientMsg::Spectate { room_id } => {
            let seat = crate::game::room::Seat {
                session_id,
                player_id: Uuid::nil(),
                bot_name: String::new(),
                viewer: true,
                tx: tx.clone(),
            };
            state.matchmaking.spectate(seat, room_id).await
        }
        other => {
            debug!(%session_id, msg = ?other, "first frame must register or spectate");
            let _ = send_frame(
                ws_tx,
                &ServerMsg::Error {
                    code: ErrorCode::NotRegistered,
                    message: "first frame must be register or spectate".into(),
                },
            )
            .await;
            return false;
        }
    };

    match result {
        Ok(()) => true,
        Err(err) => {
            let _ = send_frame(
                ws_tx,
                &ServerMsg::Error {
                    code: error_code(&err),
                    message: err.to_string(),
                },
            )
            .await;
            false
        }
    }
}

async fn read_loop(session_id: Uuid, state: &AppState, ws_rx: &mut SplitStream<WebSocket>) {
    let limiter = SessionRateLimiter::new();

    while let Some(frame) = ws_rx.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        if !limiter.check_input() {
            // Dropped, not fatal; the client is pushing faster than any
            // speed multiplier warrants
            debug!(%session_id, "inbound frame rate limited");
            continue;
        }

        let msg: ClientMsg = match serde_json::from_str(&text) {
            Ok(msg) => msg,
            Err(err) => {
                debug!(%session_id, "malformed frame dropped: {err}");
                continue;
            }
        };

        let leaving = matches!(msg, ClientMsg::Leave);
        state
            .matchmaking
            .route(SessionInput {
                session_id,
                msg,
                received_at: unix_millis(),
            })
            .await;
        if leaving {
            break;
        }
    }
}

async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: broadcast::Receiver<ServerMsg>,
) {
    loop {
        match rx.recv().await {
            Ok(msg) => {
                if send_frame(&mut ws_tx, &msg).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // Drop-oldest: stale snapshots are worthless to a live agent
                warn!(skipped, "session output lagged, frames dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    let _ = ws_tx.close().await;
}

async fn send_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).unwrap_or_else(|err| {
        // Serialization of our own types cannot fail in practice
        format!(r#"{{"type":"error","code":"bad_message","message":"{err}"}}"#)
    });
    ws_tx.send(Message::Text(json)).await
}

fn clean_name(name: String) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return "bot".to_string();
    }
    trimmed.chars().take(MAX_BOT_NAME).collect()
}

fn error_code(err: &MatchmakingError) -> ErrorCode {
    match err {
        MatchmakingError::NoRoomAvailable => ErrorCode::NoRoomAvailable,
        MatchmakingError::AlreadyRegistered => ErrorCode::BadMessage,
        MatchmakingError::UnknownRoom(_) => ErrorCode::UnknownRoom,
        MatchmakingError::RoomClosed => ErrorCode::UnknownRoom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_names_are_trimmed_and_bounded() {
        assert_eq!(clean_name("  agent-1  ".into()), "agent-1");
        assert_eq!(clean_name("   ".into()), "bot");
        assert_eq!(clean_name("x".repeat(100)).len(), MAX_BOT_NAME);
    }

    #[test]
    fn matchmaking_errors_map_to_wire_codes() {
        assert_eq!(
            error_code(&MatchmakingError::NoRoomAvailable),
            ErrorCode::NoRoomAvailable
        );
        assert_eq!(
            error_code(&MatchmakingError::UnknownRoom(Uuid::nil())),
            ErrorCode::UnknownRoom
        );
    }
}
