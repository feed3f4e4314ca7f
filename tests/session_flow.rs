//! Registration-to-streaming flow through the matchmaking service and a
//! live room task, without the WebSocket transport.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;
use uuid::Uuid;

use arena_server::config::Config;
use arena_server::game::room::{RoomRegistry, Seat};
use arena_server::matchmaking::{MatchmakingService, RegisterOutcome};
use arena_server::ws::protocol::{MatchMode, ServerMsg};

fn test_config() -> Config {
    Config {
        server_addr: "127.0.0.1:0".parse().unwrap(),
        log_level: "info".into(),
        arena_width: 800.0,
        arena_height: 600.0,
        max_rooms: 8,
        client_origin: "*".into(),
    }
}

fn service() -> Arc<MatchmakingService> {
    Arc::new(MatchmakingService::new(
        Arc::new(test_config()),
        Arc::new(RoomRegistry::default()),
    ))
}

fn seat(name: &str) -> (Seat, broadcast::Receiver<ServerMsg>) {
    let (tx, rx) = broadcast::channel(64);
    (
        Seat {
            session_id: Uuid::new_v4(),
            player_id: Uuid::new_v4(),
            bot_name: name.into(),
            viewer: false,
            tx,
        },
        rx,
    )
}

async fn next_msg(rx: &mut broadcast::Receiver<ServerMsg>) -> ServerMsg {
    loop {
        match timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Ok(msg)) => return msg,
            // Lagging only drops stale frames; keep reading
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => panic!("session channel closed"),
            Err(_) => panic!("timed out waiting for a frame"),
        }
    }
}

#[tokio::test]
async fn self_play_session_streams_observations_for_all_its_bots() {
    let service = service();
    let (seat, mut rx) = seat("agent");

    let outcome = service.register(seat, None, None).await.unwrap();
    assert!(matches!(outcome, RegisterOutcome::Assigned { .. }));

    // Registration frame carries the static arena data
    let bot_ids = loop {
        if let ServerMsg::Registered {
            mode,
            bot_ids,
            arena_width,
            arena_height,
            walls,
            ..
        } = next_msg(&mut rx).await
        {
            assert_eq!(mode, MatchMode::SelfPlay);
            assert_eq!(bot_ids.len(), 3, "primary plus two clones");
            assert_eq!((arena_width, arena_height), (800.0, 600.0));
            assert!(!walls.is_empty());
            break bot_ids;
        }
    };

    // Every controlled bot gets an observation each tick
    let mut seen = std::collections::HashSet::new();
    while seen.len() < bot_ids.len() {
        if let ServerMsg::Observation { bot_id, obs } = next_msg(&mut rx).await {
            assert!(bot_ids.contains(&bot_id));
            assert!(obs.self_health > 0);
            seen.insert(bot_id);
        }
    }

    // Snapshots tick forward
    let mut last_tick = None;
    for _ in 0..200 {
        if let ServerMsg::Snapshot(snap) = next_msg(&mut rx).await {
            assert_eq!(snap.bots.len(), 3);
            if let Some(last) = last_tick {
                assert!(snap.tick > last);
                break;
            }
            last_tick = Some(snap.tick);
        }
    }
    assert!(last_tick.is_some(), "no snapshot frames received");
}

#[tokio::test]
async fn pvp_sessions_pair_and_share_one_room() {
    let service = service();

    let (seat_a, mut rx_a) = seat("left");
    let outcome = service
        .register(seat_a, Some(MatchMode::Pvp), None)
        .await
        .unwrap();
    assert_eq!(outcome, RegisterOutcome::Queued { position: 1 });
    assert_eq!(service.registry().len(), 0, "queueing creates no room");

    let (seat_b, mut rx_b) = seat("right");
    let RegisterOutcome::Assigned { room_id } = service
        .register(seat_b, Some(MatchMode::Pvp), None)
        .await
        .unwrap()
    else {
        panic!("second pvp registration should pair immediately");
    };

    for rx in [&mut rx_a, &mut rx_b] {
        loop {
            if let ServerMsg::Registered {
                room_id: assigned,
                mode,
                bot_ids,
                ..
            } = next_msg(rx).await
            {
                assert_eq!(assigned, room_id);
                assert_eq!(mode, MatchMode::Pvp);
                assert_eq!(bot_ids.len(), 1);
                break;
            }
        }
    }

    // Both sessions see both bots once the room starts ticking
    loop {
        if let ServerMsg::Snapshot(snap) = next_msg(&mut rx_a).await {
            assert_eq!(snap.bots.len(), 2);
            break;
        }
    }
}

#[tokio::test]
async fn disconnect_tears_the_room_down_within_a_beat() {
    let service = service();
    let (seat, mut rx) = seat("short-lived");
    let session_id = seat.session_id;

    service.register(seat, None, None).await.unwrap();
    loop {
        if matches!(next_msg(&mut rx).await, ServerMsg::Registered { .. }) {
            break;
        }
    }
    assert_eq!(service.registry().len(), 1);

    service.unregister(session_id).await;
    timeout(Duration::from_secs(2), async {
        while !service.registry().is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("room should be torn down after its only session leaves");
}

#[tokio::test]
async fn viewer_spectates_an_existing_room() {
    let service = service();
    let (player, mut player_rx) = seat("player");
    let RegisterOutcome::Assigned { room_id } =
        service.register(player, None, None).await.unwrap()
    else {
        panic!("expected assignment");
    };
    loop {
        if matches!(next_msg(&mut player_rx).await, ServerMsg::Registered { .. }) {
            break;
        }
    }

    let (viewer_tx, mut viewer_rx) = broadcast::channel(64);
    let viewer = Seat {
        session_id: Uuid::new_v4(),
        player_id: Uuid::nil(),
        bot_name: String::new(),
        viewer: true,
        tx: viewer_tx,
    };
    service.spectate(viewer, room_id).await.unwrap();

    // Viewers get the arena data and snapshots, but control no bots
    loop {
        if let ServerMsg::Registered { bot_ids, .. } = next_msg(&mut viewer_rx).await {
            assert!(bot_ids.is_empty());
            break;
        }
    }
    loop {
        match next_msg(&mut viewer_rx).await {
            ServerMsg::Snapshot(snap) => {
                assert_eq!(snap.bots.len(), 3);
                break;
            }
            ServerMsg::Observation { .. } => panic!("viewers receive no observations"),
            _ => continue,
        }
    }
}
