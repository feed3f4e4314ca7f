//! Shared application state

use std::sync::Arc;

use crate::config::Config;
use crate::game::room::RoomRegistry;
use crate::matchmaking::MatchmakingService;

/// State shared by every HTTP and WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub matchmaking: Arc<MatchmakingService>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(RoomRegistry::default());
        let matchmaking = Arc::new(MatchmakingService::new(config.clone(), registry));
        Self {
            config,
            matchmaking,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        self.matchmaking.registry()
    }
}
