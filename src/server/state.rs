use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::connection_manager::{ConnectionLimits, ConnectionManager};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub connection_manager: Arc<ConnectionManager>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let limits = ConnectionLimits {
            max_connections: settings.websocket.max_connections,
        };
        let connection_manager = Arc::new(ConnectionManager::with_limits(limits));

        Self {
            settings: Arc::new(settings),
            connection_manager,
            start_time: Instant::now(),
        }
    }
}
