use std::sync::Arc;

use application::{ChatService, UserService};
use config::WebSocketConfig;

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub chat_service: Arc<ChatService>,
    pub websocket: WebSocketConfig,
}

impl AppState {
    pub fn new(
        user_service: Arc<UserService>,
        chat_service: Arc<ChatService>,
        websocket: WebSocketConfig,
    ) -> Self {
        Self {
            user_service,
            chat_service,
            websocket,
        }
    }
}
