use crate::chat::ChatService;
use std::sync::Arc;

// Shared application state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
}

impl AppState {
    pub fn new(chat: ChatService) -> Self {
        Self {
            chat: Arc::new(chat),
        }
    }
}
