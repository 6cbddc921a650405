// Declare the modules
pub mod api;
pub mod chat;
pub mod config;
pub mod models;
pub mod server;
pub mod state;
pub mod storage;

use crate::api::{CompletionClient, OpenAiClient};
use crate::chat::ChatService;
use crate::config::AppConfig;
use crate::state::AppState;
use crate::storage::StorageManager;
use std::sync::Arc;

/// Wires configuration, storage, the completion client and the chat service
/// together, then serves the HTTP API until the process is stopped.
pub async fn run() -> Result<(), anyhow::Error> {
    let config = AppConfig::from_env();

    let storage = Arc::new(StorageManager::new(&config.database_path).await?);
    let completion: Arc<dyn CompletionClient> = Arc::new(OpenAiClient::new(&config));
    let service = ChatService::new(storage, completion, config.default_model.clone());
    let state = AppState::new(service);

    server::serve(state, config.port).await
}
