use crate::chat::ChatError;
use crate::models::{Conversation, Message};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

#[derive(Deserialize)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
    pub model: Option<String>,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    pub reply: String,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        match self {
            ChatError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("Conversation {} not found", id) })),
            )
                .into_response(),
            // The turn is persisted; the caller still learns it failed.
            ChatError::Completion(diagnostic) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": diagnostic })),
            )
                .into_response(),
            ChatError::Storage(err) => {
                log::error!("Storage failure: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal storage error" })),
                )
                    .into_response()
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/{id}/messages",
            get(conversation_messages).post(send_message),
        )
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> Result<(), anyhow::Error> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Listening on http://{}", addr);
    axum::serve(listener, router(state).into_make_service()).await?;
    Ok(())
}

async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Conversation>>, ChatError> {
    log::info!("Listing conversations");
    Ok(Json(state.chat.list_conversations().await?))
}

async fn create_conversation(
    State(state): State<AppState>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<Conversation>, ChatError> {
    let conversation = state.chat.create_conversation(req.title, req.model).await?;
    Ok(Json(conversation))
}

async fn conversation_messages(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Message>>, ChatError> {
    Ok(Json(state.chat.conversation_messages(id).await?))
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ChatError> {
    log::info!("Received message for conversation ID: {}", id);
    let reply = state.chat.send_message(id, &req.content).await?;
    Ok(Json(SendMessageResponse { reply }))
}
