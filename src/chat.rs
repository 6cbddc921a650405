use crate::api::CompletionClient;
use crate::models::{ChatMessage, Conversation, Message, Role};
use crate::storage::StorageManager;
use std::sync::Arc;
use thiserror::Error;

/// Last-resort model identifier, used only when both the conversation and the
/// configuration leave the model blank.
const FALLBACK_MODEL: &str = "gpt-4o-mini";

const DEFAULT_TITLE: &str = "New Chat";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Conversation {0} not found")]
    NotFound(i64),
    /// The completion call failed. The diagnostic is the same text that was
    /// persisted as the assistant message for the turn.
    #[error("{0}")]
    Completion(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Coordinates one conversational turn: persist the user's message, assemble
/// history, call the completion API, persist and return the outcome.
pub struct ChatService {
    storage: Arc<StorageManager>,
    completion: Arc<dyn CompletionClient>,
    default_model: String,
}

/// Effective model for a completion call: the conversation's own model wins,
/// then the configured default, then the hard fallback.
fn resolve_model<'a>(conversation_model: &'a str, configured_default: &'a str) -> &'a str {
    if !conversation_model.trim().is_empty() {
        conversation_model
    } else if !configured_default.trim().is_empty() {
        configured_default
    } else {
        FALLBACK_MODEL
    }
}

impl ChatService {
    pub fn new(
        storage: Arc<StorageManager>,
        completion: Arc<dyn CompletionClient>,
        default_model: String,
    ) -> Self {
        Self {
            storage,
            completion,
            default_model,
        }
    }

    /// Creates a conversation; blank title and model fall back to "New Chat"
    /// and the configured default model.
    pub async fn create_conversation(
        &self,
        title: Option<String>,
        model: Option<String>,
    ) -> Result<Conversation, ChatError> {
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let model = model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model.clone());

        Ok(self.storage.create_conversation(&title, &model).await?)
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        Ok(self.storage.list_conversations().await?)
    }

    /// Full stored messages of a conversation, in append order.
    pub async fn conversation_messages(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<Message>, ChatError> {
        if self.storage.get_conversation(conversation_id).await?.is_none() {
            return Err(ChatError::NotFound(conversation_id));
        }
        Ok(self.storage.list_messages(conversation_id).await?)
    }

    /// The ordered {role, content} history a completion call requires, oldest
    /// first. Pure read; repeated calls against an unmodified conversation
    /// return the identical sequence.
    pub async fn assemble_history(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        if self.storage.get_conversation(conversation_id).await?.is_none() {
            return Err(ChatError::NotFound(conversation_id));
        }
        let messages = self.storage.list_messages(conversation_id).await?;
        Ok(messages.iter().map(ChatMessage::from).collect())
    }

    /// Handles one user message end to end and returns the assistant's reply.
    ///
    /// The user message is committed as soon as the conversation is known to
    /// exist and is never rolled back; a failed completion is persisted as an
    /// assistant message carrying the diagnostic and reported as
    /// `ChatError::Completion` with that same text.
    pub async fn send_message(
        &self,
        conversation_id: i64,
        content: &str,
    ) -> Result<String, ChatError> {
        let conversation = self
            .storage
            .get_conversation(conversation_id)
            .await?
            .ok_or(ChatError::NotFound(conversation_id))?;

        self.storage
            .append_message(conversation_id, Role::User, content)
            .await?;

        // The submitted message is appended to the payload explicitly; the
        // history read is not trusted to already contain it.
        let mut history = self.assemble_history(conversation_id).await?;
        history.push(ChatMessage {
            role: Role::User,
            content: content.to_string(),
        });

        let model = resolve_model(&conversation.model, &self.default_model);

        match self.completion.complete(&history, model).await {
            Ok(reply) => {
                log::info!(
                    "Assistant reply for conversation {}: {}",
                    conversation_id,
                    reply
                );
                self.storage
                    .append_message(conversation_id, Role::Assistant, &reply)
                    .await?;
                Ok(reply)
            }
            Err(err) => {
                let diagnostic = format!("ERROR: {}", err);
                log::warn!(
                    "Completion failed for conversation {}: {}",
                    conversation_id,
                    diagnostic
                );
                // Persisted so the failure stays visible in the thread.
                self.storage
                    .append_message(conversation_id, Role::Assistant, &diagnostic)
                    .await?;
                Err(ChatError::Completion(diagnostic))
            }
        }
    }
}
