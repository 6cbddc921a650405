use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Who authored a message. The set is closed: nothing else is ever stored.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(anyhow::anyhow!("Unknown message role: {}", other)),
        }
    }
}

// Represents the metadata for a conversation thread
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Conversation {
    pub id: i64,
    pub title: String, // e.g., "Chat about Rust"
    // Completion model for this thread; empty means "use the configured default"
    pub model: String,
    pub created_at: DateTime<Utc>,
}

// Represents a single stored message in a conversation
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

// The {role, content} projection sent to the completion API. Ids, timestamps
// and back-references never leave the process.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        ChatMessage {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}
