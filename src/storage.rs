use crate::models::{Conversation, Message, Role};
use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, FromRow, Sqlite, SqlitePool};

// Define the database schema using CREATE TABLE IF NOT EXISTS statements
const MIGRATIONS_SQL: &str = "
-- Conversations Table
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    model TEXT NOT NULL, -- empty string means 'use the configured default'
    created_at INTEGER NOT NULL -- Unix Timestamp (seconds)
);

-- Messages Table
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id INTEGER NOT NULL,
    role TEXT NOT NULL, -- 'user', 'assistant' or 'system'
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL, -- Unix Timestamp (seconds)
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation_id ON messages(conversation_id);
CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at);
";

// Intermediate row types: timestamps live as INTEGER unix seconds and roles
// as TEXT, so rows are mapped to the model structs by hand.
#[derive(FromRow)]
struct ConversationRow {
    id: i64,
    title: String,
    model: String,
    created_at: i64,
}

#[derive(FromRow)]
struct MessageRow {
    id: i64,
    conversation_id: i64,
    role: String,
    content: String,
    created_at: i64,
}

impl ConversationRow {
    fn into_conversation(self) -> Result<Conversation, anyhow::Error> {
        Ok(Conversation {
            id: self.id,
            title: self.title,
            model: self.model,
            created_at: parse_timestamp(self.created_at)?,
        })
    }
}

impl MessageRow {
    fn into_message(self) -> Result<Message, anyhow::Error> {
        Ok(Message {
            id: self.id,
            conversation_id: self.conversation_id,
            role: self.role.parse()?,
            content: self.content,
            timestamp: parse_timestamp(self.created_at)?,
        })
    }
}

fn parse_timestamp(secs: i64) -> Result<DateTime<Utc>, anyhow::Error> {
    DateTime::from_timestamp(secs, 0).context("Invalid timestamp")
}

#[derive(Debug)]
pub struct StorageManager {
    pool: SqlitePool,
}

impl StorageManager {
    /// Creates a new StorageManager, connects to the database, and runs migrations.
    pub async fn new(db_path: &str) -> Result<Self, anyhow::Error> {
        let db_url = format!("sqlite://{}?mode=rwc", db_path);
        log::info!("Connecting to database: {}", db_url);

        // Create the database file if it doesn't exist
        if !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            log::info!("Database file not found, creating...");
            Sqlite::create_database(&db_url)
                .await
                .context("Failed to create database")?;
        }

        let pool = SqlitePoolOptions::new()
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// In-memory database for tests and throwaway runs. A single connection is
    /// mandatory: every new in-memory connection would be a fresh database.
    pub async fn in_memory() -> Result<Self, anyhow::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies the database schema migrations.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), anyhow::Error> {
        log::info!("Running database migrations...");
        sqlx::query(MIGRATIONS_SQL)
            .execute(pool)
            .await
            .context("Failed to run database migrations")?;
        log::info!("Database migrations completed.");
        Ok(())
    }

    /// Creates a new conversation with the given title and model.
    pub async fn create_conversation(
        &self,
        title: &str,
        model: &str,
    ) -> Result<Conversation, anyhow::Error> {
        log::info!("Creating new conversation: {}", title);
        let created_at = Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO conversations (title, model, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(title)
        .bind(model)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert new conversation into database")?;

        let conversation = Conversation {
            id: result.last_insert_rowid(),
            title: title.to_string(),
            model: model.to_string(),
            created_at: parse_timestamp(created_at)?,
        };
        log::info!("Successfully created conversation with ID: {}", conversation.id);
        Ok(conversation)
    }

    /// Fetches a single conversation by its ID.
    pub async fn get_conversation(&self, id: i64) -> Result<Option<Conversation>, anyhow::Error> {
        log::debug!("Fetching conversation with ID: {}", id);
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, title, model, created_at
            FROM conversations
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch conversation from database")?;

        row.map(ConversationRow::into_conversation).transpose()
    }

    /// Fetches all conversations, newest first.
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, anyhow::Error> {
        log::debug!("Fetching all conversations from database");
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, title, model, created_at
            FROM conversations
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch conversations from database")?;

        let conversations = rows
            .into_iter()
            .map(ConversationRow::into_conversation)
            .collect::<Result<Vec<Conversation>, anyhow::Error>>()?;

        log::info!("Fetched {} conversations", conversations.len());
        Ok(conversations)
    }

    /// Appends a message to a conversation and returns the stored row.
    pub async fn append_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<Message, anyhow::Error> {
        log::debug!(
            "Appending {} message to conversation: {}",
            role,
            conversation_id
        );
        let created_at = Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, role, content, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert message into database")?;

        let message = Message {
            id: result.last_insert_rowid(),
            conversation_id,
            role,
            content: content.to_string(),
            timestamp: parse_timestamp(created_at)?,
        };
        log::info!("Successfully saved message ID: {}", message.id);
        Ok(message)
    }

    /// Fetches all messages for a conversation in append order. Timestamps
    /// have one-second resolution, so the autoincrement id breaks ties.
    pub async fn list_messages(&self, conversation_id: i64) -> Result<Vec<Message>, anyhow::Error> {
        log::debug!("Fetching messages for conversation ID: {}", conversation_id);
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, role, content, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch messages from database")?;

        let messages = rows
            .into_iter()
            .map(MessageRow::into_message)
            .collect::<Result<Vec<Message>, anyhow::Error>>()?;

        log::debug!(
            "Fetched {} messages for conversation {}",
            messages.len(),
            conversation_id
        );
        Ok(messages)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
