use crate::config::AppConfig;
use crate::models::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single completion call's failure modes. A malformed-but-successful
/// response body is NOT one of them; that degrades to returning the raw body.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Missing API key in configuration")]
    MissingApiKey,
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status} - {status_text}: {body}")]
    Upstream {
        status: u16,
        status_text: String,
        body: String,
    },
}

// Trait defining the interface to a chat completion API
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Sends the full ordered history plus a model identifier and returns the
    /// assistant's reply text. The newest user message must already be the
    /// last element of `history`.
    async fn complete(
        &self,
        history: &[ChatMessage],
        model: &str,
    ) -> Result<String, CompletionError>;
}

// --- OpenAI-compatible implementation ---

#[derive(Serialize)]
struct OpenAiRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize, Default)]
struct OpenAiChoiceMessage {
    content: Option<String>,
}

pub struct OpenAiClient {
    http: Client,
    api_key: Option<String>,
    base_url: String,
    default_model: String,
}

impl OpenAiClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            default_model: config.default_model.clone(),
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        history: &[ChatMessage],
        model: &str,
    ) -> Result<String, CompletionError> {
        let Some(api_key) = self.api_key.as_deref() else {
            log::warn!("Completion API key is missing in configuration.");
            return Err(CompletionError::MissingApiKey);
        };

        let model = if model.trim().is_empty() {
            self.default_model.as_str()
        } else {
            model
        };

        let request_body = OpenAiRequestBody {
            model,
            messages: history,
        };
        if let Ok(payload) = serde_json::to_string(&request_body) {
            log::debug!("Completion request payload: {}", payload);
        }

        let request_url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        // One attempt, transport-default timeout. Retries are the caller's
        // problem if they ever become one.
        let response = self
            .http
            .post(&request_url)
            .bearer_auth(api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            log::warn!(
                "Completion request failed: HTTP {} - {}",
                status.as_u16(),
                body
            );
            return Err(CompletionError::Upstream {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body,
            });
        }

        // Try to extract choices[0].message.content
        if let Ok(parsed) = serde_json::from_str::<OpenAiResponse>(&body) {
            if let Some(content) = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
            {
                log::debug!("Completion reply: {}", content);
                return Ok(content);
            }
        }

        // Fallback: surface the entire response body as the reply
        log::debug!("Completion raw response: {}", body);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use axum::http::{header, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    fn client(api_key: Option<&str>, base_url: &str) -> OpenAiClient {
        OpenAiClient::new(&AppConfig {
            api_key: api_key.map(str::to_string),
            base_url: base_url.to_string(),
            default_model: "gpt-4o-mini".to_string(),
            database_path: ":unused:".to_string(),
            port: 0,
        })
    }

    fn history() -> Vec<ChatMessage> {
        vec![ChatMessage {
            role: Role::User,
            content: "hello".to_string(),
        }]
    }

    /// Serves canned responses on /chat/completions and records the request
    /// bodies it sees. Returns the base URL to point the client at.
    async fn spawn_upstream(
        status: StatusCode,
        body: &str,
        seen: Arc<Mutex<Vec<serde_json::Value>>>,
    ) -> String {
        let body = body.to_string();
        let app = Router::new().route(
            "/chat/completions",
            post(move |Json(request): Json<serde_json::Value>| {
                let body = body.clone();
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(request);
                    (status, [(header::CONTENT_TYPE, "application/json")], body)
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn missing_api_key_short_circuits_without_network() {
        // Nothing is listening here; a request attempt would fail loudly.
        let client = client(None, "http://127.0.0.1:9");
        let err = client.complete(&history(), "gpt-4o").await.unwrap_err();
        assert!(matches!(err, CompletionError::MissingApiKey));
        assert_eq!(err.to_string(), "Missing API key in configuration");
    }

    #[tokio::test]
    async fn well_formed_response_yields_reply_text() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let base = spawn_upstream(
            StatusCode::OK,
            r#"{"choices":[{"message":{"role":"assistant","content":"Hi there"}}]}"#,
            seen.clone(),
        )
        .await;

        let client = client(Some("test-key"), &base);
        let reply = client.complete(&history(), "gpt-4o").await.unwrap();
        assert_eq!(reply, "Hi there");

        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["model"], "gpt-4o");
        assert_eq!(requests[0]["messages"][0]["role"], "user");
        assert_eq!(requests[0]["messages"][0]["content"], "hello");
    }

    #[tokio::test]
    async fn blank_model_falls_back_to_configured_default() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let base = spawn_upstream(
            StatusCode::OK,
            r#"{"choices":[{"message":{"content":"ok"}}]}"#,
            seen.clone(),
        )
        .await;

        let client = client(Some("test-key"), &base);
        client.complete(&history(), "  ").await.unwrap();

        let requests = seen.lock().unwrap();
        assert_eq!(requests[0]["model"], "gpt-4o-mini");
    }

    #[tokio::test]
    async fn error_status_becomes_upstream_failure_with_body() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let base = spawn_upstream(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":"rate limited"}"#,
            seen.clone(),
        )
        .await;

        let client = client(Some("test-key"), &base);
        let err = client.complete(&history(), "gpt-4o").await.unwrap_err();
        let diagnostic = err.to_string();
        assert!(diagnostic.contains("429"), "missing status: {}", diagnostic);
        assert!(
            diagnostic.contains(r#"{"error":"rate limited"}"#),
            "missing body: {}",
            diagnostic
        );
    }

    #[tokio::test]
    async fn malformed_success_body_is_returned_verbatim() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let raw = r#"{"object":"list","data":[]}"#;
        let base = spawn_upstream(StatusCode::OK, raw, seen.clone()).await;

        let client = client(Some("test-key"), &base);
        let reply = client.complete(&history(), "gpt-4o").await.unwrap();
        assert_eq!(reply, raw);
    }

    #[tokio::test]
    async fn empty_choices_array_is_returned_verbatim() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let raw = r#"{"choices":[]}"#;
        let base = spawn_upstream(StatusCode::OK, raw, seen.clone()).await;

        let client = client(Some("test-key"), &base);
        let reply = client.complete(&history(), "gpt-4o").await.unwrap();
        assert_eq!(reply, raw);
    }

    #[tokio::test]
    async fn present_but_empty_content_is_a_success() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let base = spawn_upstream(
            StatusCode::OK,
            r#"{"choices":[{"message":{"content":""}}]}"#,
            seen.clone(),
        )
        .await;

        let client = client(Some("test-key"), &base);
        let reply = client.complete(&history(), "gpt-4o").await.unwrap();
        assert_eq!(reply, "");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_transport_failure() {
        let client = client(Some("test-key"), "http://127.0.0.1:9");
        let err = client.complete(&history(), "gpt-4o").await.unwrap_err();
        assert!(matches!(err, CompletionError::Transport(_)));
    }
}
