use std::env;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_DATABASE_PATH: &str = "chat.db";
const DEFAULT_PORT: u16 = 8080;

/// Everything the process reads from its environment, captured once at
/// startup and passed into constructors from there.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Completion API credential. `None` when unset or blank; the completion
    /// client short-circuits without it rather than attempting a request.
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    pub database_path: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            log::warn!("OPENAI_API_KEY is not set; completion requests will fail until it is");
        }

        let config = Self {
            api_key,
            base_url: env_or("OPENAI_BASE_URL", DEFAULT_BASE_URL),
            default_model: env_or("OPENAI_DEFAULT_MODEL", DEFAULT_MODEL),
            database_path: env_or("DATABASE_PATH", DEFAULT_DATABASE_PATH),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
        };
        log::debug!(
            "Loaded config: base_url={}, default_model={}, database_path={}, port={}",
            config.base_url,
            config.default_model,
            config.database_path,
            config.port
        );
        config
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
