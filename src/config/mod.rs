//! Process configuration, read from the environment once at startup.
//!
//! The resulting `Config` is immutable for the process lifetime and is
//! passed explicitly into the origin gate, token issuer, and provider
//! constructors. Nothing reads the environment after startup.

use std::path::PathBuf;

/// Fallback signing secret for development. `main` warns loudly when the
/// process is running with it.
pub const DEV_SECRET: &str = "change_this_secret";

const DEFAULT_FRONTEND_ORIGIN: &str = "http://localhost:8080";
const DEFAULT_DATABASE_DIR: &str = "/app/data";

/// Immutable process-wide configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The sole allowed request origin, matched by exact string equality.
    pub frontend_origin: String,
    /// Secret for signing and verifying session tokens.
    pub secret_key: String,
    /// API key for the research provider; absent means the echo fallback.
    pub openai_api_key: Option<String>,
    /// Directory holding the SQLite database file.
    pub database_dir: PathBuf,
}

impl Config {
    /// Build the configuration from environment variables, falling back to
    /// development defaults.
    pub fn from_env() -> Self {
        Self {
            frontend_origin: env_trimmed("FRONTEND_ORIGIN")
                .unwrap_or_else(|| DEFAULT_FRONTEND_ORIGIN.to_string()),
            secret_key: env_trimmed("SECRET_KEY").unwrap_or_else(|| DEV_SECRET.to_string()),
            openai_api_key: env_trimmed("OPENAI_API_KEY"),
            database_dir: env_trimmed("DATABASE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_DIR)),
        }
    }

    /// True when the process is running with the built-in development secret.
    pub fn uses_dev_secret(&self) -> bool {
        self.secret_key == DEV_SECRET
    }
}

fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
