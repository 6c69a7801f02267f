//! Client configuration loaded from environment variables.
//!
//! Every setting has a default, so a client starts with zero
//! configuration.

use std::path::PathBuf;
use std::time::Duration;

use tandem_shared::constants::{
    DEFAULT_REFRESH_WINDOW_MS, FALLBACK_DISPLAY_NAME, MAX_MESSAGE_CHARS,
};
use tandem_store::{Database, StoreError};

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// SQLite database file.
    /// Env: `TANDEM_DB_PATH`
    /// Default: none (the platform data directory).
    pub database_path: Option<PathBuf>,

    /// Longest accepted message body, in characters, after trimming.
    /// Env: `TANDEM_MAX_MESSAGE_CHARS`
    /// Default: `500`
    pub max_message_chars: usize,

    /// How long a directory refresh listens before returning.
    /// Env: `TANDEM_REFRESH_WINDOW_MS`
    /// Default: `1000`
    pub refresh_window: Duration,

    /// Name stamped on messages when a participant has neither a display
    /// name nor an email.
    /// Env: `TANDEM_FALLBACK_NAME`
    /// Default: `"Unknown"`
    pub fallback_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_message_chars: MAX_MESSAGE_CHARS,
            refresh_window: Duration::from_millis(DEFAULT_REFRESH_WINDOW_MS),
            fallback_name: FALLBACK_DISPLAY_NAME.to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("TANDEM_DB_PATH").filter(|p| !p.is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Some(val) = lookup("TANDEM_MAX_MESSAGE_CHARS") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_message_chars = n,
                _ => tracing::warn!(
                    value = %val,
                    "Invalid TANDEM_MAX_MESSAGE_CHARS, using default"
                ),
            }
        }

        if let Some(val) = lookup("TANDEM_REFRESH_WINDOW_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.refresh_window = Duration::from_millis(ms);
            } else {
                tracing::warn!(
                    value = %val,
                    "Invalid TANDEM_REFRESH_WINDOW_MS, using default"
                );
            }
        }

        if let Some(name) = lookup("TANDEM_FALLBACK_NAME") {
            if !name.trim().is_empty() {
                config.fallback_name = name;
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }

    /// Open the configured SQLite database, or the default one.
    pub fn open_database(&self) -> Result<Database, StoreError> {
        match &self.database_path {
            Some(path) => Database::open_at(path),
            None => Database::new(),
        }
    }
}
