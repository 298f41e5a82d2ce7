//! Error types for the watcher and its collaborators.

use std::path::PathBuf;

/// Errors from the Slack Web API client.
#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Slack returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Slack API error: {0}")]
    Api(String),
}

impl SlackError {
    /// Whether the call is worth repeating after a backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            SlackError::Transport(_) => true,
            SlackError::Status { status, .. } => *status == 429 || *status >= 500,
            SlackError::Api(code) => matches!(
                code.as_str(),
                "ratelimited"
                    | "internal_error"
                    | "fatal_error"
                    | "service_unavailable"
                    | "request_timeout"
            ),
        }
    }
}

/// Errors from a [`crate::store::VersionStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {}: {error}", path.display())]
    Read {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("failed to write {}: {error}", path.display())]
    Write {
        path: PathBuf,
        error: std::io::Error,
    },
}

/// Problems resolving configuration at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SLACK_API_TOKEN environment variable is not set. Please set it before running the program.")]
    MissingToken,
    #[error("failed to read config file {}: {error}", path.display())]
    ReadFile {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("invalid config file {}: {error}", path.display())]
    ParseFile {
        path: PathBuf,
        error: toml::de::Error,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Fatal errors that stop the watch loop.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("error reading the latest version: {0}")]
    StateRead(StoreError),
    #[error("error fetching channels: {0}")]
    ListChannels(SlackError),
    #[error("channel '{0}' not found")]
    ChannelNotFound(String),
    #[error("error fetching conversation history: {0}")]
    FetchHistory(SlackError),
}
