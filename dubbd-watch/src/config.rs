//! Watcher configuration.
//!
//! Settings come from CLI flags (with env fallbacks), then an optional TOML
//! file passed via `--config`, then built-in defaults. The Slack token is
//! only read from the flag or `SLACK_API_TOKEN`, never from the file.
//!
//! Example file:
//!
//! ```toml
//! channel = "public-uds"
//! author = "uds-new-release"
//! state_file = "/var/lib/dubbd-watch/latest_version.txt"
//! interval_secs = 14400
//! deploy_command = "zarf package deploy oci://ghcr.io/defenseunicorns/packages/dubbd-k3d:{version}-amd64 --oci-concurrency=15 --confirm"
//! ```

use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::deploy::DEFAULT_DEPLOY_COMMAND;
use crate::error::ConfigError;
use crate::retry::Backoff;
use crate::slack::DEFAULT_API_BASE;

/// Channel whose history is scanned for announcements.
pub const DEFAULT_CHANNEL: &str = "public-uds";
/// Author of the release announcements.
pub const DEFAULT_AUTHOR: &str = "uds-new-release";
/// Where the last deployed version is kept.
pub const DEFAULT_STATE_FILE: &str = "latest_version.txt";
/// Time between polls (4 hours).
pub const DEFAULT_INTERVAL_SECS: u64 = 4 * 60 * 60;

#[derive(Parser, Debug, Default)]
#[command(
    name = "dubbd-watch",
    about = "Watch Slack for DUBBD release announcements and deploy them with zarf"
)]
pub struct Args {
    /// Slack API token
    #[arg(long, env = "SLACK_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// TOML settings file
    #[arg(long, env = "DUBBD_WATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Channel name to watch [default: public-uds]
    #[arg(long)]
    pub channel: Option<String>,

    /// Announcement author (user id, username or bot name) [default: uds-new-release]
    #[arg(long)]
    pub author: Option<String>,

    /// Version record file [default: latest_version.txt]
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Seconds between polls [default: 14400]
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Slack Web API base URL
    #[arg(long)]
    pub api_base: Option<String>,

    /// Number of history messages to request (Slack's default if unset)
    #[arg(long)]
    pub history_limit: Option<u32>,

    /// Deploy command template; `{version}` is replaced with the new version
    #[arg(long)]
    pub deploy_command: Option<String>,

    /// Attempts per Slack call before giving up [default: 5]
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Run a single check and exit
    #[arg(long)]
    pub once: bool,

    /// Log the deploy command instead of running it
    #[arg(long)]
    pub dry_run: bool,
}

/// Optional on-disk settings. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub channel: Option<String>,
    pub author: Option<String>,
    pub state_file: Option<PathBuf>,
    pub interval_secs: Option<u64>,
    pub api_base: Option<String>,
    pub history_limit: Option<u32>,
    pub deploy_command: Option<String>,
    pub max_attempts: Option<u32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|error| ConfigError::ReadFile {
            path: path.to_path_buf(),
            error,
        })?;
        toml::from_str(&text).map_err(|error| ConfigError::ParseFile {
            path: path.to_path_buf(),
            error,
        })
    }
}

/// Fully resolved settings for one watcher process.
#[derive(Debug, Clone)]
pub struct Settings {
    pub token: String,
    pub channel: String,
    pub author: String,
    pub state_file: PathBuf,
    pub interval: Duration,
    pub api_base: String,
    pub history_limit: Option<u32>,
    pub deploy_command: String,
    pub backoff: Backoff,
    pub once: bool,
    pub dry_run: bool,
}

impl Settings {
    /// Resolve from parsed args, reading `--config` if given.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    /// Flags win over the file, the file wins over defaults.
    pub fn merge(args: Args, file: FileConfig) -> Result<Self, ConfigError> {
        let token = args
            .token
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingToken)?;

        let interval_secs = args
            .interval_secs
            .or(file.interval_secs)
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        if interval_secs == 0 {
            return Err(ConfigError::Invalid("interval_secs must be greater than 0".into()));
        }

        let max_attempts = args.max_attempts.or(file.max_attempts).unwrap_or(5);
        if max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }

        let channel = args
            .channel
            .or(file.channel)
            .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
        let channel = channel.trim_start_matches('#').to_string();
        if channel.is_empty() {
            return Err(ConfigError::Invalid("channel must not be empty".into()));
        }

        let deploy_command = args
            .deploy_command
            .or(file.deploy_command)
            .unwrap_or_else(|| DEFAULT_DEPLOY_COMMAND.to_string());
        if !deploy_command.contains("{version}") {
            tracing::warn!(%deploy_command, "Deploy command has no {{version}} placeholder");
        }

        Ok(Self {
            token,
            channel,
            author: args
                .author
                .or(file.author)
                .unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
            state_file: args
                .state_file
                .or(file.state_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
            interval: Duration::from_secs(interval_secs),
            api_base: args
                .api_base
                .or(file.api_base)
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            history_limit: args.history_limit.or(file.history_limit),
            deploy_command,
            backoff: Backoff {
                max_attempts,
                ..Backoff::default()
            },
            once: args.once,
            dry_run: args.dry_run,
        })
    }
}
