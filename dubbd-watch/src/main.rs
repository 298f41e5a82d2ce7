//! dubbd-watch: polls Slack for DUBBD release announcements and deploys
//! each new version with zarf.
//!
//! Requires SLACK_API_TOKEN. Exits 0 on SIGINT/SIGTERM (or after `--once`),
//! 1 on any fatal error.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use clap::error::ErrorKind;
use tracing_subscriber::EnvFilter;

use dubbd_watch::config::{Args, Settings};
use dubbd_watch::deploy::ShellDeployer;
use dubbd_watch::shutdown;
use dubbd_watch::slack::SlackClient;
use dubbd_watch::store::FileStore;
use dubbd_watch::watcher::{Stopped, WatchConfig, Watcher};

#[tokio::main]
async fn main() -> ExitCode {
    // JSON logs for log shippers (DUBBD_WATCH_LOG_JSON=1), human-readable otherwise
    let json_logs = std::env::var("DUBBD_WATCH_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "dubbd_watch=info".into());
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Usage errors exit 1 like every other startup failure; help and version exit 0
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let settings = Settings::from_args(args)?;
    let shutdown = shutdown::listen_for_signals().context("Failed to install signal handlers")?;

    let source = SlackClient::new(settings.token.clone())
        .context("Failed to build Slack HTTP client")?
        .with_api_base(&settings.api_base)
        .with_history_limit(settings.history_limit);
    let store = FileStore::new(&settings.state_file);
    let deployer = ShellDeployer::new(&settings.deploy_command).dry_run(settings.dry_run);

    tracing::info!(
        channel = %settings.channel,
        state_file = %settings.state_file.display(),
        dry_run = settings.dry_run,
        "Starting dubbd-watch"
    );

    let mut watcher = Watcher::new(
        source,
        store,
        deployer,
        WatchConfig {
            channel: settings.channel.clone(),
            author: settings.author.clone(),
            interval: settings.interval,
            backoff: settings.backoff.clone(),
        },
        shutdown,
    );

    let stopped = if settings.once {
        watcher.run_once().await?
    } else {
        watcher.run().await?
    };

    match stopped {
        Stopped::Signal(signal) => tracing::info!(signal, "Shut down"),
        Stopped::Once(outcome) => tracing::info!(?outcome, "Single check complete"),
    }
    Ok(())
}
