//! The poll/compare/deploy loop.
//!
//! Each iteration loads the version record, finds the announcement channel,
//! reads its latest history page and deploys when the announced version
//! differs from the record. Failures before extraction are fatal; failures
//! after it are logged and the loop carries on.

use std::time::Duration;

use crate::deploy::{DeployOutcome, Deployer};
use crate::error::{SlackError, WatchError};
use crate::extract;
use crate::retry::{self, Backoff, RetryError};
use crate::shutdown::Shutdown;
use crate::slack::{Channel, Message, MessageSource};
use crate::store::{VersionRecord, VersionStore};

/// What to look for and how often.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub channel: String,
    pub author: String,
    pub interval: Duration,
    pub backoff: Backoff,
}

/// Result of one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// No announcement from the author in the latest history page.
    NotFound,
    /// The announced version is the one already recorded.
    Unchanged { version: String },
    /// A new version was announced and the deploy command was run.
    Deployed {
        version: String,
        /// Whether the record was written. A failed write still deploys.
        persisted: bool,
        outcome: DeployOutcome,
    },
}

/// How a run ended without a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stopped {
    /// A signal was observed; carries its name.
    Signal(&'static str),
    /// A single iteration was requested and has finished.
    Once(IterationOutcome),
}

pub struct Watcher<S, V, D> {
    source: S,
    store: V,
    deployer: D,
    config: WatchConfig,
    shutdown: Shutdown,
}

impl<S, V, D> Watcher<S, V, D>
where
    S: MessageSource,
    V: VersionStore,
    D: Deployer,
{
    pub fn new(source: S, store: V, deployer: D, config: WatchConfig, shutdown: Shutdown) -> Self {
        Self {
            source,
            store,
            deployer,
            config,
            shutdown,
        }
    }

    pub fn store(&self) -> &V {
        &self.store
    }

    pub fn deployer(&self) -> &D {
        &self.deployer
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Poll until a signal arrives or a fatal error occurs.
    pub async fn run(&mut self) -> Result<Stopped, WatchError> {
        tracing::info!(
            channel = %self.config.channel,
            author = %self.config.author,
            interval_secs = self.config.interval.as_secs(),
            "Watching for DUBBD releases"
        );
        loop {
            let stop = match self.iterate().await {
                Ok(_) => {
                    tracing::debug!(secs = self.config.interval.as_secs(), "Sleeping until next poll");
                    self.shutdown.sleep(self.config.interval).await
                }
                Err(Interrupted::Signal(reason)) => Some(reason),
                Err(Interrupted::Fatal(e)) => return Err(e),
            };
            if let Some(reason) = stop {
                tracing::info!(signal = reason, "Received signal. Exiting...");
                return Ok(Stopped::Signal(reason));
            }
        }
    }

    /// Run a single iteration and stop.
    pub async fn run_once(&mut self) -> Result<Stopped, WatchError> {
        match self.iterate().await {
            Ok(outcome) => Ok(Stopped::Once(outcome)),
            Err(Interrupted::Signal(reason)) => Ok(Stopped::Signal(reason)),
            Err(Interrupted::Fatal(e)) => Err(e),
        }
    }

    /// One read/resolve/fetch/extract/act pass.
    async fn iterate(&mut self) -> Result<IterationOutcome, Interrupted> {
        let current = self.store.load().await.map_err(WatchError::StateRead)?;

        let channel_id = self.resolve_channel().await?;
        let messages = self.fetch_history(&channel_id).await?;

        let Some(found) = extract::first_announcement(&messages, &self.config.author) else {
            tracing::info!(
                author = %self.config.author,
                scanned = messages.len(),
                "Version not found in user's messages"
            );
            return Ok(IterationOutcome::NotFound);
        };

        let version = found.version;
        tracing::info!(
            %version,
            posted_at = found.message.posted_at().as_deref().unwrap_or("unknown"),
            "Extracted version"
        );

        if current.as_ref().map(VersionRecord::as_str) == Some(version.as_str()) {
            tracing::info!(%version, "No new version found");
            return Ok(IterationOutcome::Unchanged { version });
        }

        tracing::info!(
            previous = current.as_ref().map(VersionRecord::as_str).unwrap_or("none"),
            %version,
            "New version detected"
        );

        let persisted = match self.store.save(&VersionRecord::new(&version)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Error writing the latest version to file");
                false
            }
        };

        let outcome = self.deployer.deploy(&version).await;
        match &outcome {
            DeployOutcome::Succeeded => tracing::info!(%version, "Deploy finished"),
            DeployOutcome::Failed { code } => {
                tracing::error!(%version, exit_code = ?code, "Deploy command failed")
            }
            DeployOutcome::LaunchFailed { reason } => {
                tracing::error!(%version, %reason, "Error running the deploy command")
            }
        }

        Ok(IterationOutcome::Deployed {
            version,
            persisted,
            outcome,
        })
    }

    async fn resolve_channel(&mut self) -> Result<String, Interrupted> {
        let source = &self.source;
        let channels: Vec<Channel> = retry::retry(
            &self.config.backoff,
            &mut self.shutdown,
            "Listing channels",
            SlackError::is_transient,
            || source.list_channels(),
        )
        .await
        .map_err(|e| Interrupted::from_retry(e, WatchError::ListChannels))?;

        channels
            .into_iter()
            .find(|c| !c.is_archived && c.name == self.config.channel)
            .map(|c| c.id)
            .ok_or_else(|| WatchError::ChannelNotFound(self.config.channel.clone()).into())
    }

    async fn fetch_history(&mut self, channel_id: &str) -> Result<Vec<Message>, Interrupted> {
        let source = &self.source;
        retry::retry(
            &self.config.backoff,
            &mut self.shutdown,
            "Fetching conversation history",
            SlackError::is_transient,
            || source.channel_history(channel_id),
        )
        .await
        .map_err(|e| Interrupted::from_retry(e, WatchError::FetchHistory))
    }
}

/// Why an iteration ended early.
enum Interrupted {
    Fatal(WatchError),
    Signal(&'static str),
}

impl Interrupted {
    fn from_retry(e: RetryError<SlackError>, wrap: fn(SlackError) -> WatchError) -> Self {
        match e {
            RetryError::Failed(e) => Interrupted::Fatal(wrap(e)),
            RetryError::Cancelled(reason) => Interrupted::Signal(reason),
        }
    }
}

impl From<WatchError> for Interrupted {
    fn from(e: WatchError) -> Self {
        Interrupted::Fatal(e)
    }
}
