//! dubbd-watch: deploys DUBBD releases as soon as they are announced in Slack.
//!
//! The watcher polls a channel's history, pulls the version out of the
//! newest `DUBBD vX.Y.Z` announcement, compares it with the last version it
//! deployed and runs `zarf package deploy` when they differ.

pub mod config;
pub mod deploy;
pub mod error;
pub mod extract;
pub mod retry;
pub mod shutdown;
pub mod slack;
pub mod store;
pub mod watcher;
