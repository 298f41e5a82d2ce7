//! Graceful shutdown on SIGINT/SIGTERM.
//!
//! A listener task flips a watch channel when a signal arrives. The watch
//! loop holds a [`Shutdown`] and races its waits against it, so a signal
//! ends the process within milliseconds instead of after the poll interval.
//! In-flight Slack calls and deploys are never interrupted.

use std::time::Duration;
use tokio::sync::watch;

/// Receiving side, cloned into anything that waits.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<Option<&'static str>>,
}

/// Sending side. Held by the signal listener (or a test).
pub struct ShutdownTrigger {
    tx: watch::Sender<Option<&'static str>>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(None);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    /// Record that `reason` asked us to stop. Later triggers are ignored.
    pub fn trigger(&self, reason: &'static str) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }
}

impl Shutdown {
    /// Non-blocking check. Returns the signal name if one arrived.
    pub fn requested(&self) -> Option<&'static str> {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested. Never resolves if the trigger
    /// is dropped without firing.
    pub async fn wait(&mut self) -> &'static str {
        let seen = self.rx.wait_for(Option::is_some).await.map(|r| *r);
        match seen {
            Ok(reason) => reason.unwrap_or("shutdown"),
            Err(_) => std::future::pending().await,
        }
    }

    /// Sleep for `duration` unless shutdown comes first.
    /// Returns the signal name when interrupted.
    pub async fn sleep(&mut self, duration: Duration) -> Option<&'static str> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            reason = self.wait() => return Some(reason),
        }
        self.requested()
    }
}

/// Install SIGINT/SIGTERM handlers and return the handle that observes them.
#[cfg(unix)]
pub fn listen_for_signals() -> std::io::Result<Shutdown> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let (trigger, shutdown) = channel();

    tokio::spawn(async move {
        let reason = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        };
        tracing::info!(signal = reason, "Received signal");
        trigger.trigger(reason);
        // Keep the sender alive so receivers see the value, not a closed channel.
        std::future::pending::<()>().await;
    });

    Ok(shutdown)
}

#[cfg(not(unix))]
pub fn listen_for_signals() -> std::io::Result<Shutdown> {
    let (trigger, shutdown) = channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(signal = "ctrl-c", "Received signal");
            trigger.trigger("ctrl-c");
        }
        std::future::pending::<()>().await;
    });
    Ok(shutdown)
}
