//! Per-feed polling scheduler.
//!
//! Spawns one independent task per enabled feed so a slow fetch on one
//! feed never delays another's schedule. Tasks are supervised: a poller
//! that dies outside of shutdown is restarted.

pub mod poller;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::app::{Result, WatchContext};
use crate::config::Config;

pub use poller::FeedPoller;

pub struct Watcher {
    config: Arc<Config>,
    ctx: Arc<WatchContext>,
}

impl Watcher {
    pub fn new(config: Config, ctx: Arc<WatchContext>) -> Self {
        Self {
            config: Arc::new(config),
            ctx,
        }
    }

    /// Run until the shutdown signal flips. Poller construction happens
    /// up front so a bad filter aborts startup instead of a running task.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut handles = Vec::new();

        for feed in self.config.feeds.iter().filter(|f| f.enabled) {
            let poller = FeedPoller::new(
                Arc::new(feed.clone()),
                &self.config.defaults,
                self.ctx.clone(),
            )?;
            let interval = Duration::from_secs(feed.interval_secs(&self.config.defaults));

            handles.push(tokio::spawn(supervise(poller, interval, shutdown.clone())));
            tracing::info!("Started watching feed: {}", feed.name);
        }

        if handles.is_empty() {
            tracing::warn!("No enabled feeds; nothing to watch");
            return Ok(());
        }

        tracing::info!("Watching {} active feed(s)", handles.len());

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Supervisor task failed: {}", e);
            }
        }

        Ok(())
    }
}

/// Keep one feed's poll loop alive: a loop that exits cleanly means
/// shutdown; anything else (a panic) is logged and the loop restarted.
async fn supervise(poller: FeedPoller, interval: Duration, shutdown: watch::Receiver<bool>) {
    let poller = Arc::new(poller);

    loop {
        let handle = tokio::spawn(poll_loop(poller.clone(), interval, shutdown.clone()));

        match handle.await {
            Ok(()) => break,
            Err(e) => {
                if *shutdown.borrow() {
                    break;
                }
                tracing::error!(
                    "Poller for '{}' terminated unexpectedly: {}; restarting",
                    poller.feed_name(),
                    e
                );
            }
        }
    }
}

async fn poll_loop(poller: Arc<FeedPoller>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        // Errors are contained to this cycle; the schedule is unaffected.
        if let Err(e) = poller.check().await {
            tracing::error!("Error checking feed '{}': {}", poller.feed_name(), e);
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {}
        }
    }
}
