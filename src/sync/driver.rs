//! Sync Driver
//!
//! Caller-side loop around a [`SeriesSynchronizer`]. The synchronizer never
//! retries on its own; the driver owns the mode and the retry policy:
//!
//! - **push**: subscribe first, then bulk load, then follow the stream;
//!   when the subscription breaks, back off and start over
//! - **poll**: refresh on a fixed interval; the interval is the retry cadence

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::synchronizer::{SeriesSynchronizer, SyncMode};
use super::SyncError;

/// Backoff between push-mode reconnect attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for the delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt number `failures` (1-based): doubles each time,
    /// capped at `max_delay`
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Runs a synchronizer in the background until it is torn down
pub struct SyncDriver {
    sync: Arc<SeriesSynchronizer>,
    policy: RetryPolicy,
}

impl SyncDriver {
    pub fn new(sync: Arc<SeriesSynchronizer>, policy: RetryPolicy) -> Self {
        Self { sync, policy }
    }

    /// Spawn the driver loop
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drive the synchronizer until teardown
    pub async fn run(self) {
        match self.sync.config().mode {
            SyncMode::Push => self.run_push().await,
            SyncMode::Poll { interval } => self.run_poll(interval).await,
        }
        tracing::debug!("Sync driver stopped");
    }

    async fn run_push(&self) {
        let mut failures: u32 = 0;

        tracing::info!(
            source = self.sync.source_name(),
            table = %self.sync.config().table,
            limit = self.sync.config().limit,
            "Starting push sync"
        );

        loop {
            if self.sync.is_closed() {
                break;
            }

            // Subscribe before the bulk load so inserts in between are queued
            let forward = match self.sync.subscribe().await {
                Ok(handle) => handle,
                Err(SyncError::Closed) => break,
                Err(e) => {
                    failures += 1;
                    tracing::warn!(error = %e, failures, "Subscription failed");
                    if !self.backoff(failures).await {
                        break;
                    }
                    continue;
                }
            };

            match self.sync.initialize().await {
                Ok(outcome) => {
                    failures = 0;
                    tracing::debug!(?outcome, "Initial load complete");
                }
                Err(SyncError::Closed) => break,
                Err(e) => {
                    failures += 1;
                    tracing::warn!(error = %e, failures, "Initial load failed");
                    // The next subscribe replaces this subscription
                    if !self.backoff(failures).await {
                        break;
                    }
                    continue;
                }
            }

            // Runs until the subscription fails or the synchronizer closes
            if let Err(e) = forward.await {
                tracing::error!(error = %e, "Subscription task panicked");
            }

            if self.sync.is_closed() {
                break;
            }

            failures += 1;
            if !self.backoff(failures).await {
                break;
            }
        }
    }

    async fn run_poll(&self, interval: Duration) {
        tracing::info!(
            source = self.sync.source_name(),
            table = %self.sync.config().table,
            interval_ms = interval.as_millis() as u64,
            "Starting poll sync"
        );

        let shutdown = self.sync.shutdown_token();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.sync.refresh().await {
                        Ok(outcome) => tracing::trace!(?outcome, "Poll tick"),
                        Err(SyncError::Closed) => break,
                        Err(e) => tracing::warn!(error = %e, "Poll refresh failed"),
                    }
                }
            }
        }
    }

    /// Sleep before the next attempt; false if the synchronizer closed meanwhile
    async fn backoff(&self, failures: u32) -> bool {
        let delay = self.policy.delay(failures);
        tracing::info!(delay_ms = delay.as_millis() as u64, "Retrying sync");

        let shutdown = self.sync.shutdown_token();
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
