//! Pacing between upstream requests
//!
//! The fetcher never sleeps directly; it asks a [`RatePolicy`] to pause.
//! Production uses [`FixedDelays`], tests use [`NoDelay`].

use crate::config::IngestConfig;
use async_trait::async_trait;
use std::time::Duration;

/// Point in the fetch loop where a pause is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// Between two attempts of the same bulk request
    RetryBackoff,
    /// After each single-taxon request in isolation mode
    Isolation,
    /// After a batch has been fully processed
    BetweenBatches,
}

#[async_trait]
pub trait RatePolicy: Send + Sync {
    async fn pause(&self, pause: Pause);
}

/// Fixed sleeps per pause kind
#[derive(Debug, Clone)]
pub struct FixedDelays {
    pub retry_backoff: Duration,
    pub isolation: Duration,
    pub between_batches: Duration,
}

impl FixedDelays {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            retry_backoff: Duration::from_millis(config.retry_delay_ms),
            isolation: Duration::from_millis(config.isolation_delay_ms),
            between_batches: Duration::from_millis(config.batch_delay_ms),
        }
    }

    pub fn delay_for(&self, pause: Pause) -> Duration {
        match pause {
            Pause::RetryBackoff => self.retry_backoff,
            Pause::Isolation => self.isolation,
            Pause::BetweenBatches => self.between_batches,
        }
    }
}

#[async_trait]
impl RatePolicy for FixedDelays {
    async fn pause(&self, pause: Pause) {
        let delay = self.delay_for(pause);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Never waits
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl RatePolicy for NoDelay {
    async fn pause(&self, _pause: Pause) {}
}
