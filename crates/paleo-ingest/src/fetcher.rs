//! Occurrence retrieval with retry and per-taxon isolation
//!
//! Taxa are queried in bulk batches. A batch whose bulk request keeps
//! failing is re-queried one taxon at a time, so a single name the upstream
//! rejects costs only that taxon's records instead of the whole batch.
//!
//! Each batch runs a small state machine:
//!
//! ```text
//! Bulk{1} --fail--> Bulk{2} --fail--> ... Bulk{max} --fail--> Isolating --> Done
//!    |                 |                      |
//!    +------ok---------+----------ok----------+-------------------------> Done
//! ```

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::models::{RawOccurrenceRecord, Taxon};
use crate::rate::{Pause, RatePolicy};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Upstream occurrence search
#[async_trait]
pub trait OccurrenceSource: Send + Sync {
    /// All occurrences of the given taxa, in a single request
    async fn search(&self, taxa: &[Taxon]) -> Result<Vec<RawOccurrenceRecord>>;
}

#[derive(Debug, Deserialize)]
struct OccurrenceResponse {
    #[serde(default)]
    records: Vec<serde_json::Value>,
}

/// Paleobiology Database `occs/list.json` client
pub struct PbdbClient {
    client: Client,
    endpoint: String,
    show: String,
}

impl PbdbClient {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.fetch_timeout())
            .user_agent(config.user_agent())
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/occs/list.json",
                config.occurrence_api_url.trim_end_matches('/')
            ),
            show: config.show_fields.clone(),
        })
    }
}

#[async_trait]
impl OccurrenceSource for PbdbClient {
    async fn search(&self, taxa: &[Taxon]) -> Result<Vec<RawOccurrenceRecord>> {
        let base_name = taxa.join(",");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("base_name", base_name.as_str()),
                ("show", self.show.as_str()),
                ("limit", "all"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Status {
                url: self.endpoint.clone(),
                status,
            });
        }

        let body: OccurrenceResponse = response.json().await?;
        Ok(body.records.into_iter().map(RawOccurrenceRecord::from).collect())
    }
}

/// Position of one batch in the fetch state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Bulk request, 1-based attempt number
    Bulk { attempt: u32 },
    /// Querying each taxon on its own
    Isolating,
    Done,
}

impl BatchState {
    /// Transition after a bulk attempt
    pub fn after_bulk(attempt: u32, succeeded: bool, max_attempts: u32) -> Self {
        if succeeded {
            BatchState::Done
        } else if attempt < max_attempts {
            BatchState::Bulk {
                attempt: attempt + 1,
            }
        } else {
            BatchState::Isolating
        }
    }
}

/// Result of one fetch run
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<RawOccurrenceRecord>,
    /// Taxa dropped because their single-taxon request failed
    pub poisoned: Vec<Taxon>,
    pub batches: usize,
    pub isolated_batches: usize,
}

pub struct OccurrenceFetcher {
    source: Arc<dyn OccurrenceSource>,
    policy: Arc<dyn RatePolicy>,
    batch_size: usize,
    max_attempts: u32,
}

impl OccurrenceFetcher {
    pub fn new(
        source: Arc<dyn OccurrenceSource>,
        policy: Arc<dyn RatePolicy>,
        batch_size: usize,
        max_attempts: u32,
    ) -> Self {
        Self {
            source,
            policy,
            batch_size: batch_size.max(1),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(
        config: &IngestConfig,
        source: Arc<dyn OccurrenceSource>,
        policy: Arc<dyn RatePolicy>,
    ) -> Self {
        Self::new(source, policy, config.batch_size, config.max_attempts)
    }

    /// Fetch occurrences for `taxa`, batch by batch, in order
    pub async fn fetch(&self, taxa: &[Taxon]) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();
        let total = taxa.len().div_ceil(self.batch_size);

        for (index, batch) in taxa.chunks(self.batch_size).enumerate() {
            let span = info_span!("batch", number = index + 1, total, taxa = batch.len());
            self.run_batch(batch, &mut outcome).instrument(span).await;
            self.policy.pause(Pause::BetweenBatches).await;
        }

        info!(
            records = outcome.records.len(),
            batches = outcome.batches,
            isolated = outcome.isolated_batches,
            poisoned = outcome.poisoned.len(),
            "Raw occurrence download finished"
        );
        outcome
    }

    async fn run_batch(&self, batch: &[Taxon], outcome: &mut FetchOutcome) {
        let mut state = BatchState::Bulk { attempt: 1 };

        loop {
            state = match state {
                BatchState::Bulk { attempt } => self.bulk_attempt(batch, attempt, outcome).await,
                BatchState::Isolating => {
                    outcome.isolated_batches += 1;
                    self.isolate(batch, outcome).await;
                    BatchState::Done
                },
                BatchState::Done => break,
            };
        }

        outcome.batches += 1;
    }

    async fn bulk_attempt(
        &self,
        batch: &[Taxon],
        attempt: u32,
        outcome: &mut FetchOutcome,
    ) -> BatchState {
        debug!(attempt, "Requesting batch");
        let result = self.source.search(batch).await;
        let next = BatchState::after_bulk(attempt, result.is_ok(), self.max_attempts);

        match result {
            Ok(records) => {
                info!(attempt, records = records.len(), "Batch loaded");
                outcome.records.extend(records);
            },
            Err(e) => {
                warn!(attempt, max_attempts = self.max_attempts, error = %e, "Bulk request failed");
                match next {
                    BatchState::Bulk { .. } => self.policy.pause(Pause::RetryBackoff).await,
                    _ => error!("Batch failed on every attempt, isolating taxa one by one"),
                }
            },
        }

        next
    }

    async fn isolate(&self, batch: &[Taxon], outcome: &mut FetchOutcome) {
        for taxon in batch {
            match self.source.search(std::slice::from_ref(taxon)).await {
                Ok(records) => {
                    debug!(taxon = %taxon, records = records.len(), "Isolated taxon loaded");
                    outcome.records.extend(records);
                },
                Err(e) => {
                    warn!(taxon = %taxon, error = %e, "Poisoned taxon excluded from this run");
                    outcome.poisoned.push(taxon.clone());
                },
            }
            self.policy.pause(Pause::Isolation).await;
        }
    }
}
