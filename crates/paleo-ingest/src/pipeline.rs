//! Pipeline orchestration
//!
//! cache check → catalog → fetch → normalize → cache write

use crate::cache::ResultCache;
use crate::catalog::{build_taxon_list, GitHubCatalog, TaxonCatalog};
use crate::config::IngestConfig;
use crate::error::Result;
use crate::fetcher::{OccurrenceFetcher, OccurrenceSource, PbdbClient};
use crate::models::{Dataset, Taxon};
use crate::normalizer::RecordNormalizer;
use crate::rate::{FixedDelays, RatePolicy};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use url::Url;

/// Counters from one uncached run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub assets: usize,
    pub taxa: usize,
    pub raw_records: usize,
    pub points: usize,
    pub poisoned: Vec<Taxon>,
}

pub struct IngestionPipeline {
    catalog: Arc<dyn TaxonCatalog>,
    fetcher: OccurrenceFetcher,
    cache: ResultCache,
    supplementary_taxa: Vec<Taxon>,
    image_base: Url,
    /// Serializes cache-miss runs within the process
    run_lock: Mutex<()>,
}

impl IngestionPipeline {
    /// Pipeline wired to GitHub and the Paleobiology Database
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let catalog = Arc::new(GitHubCatalog::new(config)?);
        let source = Arc::new(PbdbClient::new(config)?);
        let policy = Arc::new(FixedDelays::from_config(config));
        Self::with_components(config, catalog, source, policy)
    }

    pub fn with_components(
        config: &IngestConfig,
        catalog: Arc<dyn TaxonCatalog>,
        source: Arc<dyn OccurrenceSource>,
        policy: Arc<dyn RatePolicy>,
    ) -> Result<Self> {
        config.validate()?;
        let cache = ResultCache::new(&config.cache_path, config.cache_max_age());
        Self::with_cache(config, catalog, source, policy, cache)
    }

    pub fn with_cache(
        config: &IngestConfig,
        catalog: Arc<dyn TaxonCatalog>,
        source: Arc<dyn OccurrenceSource>,
        policy: Arc<dyn RatePolicy>,
        cache: ResultCache,
    ) -> Result<Self> {
        Ok(Self {
            catalog,
            fetcher: OccurrenceFetcher::from_config(config, source, policy),
            cache,
            supplementary_taxa: config.supplementary_taxa.clone(),
            image_base: config.image_base_url()?,
            run_lock: Mutex::new(()),
        })
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Dataset for the map front end.
    ///
    /// Serves the cache while it is valid, otherwise rebuilds and re-caches.
    /// Never fails: upstream trouble shows up as a smaller, possibly empty,
    /// dataset.
    pub async fn get_dataset(&self) -> Dataset {
        let _guard = self.run_lock.lock().await;

        if let Some(dataset) = self.cache.load_valid(Utc::now()).await {
            return dataset;
        }

        info!("Cache miss, rebuilding dataset from upstream");
        self.rebuild().await.0
    }

    /// Rebuild and re-cache regardless of the current artifact
    pub async fn refresh(&self) -> (Dataset, RunStats) {
        let _guard = self.run_lock.lock().await;
        self.rebuild().await
    }

    /// Catalog asset names merged with the supplementary taxa
    pub async fn taxon_list(&self) -> Vec<Taxon> {
        let assets = self.catalog.asset_names().await;
        build_taxon_list(&assets, &self.supplementary_taxa)
    }

    #[instrument(skip(self))]
    async fn rebuild(&self) -> (Dataset, RunStats) {
        let assets = self.catalog.asset_names().await;
        let taxa = build_taxon_list(&assets, &self.supplementary_taxa);
        info!(assets = assets.len(), taxa = taxa.len(), "Unique taxa to query");

        let fetched = self.fetcher.fetch(&taxa).await;

        let normalizer = RecordNormalizer::new(&assets, &self.image_base);
        let points = normalizer.normalize(&fetched.records);

        let stats = RunStats {
            assets: assets.len(),
            taxa: taxa.len(),
            raw_records: fetched.records.len(),
            points: points.len(),
            poisoned: fetched.poisoned,
        };
        info!(
            raw_records = stats.raw_records,
            points = stats.points,
            poisoned = stats.poisoned.len(),
            "Dataset rebuilt"
        );

        let envelope = self.cache.envelope(Dataset::new(points), Utc::now());
        if let Err(e) = self.cache.write(&envelope).await {
            warn!(path = %self.cache.path().display(), error = %e, "Could not write cache, serving uncached result");
        }

        (envelope.into_dataset(), stats)
    }
}
