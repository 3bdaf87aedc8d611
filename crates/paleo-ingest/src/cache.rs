//! File-backed cache of the last successful pipeline run
//!
//! The artifact is the served JSON payload plus two validity keys:
//!
//! ```json
//! {
//!   "logic_version": "pipeline-1/stages-1",
//!   "stored_at": "2026-10-16T12:00:00Z",
//!   "dados_processados": [ ... ]
//! }
//! ```
//!
//! A cached payload is reused only while it is younger than the freshness
//! window and was produced by the same [`logic_version`].

use crate::error::Result;
use crate::models::{Dataset, OccurrencePoint};
use crate::period;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Bump whenever fetch or normalization output changes shape or meaning
pub const PIPELINE_REVISION: u32 = 1;

/// Tag identifying the logic that produced a cache artifact.
///
/// Includes the stage table version, so editing the table also invalidates
/// cached payloads.
pub fn logic_version() -> String {
    format!(
        "pipeline-{}/stages-{}",
        PIPELINE_REVISION,
        period::table_version()
    )
}

/// Persisted snapshot of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    pub logic_version: String,
    pub stored_at: DateTime<Utc>,
    #[serde(rename = "dados_processados")]
    pub points: Vec<OccurrencePoint>,
}

impl CacheEnvelope {
    pub fn into_dataset(self) -> Dataset {
        Dataset::new(self.points)
    }
}

/// Why a cache artifact can or cannot be served
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    Fresh,
    Expired { age: Duration },
    LogicChanged { found: String, expected: String },
}

pub struct ResultCache {
    path: PathBuf,
    max_age: Duration,
    logic_version: String,
}

impl ResultCache {
    pub fn new(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self::with_logic_version(path, max_age, logic_version())
    }

    pub fn with_logic_version(
        path: impl Into<PathBuf>,
        max_age: Duration,
        logic_version: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            max_age,
            logic_version: logic_version.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wrap a freshly computed dataset for storage
    pub fn envelope(&self, dataset: Dataset, now: DateTime<Utc>) -> CacheEnvelope {
        CacheEnvelope {
            logic_version: self.logic_version.clone(),
            stored_at: now,
            points: dataset.points,
        }
    }

    /// Read the artifact. Missing, unreadable and unparsable files are all
    /// reported as `None`.
    pub async fn read(&self) -> Option<CacheEnvelope> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No cache artifact");
                return None;
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not read cache artifact");
                return None;
            },
        };

        match serde_json::from_slice(&bytes) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not parse cache artifact");
                None
            },
        }
    }

    /// Replace the artifact.
    ///
    /// The payload is written to a sibling temporary file and renamed into
    /// place, so a concurrent reader sees either the old or the new artifact.
    pub async fn write(&self, envelope: &CacheEnvelope) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(envelope)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                warn!(path = %tmp.display(), error = %cleanup, "Could not remove temporary cache file");
            }
            return Err(e.into());
        }

        info!(
            path = %self.path.display(),
            points = envelope.points.len(),
            "Cache artifact written"
        );
        Ok(())
    }

    pub fn check(&self, envelope: &CacheEnvelope, now: DateTime<Utc>) -> CacheStatus {
        if envelope.logic_version != self.logic_version {
            return CacheStatus::LogicChanged {
                found: envelope.logic_version.clone(),
                expected: self.logic_version.clone(),
            };
        }

        let age = now.signed_duration_since(envelope.stored_at);
        if age >= self.max_age {
            return CacheStatus::Expired { age };
        }

        CacheStatus::Fresh
    }

    /// The cached dataset, if an artifact exists and is still valid at `now`
    pub async fn load_valid(&self, now: DateTime<Utc>) -> Option<Dataset> {
        let envelope = self.read().await?;

        match self.check(&envelope, now) {
            CacheStatus::Fresh => {
                info!(points = envelope.points.len(), stored_at = %envelope.stored_at, "Cache hit");
                Some(envelope.into_dataset())
            },
            CacheStatus::Expired { age } => {
                info!(age_hours = age.num_hours(), "Cache expired");
                None
            },
            CacheStatus::LogicChanged { found, expected } => {
                info!(found = %found, expected = %expected, "Cache produced by different pipeline logic");
                None
            },
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "paleo_cache.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::period::PeriodBucket;
    use serde_json::json;
    use tempfile::TempDir;

    const VERSION: &str = "pipeline-test";

    fn sample_dataset() -> Dataset {
        Dataset::new(vec![OccurrencePoint {
            genus: "Eoraptor lunensis".into(),
            species: "lunensis".into(),
            family: "Não definido".into(),
            formation: "Ischigualasto".into(),
            lat: -30.1,
            lng: -67.9,
            early_age: json!(231.4),
            late_age: json!("221.5"),
            period: PeriodBucket::Triassico,
            image: "https://example.org/Eoraptor.jpg".into(),
        }])
    }

    fn cache_in(dir: &TempDir) -> ResultCache {
        ResultCache::with_logic_version(dir.path().join("paleo_cache.json"), Duration::hours(24), VERSION)
    }

    #[tokio::test]
    async fn test_expired_artifact_is_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let now = Utc::now();

        let envelope = cache.envelope(sample_dataset(), now - Duration::hours(25));
        cache.write(&envelope).await.unwrap();

        let stored = cache.read().await.unwrap();
        assert!(matches!(cache.check(&stored, now), CacheStatus::Expired { .. }));
        assert!(cache.load_valid(now).await.is_none());
    }

    #[tokio::test]
    async fn test_artifact_from_older_logic_is_rejected() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();

        let old = ResultCache::with_logic_version(
            dir.path().join("paleo_cache.json"),
            Duration::hours(24),
            "pipeline-old",
        );
        old.write(&old.envelope(sample_dataset(), now - Duration::hours(1)))
            .await
            .unwrap();

        let cache = cache_in(&dir);
        let stored = cache.read().await.unwrap();
        assert_eq!(
            cache.check(&stored, now),
            CacheStatus::LogicChanged {
                found: "pipeline-old".into(),
                expected: VERSION.into(),
            }
        );
        assert!(cache.load_valid(now).await.is_none());
    }

    #[tokio::test]
    async fn test_valid_artifact_is_returned_unchanged() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let now = Utc::now();

        let envelope = cache.envelope(sample_dataset(), now - Duration::hours(1));
        cache.write(&envelope).await.unwrap();
        let on_disk = std::fs::read(cache.path()).unwrap();

        let stored = cache.read().await.unwrap();
        assert_eq!(cache.check(&stored, now), CacheStatus::Fresh);
        assert_eq!(stored, envelope);
        assert_eq!(serde_json::to_vec_pretty(&stored).unwrap(), on_disk);

        let dataset = cache.load_valid(now).await.unwrap();
        assert_eq!(dataset, sample_dataset());
    }

    #[tokio::test]
    async fn test_full_precision_coordinates_survive_storage() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let now = Utc::now();

        let mut dataset = sample_dataset();
        let template = dataset.points[0].clone();
        dataset.points = [
            (-18.869388366902154, -48.27683019638061),
            (0.1 + 0.2, 1.0 / 3.0),
            (-89.99999999999999, 179.99999999999997),
        ]
        .into_iter()
        .map(|(lat, lng)| OccurrencePoint {
            lat,
            lng,
            early_age: json!(lat.abs()),
            late_age: json!(lng.abs()),
            ..template.clone()
        })
        .collect();

        cache
            .write(&cache.envelope(dataset.clone(), now))
            .await
            .unwrap();

        let restored = cache.load_valid(now).await.unwrap();
        assert_eq!(restored, dataset);
        assert_eq!(restored.points[0].lat, -18.869388366902154);
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("paleo_cache.json");
        std::fs::create_dir(&path).unwrap();
        let cache = ResultCache::with_logic_version(&path, Duration::hours(24), VERSION);

        let result = cache
            .write(&cache.envelope(sample_dataset(), Utc::now()))
            .await;

        assert!(result.is_err());
        assert!(path.is_dir());
        assert!(!dir.path().join("paleo_cache.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_future_timestamp_counts_as_fresh() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let now = Utc::now();

        let envelope = cache.envelope(sample_dataset(), now + Duration::minutes(5));
        assert_eq!(cache.check(&envelope, now), CacheStatus::Fresh);
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_artifacts_are_misses() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        assert!(cache.read().await.is_none());

        std::fs::write(cache.path(), b"{ not json").unwrap();
        assert!(cache.read().await.is_none());
        assert!(cache.load_valid(Utc::now()).await.is_none());
    }

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache").join("paleo_cache.json");
        let cache = ResultCache::with_logic_version(&path, Duration::hours(24), VERSION);

        cache
            .write(&cache.envelope(Dataset::default(), Utc::now()))
            .await
            .unwrap();

        assert!(path.exists());
        assert!(!path.with_file_name("paleo_cache.json.tmp").exists());
    }

    #[test]
    fn test_logic_version_tracks_stage_table() {
        assert!(logic_version().ends_with(&format!("stages-{}", period::table_version())));
    }
}
