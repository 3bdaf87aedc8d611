//! Ingest pipeline configuration
//!
//! Defaults reproduce the production deployment. Every field can be
//! overridden through `PALEO_*` environment variables (see
//! [`IngestConfig::from_env`]).

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_RAW_CONTENT_URL: &str = "https://raw.githubusercontent.com";
pub const DEFAULT_REPO_OWNER: &str = "LuksNMDS";
pub const DEFAULT_REPO_NAME: &str = "mapa-tcc-imagens";
pub const DEFAULT_REPO_BRANCH: &str = "main";
pub const DEFAULT_IMAGE_DIR: &str = "static/imagens";
pub const DEFAULT_OCCURRENCE_API_URL: &str = "https://paleobiodb.org/data1.2";

/// Field-set selector sent as `show` to the occurrence search
pub const DEFAULT_SHOW_FIELDS: &str = "coords,phylo,ident,ages,strat";

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_CATALOG_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_ISOLATION_DELAY_MS: u64 = 500;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 2_000;
pub const DEFAULT_CACHE_PATH: &str = "paleo_cache.json";
pub const DEFAULT_CACHE_MAX_AGE_HOURS: i64 = 24;

/// Taxa queried even though no illustration exists for them
pub const DEFAULT_SUPPLEMENTARY_TAXA: &[&str] = &[
    "Coelodonta",
    "Eoraptor",
    "Macrauchenia",
    "Titanis",
    "Kelenken",
    "Devincenzia",
    "Phorusrhacos",
    "Dunkleosteus",
    "Indohyus",
    "Pakicetus",
    "Ambulocetus",
    "Maiacetus",
    "Dorudon",
];

const USER_AGENT: &str = concat!("PaleoMap-Ingest/", env!("CARGO_PKG_VERSION"));

/// Configuration for one ingest pipeline instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// GitHub REST API root
    pub github_api_url: String,

    /// Root serving raw repository files (image URLs are built from it)
    pub raw_content_url: String,

    /// Owner of the illustration repository
    pub repo_owner: String,

    /// Name of the illustration repository
    pub repo_name: String,

    /// Branch whose tree is listed
    pub repo_branch: String,

    /// Directory of the illustrations inside the repository
    pub image_dir: String,

    /// Occurrence database API root (`{root}/occs/list.json`)
    pub occurrence_api_url: String,

    /// `show` parameter for occurrence searches
    pub show_fields: String,

    /// Taxa per bulk request
    pub batch_size: usize,

    /// Total attempts per bulk request before isolation mode
    pub max_attempts: u32,

    pub catalog_timeout_secs: u64,

    pub fetch_timeout_secs: u64,

    /// Pause between attempts on the same batch
    pub retry_delay_ms: u64,

    /// Pause after each single-taxon request in isolation mode
    pub isolation_delay_ms: u64,

    /// Pause after every batch
    pub batch_delay_ms: u64,

    /// Location of the cache artifact
    pub cache_path: PathBuf,

    /// Freshness window of the cache artifact
    pub cache_max_age_hours: i64,

    /// Taxa merged into the catalog regardless of illustrations
    pub supplementary_taxa: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            raw_content_url: DEFAULT_RAW_CONTENT_URL.to_string(),
            repo_owner: DEFAULT_REPO_OWNER.to_string(),
            repo_name: DEFAULT_REPO_NAME.to_string(),
            repo_branch: DEFAULT_REPO_BRANCH.to_string(),
            image_dir: DEFAULT_IMAGE_DIR.to_string(),
            occurrence_api_url: DEFAULT_OCCURRENCE_API_URL.to_string(),
            show_fields: DEFAULT_SHOW_FIELDS.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            catalog_timeout_secs: DEFAULT_CATALOG_TIMEOUT_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            isolation_delay_ms: DEFAULT_ISOLATION_DELAY_MS,
            batch_delay_ms: DEFAULT_BATCH_DELAY_MS,
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            cache_max_age_hours: DEFAULT_CACHE_MAX_AGE_HOURS,
            supplementary_taxa: DEFAULT_SUPPLEMENTARY_TAXA
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

impl IngestConfig {
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }

    /// Load configuration from environment variables on top of the defaults
    ///
    /// Recognized variables: `PALEO_GITHUB_API_URL`, `PALEO_RAW_CONTENT_URL`,
    /// `PALEO_REPO_OWNER`, `PALEO_REPO_NAME`, `PALEO_REPO_BRANCH`,
    /// `PALEO_IMAGE_DIR`, `PALEO_OCCURRENCE_API_URL`, `PALEO_BATCH_SIZE`,
    /// `PALEO_MAX_ATTEMPTS`, `PALEO_CACHE_PATH`, `PALEO_CACHE_MAX_AGE_HOURS`
    /// and `PALEO_SUPPLEMENTARY_TAXA` (comma-separated).
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        let strings = [
            ("PALEO_GITHUB_API_URL", &mut config.github_api_url),
            ("PALEO_RAW_CONTENT_URL", &mut config.raw_content_url),
            ("PALEO_REPO_OWNER", &mut config.repo_owner),
            ("PALEO_REPO_NAME", &mut config.repo_name),
            ("PALEO_REPO_BRANCH", &mut config.repo_branch),
            ("PALEO_IMAGE_DIR", &mut config.image_dir),
            ("PALEO_OCCURRENCE_API_URL", &mut config.occurrence_api_url),
        ];
        for (key, field) in strings {
            if let Ok(value) = std::env::var(key) {
                *field = value;
            }
        }

        if let Some(size) = parse_env("PALEO_BATCH_SIZE")? {
            config.batch_size = size;
        }

        if let Some(attempts) = parse_env("PALEO_MAX_ATTEMPTS")? {
            config.max_attempts = attempts;
        }

        if let Ok(path) = std::env::var("PALEO_CACHE_PATH") {
            config.cache_path = PathBuf::from(path);
        }

        if let Some(hours) = parse_env("PALEO_CACHE_MAX_AGE_HOURS")? {
            config.cache_max_age_hours = hours;
        }

        if let Ok(taxa) = std::env::var("PALEO_SUPPLEMENTARY_TAXA") {
            config.supplementary_taxa = taxa
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("github_api_url", &self.github_api_url),
            ("raw_content_url", &self.raw_content_url),
            ("repo_owner", &self.repo_owner),
            ("repo_name", &self.repo_name),
            ("repo_branch", &self.repo_branch),
            ("occurrence_api_url", &self.occurrence_api_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(IngestError::config(format!("{} cannot be empty", name)));
            }
        }

        if self.batch_size == 0 {
            return Err(IngestError::config("batch_size must be greater than 0"));
        }

        if self.max_attempts == 0 {
            return Err(IngestError::config("max_attempts must be greater than 0"));
        }

        if self.catalog_timeout_secs == 0 || self.fetch_timeout_secs == 0 {
            return Err(IngestError::config("timeouts must be greater than 0"));
        }

        if self.cache_max_age_hours <= 0 {
            return Err(IngestError::config("cache_max_age_hours must be positive"));
        }

        if chrono::Duration::try_hours(self.cache_max_age_hours).is_none() {
            return Err(IngestError::config(format!(
                "cache_max_age_hours {} is out of range",
                self.cache_max_age_hours
            )));
        }

        Ok(())
    }

    pub fn user_agent(&self) -> &'static str {
        USER_AGENT
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Freshness window. Out-of-range hour counts fall back to the default;
    /// [`validate`](Self::validate) rejects them.
    pub fn cache_max_age(&self) -> chrono::Duration {
        chrono::Duration::try_hours(self.cache_max_age_hours)
            .unwrap_or_else(|| chrono::Duration::hours(DEFAULT_CACHE_MAX_AGE_HOURS))
    }

    /// `{raw}/{owner}/{repo}/{branch}/{image_dir}/`, the prefix of every image URL
    pub fn image_base_url(&self) -> Result<url::Url> {
        let mut base = url::Url::parse(&self.raw_content_url)?;
        {
            let mut segments = base
                .path_segments_mut()
                .map_err(|_| IngestError::config("raw_content_url cannot be a base URL"))?;
            segments
                .pop_if_empty()
                .push(&self.repo_owner)
                .push(&self.repo_name)
                .push(&self.repo_branch);
            segments.extend(self.image_dir.split('/').filter(|s| !s.is_empty()));
            segments.push("");
        }
        Ok(base)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| IngestError::config(format!("{}={}: {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}

/// Builder for IngestConfig
#[derive(Debug, Default)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn github_api_url(mut self, url: impl Into<String>) -> Self {
        self.config.github_api_url = url.into();
        self
    }

    pub fn raw_content_url(mut self, url: impl Into<String>) -> Self {
        self.config.raw_content_url = url.into();
        self
    }

    pub fn occurrence_api_url(mut self, url: impl Into<String>) -> Self {
        self.config.occurrence_api_url = url.into();
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache_path = path.into();
        self
    }

    pub fn cache_max_age_hours(mut self, hours: i64) -> Self {
        self.config.cache_max_age_hours = hours;
        self
    }

    pub fn supplementary_taxa<I, S>(mut self, taxa: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.supplementary_taxa = taxa.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> IngestConfig {
        self.config
    }
}
