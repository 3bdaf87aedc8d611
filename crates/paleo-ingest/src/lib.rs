//! PaleoMap Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Builds the fossil occurrence dataset served to the PaleoMap front end.
//!
//! # Pipeline
//!
//! - **catalog**: taxa with an illustration, read from the image repository tree
//! - **fetcher**: bulk occurrence search with retry and per-taxon isolation
//! - **normalizer**: raw records → map points, with image URLs
//! - **period**: stratigraphic stage → geological period bucket
//! - **cache**: last successful payload, invalidated by age and logic version
//! - **pipeline**: ties the stages together behind [`IngestionPipeline::get_dataset`]
//!
//! # Example
//!
//! ```no_run
//! use paleo_ingest::{IngestConfig, IngestionPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let pipeline = IngestionPipeline::from_config(&config)?;
//!     let dataset = pipeline.get_dataset().await;
//!     println!("{}", serde_json::to_string(&dataset)?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod normalizer;
pub mod period;
pub mod pipeline;
pub mod rate;

pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use models::{Dataset, OccurrencePoint, RawOccurrenceRecord, Taxon};
pub use period::{classify, PeriodBucket};
pub use pipeline::IngestionPipeline;
