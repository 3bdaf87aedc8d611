//! PaleoMap Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the PaleoMap workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`PaleoError`] and the [`Result`] alias
//! - **Logging**: centralized `tracing` subscriber setup in [`logging`]
//!
//! # Example
//!
//! ```no_run
//! use paleo_common::logging::{init_logging, LogConfig};
//! use tracing::info;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     info!("PaleoMap ingest starting");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{PaleoError, Result};
