//! Error types shared across the PaleoMap workspace

use thiserror::Error;

/// Result type alias for PaleoMap operations
pub type Result<T> = std::result::Result<T, PaleoError>;

/// Main error type for PaleoMap
#[derive(Error, Debug)]
pub enum PaleoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaleoError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "cache file");
        let err: PaleoError = io.into();
        assert!(matches!(err, PaleoError::Io(_)));
        assert!(err.to_string().contains("cache file"));
    }

    #[test]
    fn test_config_helper() {
        let err = PaleoError::config("batch size must be positive");
        assert_eq!(
            err.to_string(),
            "Configuration error: batch size must be positive"
        );
    }
}
