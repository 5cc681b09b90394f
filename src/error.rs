//! Error types for ASPset-510 dataset operations

use thiserror::Error;

/// Result type alias for ASPset-510 operations
pub type Result<T> = std::result::Result<T, Aspset510Error>;

/// Error types for dataset access, download, and evaluation operations
#[derive(Error, Debug)]
pub enum Aspset510Error {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors (camera matrix files)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image encoding/decoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Network errors during archive download
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed dataset layout or metadata
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Motion capture file parsing errors
    #[error("Mocap error: {0}")]
    Mocap(String),

    /// Archive integrity check failures
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Aspset510Error {
    /// Create a new dataset error
    pub fn dataset<S: Into<String>>(msg: S) -> Self {
        Self::Dataset(msg.into())
    }

    /// Create a new mocap parsing error
    pub fn mocap<S: Into<String>>(msg: S) -> Self {
        Self::Mocap(msg.into())
    }

    /// Create a new integrity error
    pub fn integrity<S: Into<String>>(msg: S) -> Self {
        Self::Integrity(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a network error with operation context
    pub fn network_error<C: Into<String>, E: std::fmt::Display>(context: C, error: E) -> Self {
        Self::Network(format!("{}: {error}", context.into()))
    }

    /// Create a file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("failed to {} '{}': {}", operation, path.as_ref().display(), error),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Aspset510Error::dataset("missing splits.csv");
        assert_eq!(err.to_string(), "Dataset error: missing splits.csv");

        let err = Aspset510Error::invalid_config("unknown camera id 'top'");
        assert!(err.to_string().contains("unknown camera id"));
    }

    #[test]
    fn test_file_io_error_context() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Aspset510Error::file_io_error("open splits file", "/data/splits.csv", &io_err);
        let msg = err.to_string();
        assert!(msg.contains("open splits file"));
        assert!(msg.contains("/data/splits.csv"));
    }

    #[test]
    fn test_network_error_context() {
        let err = Aspset510Error::network_error("request failed", "timeout");
        assert_eq!(err.to_string(), "Network error: request failed: timeout");
    }
}
