//! Point cloud error types
//!
//! Provides error handling for loading, caching, exporting and classifying
//! point clouds.

use std::fmt;
use std::io;

/// Error type for point cloud operations
#[derive(Debug)]
pub enum CloudError {
    /// IO error (file not found, permission denied, truncated read, etc.)
    Io(io::Error),
    /// Parse error (invalid header, unsupported property, corrupt cache)
    Parse(String),
    /// No loadable source exists for a dataset
    NotFound(String),
    /// Error reported by the LAS/LAZ reader
    Las(las::Error),
    /// Caller passed data that violates a contract
    InvalidInput(String),
    /// A background task panicked before producing a result
    TaskPanicked(String),
}

impl fmt::Display for CloudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudError::Io(err) => write!(f, "Point cloud IO error: {}", err),
            CloudError::Parse(msg) => write!(f, "Point cloud parse error: {}", msg),
            CloudError::NotFound(path) => write!(f, "Point cloud not found: {}", path),
            CloudError::Las(err) => write!(f, "LAS error: {}", err),
            CloudError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            CloudError::TaskPanicked(name) => write!(f, "Background task '{}' panicked", name),
        }
    }
}

impl std::error::Error for CloudError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CloudError::Io(err) => Some(err),
            CloudError::Las(err) => Some(err),
            CloudError::Parse(_)
            | CloudError::NotFound(_)
            | CloudError::InvalidInput(_)
            | CloudError::TaskPanicked(_) => None,
        }
    }
}

impl From<io::Error> for CloudError {
    fn from(err: io::Error) -> Self {
        CloudError::Io(err)
    }
}

impl From<las::Error> for CloudError {
    fn from(err: las::Error) -> Self {
        CloudError::Las(err)
    }
}

impl From<String> for CloudError {
    fn from(msg: String) -> Self {
        CloudError::Parse(msg)
    }
}

impl From<&str> for CloudError {
    fn from(msg: &str) -> Self {
        CloudError::Parse(msg.to_string())
    }
}
