//! Compute error types

use std::fmt;

use cloudproj_core::CloudError;

/// Error type for engine and kernel operations
#[derive(Debug)]
pub enum ComputeError {
    /// A configuration value cannot be honoured
    InvalidConfig(String),
    /// A mask does not cover every point of the store
    MaskLength { expected: usize, actual: usize },
    /// Error from the point cloud layer (classifier, export, ...)
    Cloud(CloudError),
    /// Image encoding or writing failed
    Image(image::ImageError),
}

impl fmt::Display for ComputeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeError::InvalidConfig(msg) => write!(f, "Invalid engine configuration: {}", msg),
            ComputeError::MaskLength { expected, actual } => {
                write!(f, "Mask covers {} points, store has {}", actual, expected)
            }
            ComputeError::Cloud(err) => write!(f, "{}", err),
            ComputeError::Image(err) => write!(f, "Image error: {}", err),
        }
    }
}

impl std::error::Error for ComputeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ComputeError::Cloud(err) => Some(err),
            ComputeError::Image(err) => Some(err),
            ComputeError::InvalidConfig(_) | ComputeError::MaskLength { .. } => None,
        }
    }
}

impl From<CloudError> for ComputeError {
    fn from(err: CloudError) -> Self {
        ComputeError::Cloud(err)
    }
}

impl From<image::ImageError> for ComputeError {
    fn from(err: image::ImageError) -> Self {
        ComputeError::Image(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_mask_length_display() {
        let err = ComputeError::MaskLength { expected: 10, actual: 4 };
        let msg = format!("{}", err);
        assert!(msg.contains("4"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn test_cloud_error_source() {
        let err = ComputeError::from(CloudError::Parse("bad".into()));
        assert!(err.source().is_some());
        assert!(ComputeError::InvalidConfig("x".into()).source().is_none());
    }
}
