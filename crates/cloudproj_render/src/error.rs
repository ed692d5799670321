//! GPU backend errors

use std::fmt;

/// Error type for the wgpu backend
#[derive(Debug)]
pub enum GpuError {
    /// No adapter is available (headless CI, no driver)
    NoAdapter,
    /// The adapter refused to create a device
    RequestDevice(wgpu::RequestDeviceError),
    /// Mapping or copying results back to the CPU failed
    Readback(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter => write!(f, "No GPU adapter available"),
            GpuError::RequestDevice(err) => write!(f, "Failed to create GPU device: {}", err),
            GpuError::Readback(msg) => write!(f, "GPU readback failed: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::RequestDevice(err) => Some(err),
            GpuError::NoAdapter | GpuError::Readback(_) => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(err: wgpu::RequestDeviceError) -> Self {
        GpuError::RequestDevice(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(GpuError::NoAdapter.to_string(), "No GPU adapter available");
        assert_eq!(
            GpuError::Readback("channel closed".into()).to_string(),
            "GPU readback failed: channel closed"
        );
    }
}
