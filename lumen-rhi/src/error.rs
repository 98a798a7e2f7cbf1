use crate::device::GraphicsApi;

/// Failures surfaced by factory and submission calls.
///
/// Contract violations during recording are not errors; they are debug assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RhiError {
    /// The requested backend is not compiled into this build.
    BackendUnavailable(GraphicsApi),
    /// A descriptor is malformed or exceeds the device capabilities.
    InvalidDescriptor(String),
    /// A resource was used through an accessor its descriptor does not allow.
    InvalidUsage(String),
    /// The device stopped accepting work.
    DeviceLost,
    OutOfMemory,
    /// The swapchain no longer matches its surface and must be resized.
    SwapchainOutOfDate,
}

pub type RhiResult<T> = Result<T, RhiError>;

impl RhiError {
    pub(crate) fn invalid_descriptor(message: impl Into<String>) -> Self {
        RhiError::InvalidDescriptor(message.into())
    }

    pub(crate) fn invalid_usage(message: impl Into<String>) -> Self {
        RhiError::InvalidUsage(message.into())
    }
}

impl std::fmt::Display for RhiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RhiError::BackendUnavailable(api) => write!(f, "Graphics backend {:?} is not available", api),
            RhiError::InvalidDescriptor(msg) => write!(f, "Invalid descriptor: {}", msg),
            RhiError::InvalidUsage(msg) => write!(f, "Invalid usage: {}", msg),
            RhiError::DeviceLost => write!(f, "Device lost"),
            RhiError::OutOfMemory => write!(f, "Out of memory"),
            RhiError::SwapchainOutOfDate => write!(f, "Swapchain out of date"),
        }
    }
}

impl std::error::Error for RhiError {}
