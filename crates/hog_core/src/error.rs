//! Error taxonomy shared by the harness core and every backend.

use crate::image::Shape;

/// Fatal harness failures. None of these are retried: each one is a deterministic
/// configuration or contract violation and aborts the experiment that raised it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HarnessError {
    /// Window does not fit the image, corpus is empty, trial count is zero, ...
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Buffers of incompatible dimensions were handed to a comparison or a stage call.
    #[error("shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch {
        context: &'static str,
        expected: Shape,
        found: Shape,
    },
    /// Statistics were requested over zero samples.
    #[error("no samples collected for {0}")]
    EmptyInput(String),
    /// The backend failed internally (lost device, dead worker, dropped notification).
    #[error("backend '{backend}' failed: {message}")]
    Backend { backend: String, message: String },
}

impl HarnessError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;
