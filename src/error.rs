use crate::offload::Binding;

/// Failures surfaced by the engine. Exploding links during relaxation are not
/// errors; they are skipped in place.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("buffer size mismatch for {binding:?}: expected {expected} bytes, got {actual}")]
    BufferSize {
        binding: Binding,
        expected: usize,
        actual: usize,
    },

    #[error("accelerator transfer failed: {message}")]
    Transfer { message: String },

    #[error("kernel dispatch failed: {message}")]
    Dispatch { message: String },
}

impl SimError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
