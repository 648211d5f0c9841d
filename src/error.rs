//! Error types for the diffusion analysis core.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    /// Malformed numeric input: bad lag, non-positive lengths, too few points.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Input is well formed but carries no usable statistics (zero variance, empty series).
    #[error("degenerate data: {0}")]
    DegenerateData(String),

    /// The displacement provider failed to answer a query.
    #[error("displacement provider error: {0}")]
    Provider(String),
}

impl AnalysisError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn degenerate(message: impl Into<String>) -> Self {
        Self::DegenerateData(message.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::DegenerateData(_))
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
