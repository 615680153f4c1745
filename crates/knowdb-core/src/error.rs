use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Embedding failed at chunk {chunk}: {reason}")]
    Embedding { chunk: usize, reason: String },

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}{}", at_chunk(.chunk))]
    DimensionMismatch { expected: usize, actual: usize, chunk: Option<usize> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    #[error("Refusing destructive operation without confirmation: {0}")]
    ConfirmationRequired(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn unavailable(e: impl std::fmt::Display) -> Self {
        Self::IndexUnavailable(e.to_string())
    }

    pub fn operation(e: impl std::fmt::Display) -> Self {
        Self::Operation(e.to_string())
    }

    /// Dimension mismatch not tied to a particular chunk.
    pub fn dimension(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual, chunk: None }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

fn at_chunk(chunk: &Option<usize>) -> String {
    chunk.map(|c| format!(" at chunk {c}")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;
