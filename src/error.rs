use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResearchError>;

/// Failures surfaced by the research components.
///
/// Each stage decides locally whether a failure has a safe fallback
/// (filter, cleaner, retrieval) or must reach the caller (writer).
#[derive(Debug, Error)]
pub enum ResearchError {
    /// A required credential or endpoint is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Model or service output did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The model or search backend could not be reached or refused the request.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("workspace not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResearchError {
    pub fn is_decode(&self) -> bool {
        matches!(self, ResearchError::Decode(_))
    }
}
