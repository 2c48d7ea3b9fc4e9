use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid response from {endpoint}: {details}")]
    BackendResponse { endpoint: String, details: String },

    #[error("embedding dimension {got} does not match expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("embedding provider error: {0}")]
    Embedding(#[from] EmbeddingError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reviewer {reviewer_id} is already assigned to proposal {proposal_id}")]
    AlreadyAssigned { proposal_id: i64, reviewer_id: i64 },

    #[error("reviewer {reviewer_id} has already reviewed proposal {proposal_id}")]
    AlreadyReviewed { proposal_id: i64, reviewer_id: i64 },

    #[error("email already registered: {0}")]
    DuplicateEmail(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("database lock poisoned")]
    LockPoisoned,
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
