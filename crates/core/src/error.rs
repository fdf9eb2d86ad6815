use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("document had no readable text: {0}")]
    Empty(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum ChunkingError {
    #[error("invalid chunking config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    Backend { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("collection {0} already exists")]
    CollectionExists(String),

    #[error("collection {0} does not exist")]
    CollectionNotFound(String),

    #[error("embedding service returned {actual} vectors for {expected} texts")]
    EmbeddingMismatch { expected: usize, actual: usize },

    #[error("embedding service is not configured: {0}")]
    NotConfigured(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl StoreError {
    pub fn is_timeout(&self) -> bool {
        match self {
            StoreError::Timeout { .. } => true,
            StoreError::Http(error) => error.is_timeout(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("language model is not configured: {0}")]
    NotConfigured(String),

    #[error("language model call timed out after {after:?}")]
    Timeout { after: Duration },
}

impl LlmError {
    pub fn is_timeout(&self) -> bool {
        match self {
            LlmError::Timeout { .. } => true,
            LlmError::Http(error) => error.is_timeout(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    #[error("failed to index document: {0}")]
    Store(#[from] StoreError),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("failed to store upload {file_name}: {source}")]
    Save {
        file_name: String,
        source: std::io::Error,
    },
}

impl IngestionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, IngestionError::Store(error) if error.is_timeout())
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("No query provided")]
    EmptyQuestion,

    #[error("retrieval failed: {0}")]
    Store(#[from] StoreError),

    #[error("answer generation failed: {0}")]
    Model(#[from] LlmError),
}

impl QueryError {
    pub fn is_timeout(&self) -> bool {
        match self {
            QueryError::EmptyQuestion => false,
            QueryError::Store(error) => error.is_timeout(),
            QueryError::Model(error) => error.is_timeout(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReindexError {
    #[error("document directory unreadable: {0}")]
    Io(#[from] std::io::Error),

    #[error("Reindexing failed: {0}")]
    Store(#[from] StoreError),
}

impl ReindexError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReindexError::Store(error) if error.is_timeout())
    }
}
