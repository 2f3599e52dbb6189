use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing API key: set OPENAI_API_KEY or use the local embedding model")]
    MissingApiKey,

    #[error("unsupported vector store type: {0}")]
    UnsupportedStoreType(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("decode error in {path}: {details}")]
    Decode { path: String, details: String },

    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("vector store is empty")]
    StoreEmpty,

    #[error("unknown retrieval method: {0}")]
    UnknownMethod(String),

    #[error("embedding error ({provider}): {message}")]
    Embedding { provider: String, message: String },

    #[error("generation error ({provider}): {message}")]
    Generation { provider: String, message: String },

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Search(#[from] SearchError),
}
