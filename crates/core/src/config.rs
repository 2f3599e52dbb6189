//! Environment-sourced settings.
//!
//! Every value has a default so the assistant starts without any
//! configuration; only the provider credential is required, and only when a
//! remote embedding model is selected.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
/// Selects the offline character n-gram embedder instead of a remote model.
pub const LOCAL_EMBEDDING_MODEL: &str = "char-ngram";
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;
pub const DEFAULT_RETRIEVAL_K: usize = 4;
pub const DEFAULT_DOCUMENTS_DIR: &str = "data/documents";
pub const DEFAULT_PERSIST_DIRECTORY: &str = "data/vectorstore";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Selects the on-disk layout of the persisted index. Both kinds are served
/// by the same in-process exact search; neither talks to a Chroma or FAISS
/// engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreKind {
    #[default]
    Chroma,
    Faiss,
}

impl VectorStoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorStoreKind::Chroma => "chroma",
            VectorStoreKind::Faiss => "faiss",
        }
    }
}

impl fmt::Display for VectorStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VectorStoreKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "chroma" => Ok(VectorStoreKind::Chroma),
            "faiss" => Ok(VectorStoreKind::Faiss),
            _ => Err(ConfigError::UnsupportedStoreType(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub vector_store_type: VectorStoreKind,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieval_k: usize,
    pub documents_dir: PathBuf,
    pub persist_directory: PathBuf,
    pub temperature: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            vector_store_type: VectorStoreKind::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            retrieval_k: DEFAULT_RETRIEVAL_K,
            documents_dir: PathBuf::from(DEFAULT_DOCUMENTS_DIR),
            persist_directory: PathBuf::from(DEFAULT_PERSIST_DIRECTORY),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup. Blank values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let defaults = Settings::default();
        let settings = Settings {
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            chat_model: get("CHAT_MODEL").unwrap_or(defaults.chat_model),
            embedding_model: get("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            vector_store_type: match get("VECTOR_STORE_TYPE") {
                Some(value) => value.parse()?,
                None => defaults.vector_store_type,
            },
            chunk_size: parse_or("CHUNK_SIZE", get("CHUNK_SIZE"), defaults.chunk_size)?,
            chunk_overlap: parse_or("CHUNK_OVERLAP", get("CHUNK_OVERLAP"), defaults.chunk_overlap)?,
            retrieval_k: parse_or("RETRIEVAL_K", get("RETRIEVAL_K"), defaults.retrieval_k)?,
            documents_dir: get("DOCUMENTS_DIR")
                .or_else(|| get("PDF_DIR"))
                .or_else(|| get("DATA_DIR"))
                .map(PathBuf::from)
                .unwrap_or(defaults.documents_dir),
            persist_directory: get("PERSIST_DIRECTORY")
                .map(PathBuf::from)
                .unwrap_or(defaults.persist_directory),
            temperature: parse_or("CHAT_TEMPERATURE", get("CHAT_TEMPERATURE"), defaults.temperature)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.openai_base_url)?;

        if self.chunk_size == 0 {
            return Err(invalid("CHUNK_SIZE", self.chunk_size));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(invalid("CHUNK_OVERLAP", self.chunk_overlap));
        }
        if self.retrieval_k == 0 {
            return Err(invalid("RETRIEVAL_K", self.retrieval_k));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid("CHAT_TEMPERATURE", self.temperature));
        }
        Ok(())
    }

    pub fn uses_local_embeddings(&self) -> bool {
        self.embedding_model == LOCAL_EMBEDDING_MODEL
    }

    /// Whether any configured collaborator needs the provider credential
    /// before documents can be indexed.
    pub fn requires_api_key(&self) -> bool {
        !self.uses_local_embeddings()
    }

    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or(ConfigError::MissingApiKey)
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn invalid(key: &str, value: impl fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
