use crate::error::SearchError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const SOURCE_KEY: &str = "source";
pub const PAGE_KEY: &str = "page";
pub const CHUNK_ID_KEY: &str = "chunk_id";
pub const CHUNK_SIZE_KEY: &str = "chunk_size";

pub type Metadata = BTreeMap<String, Value>;

/// A unit of text with provenance metadata. Chunks are documents too; they
/// additionally carry `chunk_id` and `chunk_size`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub content: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_source(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(content).with_metadata(SOURCE_KEY, source.into())
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(Value::as_str)
    }

    pub fn page(&self) -> Option<u64> {
        self.metadata.get(PAGE_KEY).and_then(Value::as_u64)
    }

    pub fn chunk_id(&self) -> Option<u64> {
        self.metadata.get(CHUNK_ID_KEY).and_then(Value::as_u64)
    }

    pub fn chunk_size(&self) -> Option<u64> {
        self.metadata.get(CHUNK_SIZE_KEY).and_then(Value::as_u64)
    }

    /// Identity used by the vector index. Derived from provenance and content
    /// only, so reloading the same file yields the same ids.
    pub fn stable_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source().unwrap_or_default().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.page().unwrap_or_default().to_le_bytes());
        hasher.update(self.content.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    /// Squared L2 distance to the query embedding. Lower is closer.
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    #[default]
    Similarity,
    Compression,
    Hybrid,
}

impl RetrievalMethod {
    pub const ALL: [RetrievalMethod; 3] = [
        RetrievalMethod::Similarity,
        RetrievalMethod::Compression,
        RetrievalMethod::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMethod::Similarity => "similarity",
            RetrievalMethod::Compression => "compression",
            RetrievalMethod::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalMethod {
    type Err = SearchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "similarity" => Ok(RetrievalMethod::Similarity),
            "compression" => Ok(RetrievalMethod::Compression),
            "hybrid" => Ok(RetrievalMethod::Hybrid),
            other => Err(SearchError::UnknownMethod(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub answer: String,
    pub source_documents: Vec<Document>,
    pub sources: Vec<String>,
}

impl ChatResponse {
    pub fn without_sources(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            source_documents: Vec::new(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchPreview {
    pub content: String,
    pub source: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Statistics {
    pub vector_store_type: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub chunk_size: usize,
    pub retrieval_k: usize,
    pub conversation_length: usize,
    pub indexed_chunks: usize,
}
