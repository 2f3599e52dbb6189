use crate::config::VectorStoreKind;
use crate::models::{Document, ScoredDocument};
use crate::SearchError;
use serde::{Deserialize, Serialize};

/// A chunk as held by an index: stable id, embedding and the chunk itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: Document,
}

/// A persistent similarity index over chunks.
///
/// Scores returned by [`VectorIndex::nearest`] are squared L2 distances,
/// ascending, so lower means more similar.
pub trait VectorIndex: Send + Sync {
    fn backend(&self) -> VectorStoreKind;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts records, replacing any record with the same id, and flushes
    /// them to disk. On error the index is left as it was.
    fn upsert(&mut self, records: Vec<IndexedRecord>) -> Result<(), SearchError>;

    fn nearest(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredDocument>, SearchError>;

    /// Removes the given ids and returns how many were present.
    fn delete(&mut self, ids: &[String]) -> usize;

    /// Writes the current records to disk.
    fn persist(&self) -> Result<(), SearchError>;

    /// Drops every record and the persisted files.
    fn delete_all(&mut self) -> Result<(), SearchError>;
}
