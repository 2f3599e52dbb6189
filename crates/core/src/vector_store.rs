use crate::config::{Settings, VectorStoreKind};
use crate::embeddings::Embedder;
use crate::models::{Document, ScoredDocument};
use crate::stores::{create_index, open_index, purge_index};
use crate::traits::{IndexedRecord, VectorIndex};
use crate::SearchError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns the similarity index. Starts Empty unless a persisted index exists
/// for the configured backend, and becomes Populated on the first
/// successful [`VectorStoreManager::add_documents`].
pub struct VectorStoreManager {
    kind: VectorStoreKind,
    persist_directory: PathBuf,
    default_k: usize,
    embedder: Arc<dyn Embedder>,
    index: Option<Box<dyn VectorIndex>>,
}

impl VectorStoreManager {
    pub fn open(settings: &Settings, embedder: Arc<dyn Embedder>) -> Result<Self, SearchError> {
        let index = open_index(settings.vector_store_type, &settings.persist_directory)?;
        match &index {
            Some(index) => info!(
                backend = %settings.vector_store_type,
                records = index.len(),
                "opened persisted vector store"
            ),
            None => debug!(backend = %settings.vector_store_type, "no persisted vector store"),
        }

        Ok(Self {
            kind: settings.vector_store_type,
            persist_directory: settings.persist_directory.clone(),
            default_k: settings.retrieval_k,
            embedder,
            index,
        })
    }

    pub fn backend(&self) -> VectorStoreKind {
        self.kind
    }

    pub fn persist_directory(&self) -> &Path {
        &self.persist_directory
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    pub fn is_populated(&self) -> bool {
        self.index.is_some()
    }

    pub fn len(&self) -> usize {
        self.index.as_ref().map_or(0, |index| index.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embeds and stores chunks, returning how many distinct records were
    /// written. Identical chunks from the same source and page collapse into
    /// one record. A failed call leaves the store as it was.
    pub async fn add_documents(&mut self, documents: &[Document]) -> Result<usize, SearchError> {
        if documents.is_empty() {
            warn!("no documents to add");
            return Ok(0);
        }

        let texts: Vec<&str> = documents.iter().map(|doc| doc.content.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != documents.len() {
            return Err(SearchError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                documents.len()
            )));
        }

        let records: Vec<IndexedRecord> = documents
            .iter()
            .zip(embeddings)
            .map(|(document, embedding)| IndexedRecord {
                id: document.stable_id(),
                embedding,
                document: document.clone(),
            })
            .collect();
        let stored = records
            .iter()
            .map(|record| record.id.as_str())
            .collect::<HashSet<_>>()
            .len();

        let index = match &mut self.index {
            Some(index) => index,
            slot => {
                info!(backend = %self.kind, "creating vector store");
                slot.insert(create_index(self.kind, &self.persist_directory))
            }
        };

        if let Err(error) = index.upsert(records) {
            if index.is_empty() {
                self.index = None;
            }
            return Err(error);
        }

        info!(added = stored, total = self.len(), "documents added to vector store");
        Ok(stored)
    }

    pub async fn similarity_search(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<Document>, SearchError> {
        Ok(self
            .similarity_search_with_score(query, k)
            .await?
            .into_iter()
            .map(|hit| hit.document)
            .collect())
    }

    /// Nearest chunks with their squared L2 distance, closest first.
    pub async fn similarity_search_with_score(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<ScoredDocument>, SearchError> {
        let Some(index) = &self.index else {
            warn!("vector store is not initialized");
            return Ok(Vec::new());
        };

        let k = k.unwrap_or(self.default_k);
        let query_vector = self.embedder.embed(query).await?;
        let hits = index.nearest(&query_vector, k)?;
        debug!(k, hits = hits.len(), "similarity search");
        Ok(hits)
    }

    pub fn get_retriever(&self, k: Option<usize>) -> Result<StoreRetriever<'_>, SearchError> {
        if self.index.is_none() {
            return Err(SearchError::StoreEmpty);
        }
        Ok(StoreRetriever {
            store: self,
            k: k.unwrap_or(self.default_k),
        })
    }

    /// Removes records by stable id; an empty id list removes everything.
    pub fn delete_documents(&mut self, ids: &[String]) -> Result<usize, SearchError> {
        let Some(index) = &mut self.index else {
            return Ok(0);
        };

        if ids.is_empty() {
            let removed = index.len();
            self.reset()?;
            return Ok(removed);
        }

        let removed = index.delete(ids);
        if index.is_empty() {
            self.reset()?;
        } else {
            index.persist()?;
        }
        info!(removed, remaining = self.len(), "deleted documents from vector store");
        Ok(removed)
    }

    /// Drops the index and its files. Safe to call when already Empty.
    pub fn reset(&mut self) -> Result<(), SearchError> {
        if let Some(mut index) = self.index.take() {
            index.delete_all()?;
        }
        purge_index(self.kind, &self.persist_directory)?;
        info!(backend = %self.kind, "vector store reset");
        Ok(())
    }
}

/// A similarity lookup bound to a fixed `k`.
pub struct StoreRetriever<'a> {
    store: &'a VectorStoreManager,
    k: usize,
}

impl StoreRetriever<'_> {
    pub fn k(&self) -> usize {
        self.k
    }

    pub async fn get_relevant_documents(&self, query: &str) -> Result<Vec<Document>, SearchError> {
        self.store.similarity_search(query, Some(self.k)).await
    }
}
