use crate::llm::{GenerationParams, LanguageModel};
use crate::models::{Document, Metadata, RetrievalMethod};
use crate::prompt::PromptBuilder;
use crate::vector_store::VectorStoreManager;
use crate::SearchError;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Hybrid keeps scored hits strictly below this squared L2 distance.
pub const HYBRID_SCORE_THRESHOLD: f32 = 0.7;

pub const NO_CONTEXT: &str = "No relevant context found.";

/// Narrows candidates to the passages relevant to a query using a model.
#[derive(Clone)]
pub struct ContextCompressor {
    llm: Arc<dyn LanguageModel>,
}

impl ContextCompressor {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// One extraction call per candidate; candidates with nothing relevant
    /// are dropped and metadata is carried over unchanged.
    pub async fn compress(
        &self,
        query: &str,
        candidates: Vec<Document>,
    ) -> Result<Vec<Document>, SearchError> {
        let total = candidates.len();
        let mut kept = Vec::with_capacity(total);

        for candidate in candidates {
            let messages = PromptBuilder::build_extraction_prompt(query, &candidate.content);
            let output = self
                .llm
                .complete(&messages, GenerationParams::DETERMINISTIC)
                .await?;

            if let Some(extracted) = PromptBuilder::parse_extraction(&output) {
                kept.push(Document {
                    content: extracted,
                    metadata: candidate.metadata,
                });
            }
        }

        debug!(candidates = total, kept = kept.len(), "compressed retrieval candidates");
        Ok(kept)
    }
}

#[derive(Clone)]
pub struct DocumentRetriever {
    k: usize,
    score_threshold: f32,
    compressor: Option<ContextCompressor>,
}

impl DocumentRetriever {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            score_threshold: HYBRID_SCORE_THRESHOLD,
            compressor: None,
        }
    }

    pub fn with_compressor(mut self, compressor: ContextCompressor) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Never fails: any error is logged and yields no documents.
    pub async fn retrieve_documents(
        &self,
        store: &VectorStoreManager,
        query: &str,
        method: RetrievalMethod,
    ) -> Vec<Document> {
        match self.try_retrieve(store, query, method).await {
            Ok(documents) => documents,
            Err(SearchError::StoreEmpty) => {
                warn!("no retriever available");
                Vec::new()
            }
            Err(error) => {
                warn!(%method, error = %error, "retrieval failed");
                Vec::new()
            }
        }
    }

    pub async fn try_retrieve(
        &self,
        store: &VectorStoreManager,
        query: &str,
        method: RetrievalMethod,
    ) -> Result<Vec<Document>, SearchError> {
        let documents = match method {
            RetrievalMethod::Similarity => self.similarity(store, query).await?,
            RetrievalMethod::Compression => self.compression(store, query).await?,
            RetrievalMethod::Hybrid => self.hybrid(store, query).await?,
        };
        debug!(%method, results = documents.len(), "retrieved documents");
        Ok(documents)
    }

    async fn similarity(
        &self,
        store: &VectorStoreManager,
        query: &str,
    ) -> Result<Vec<Document>, SearchError> {
        store
            .get_retriever(Some(self.k))?
            .get_relevant_documents(query)
            .await
    }

    async fn compression(
        &self,
        store: &VectorStoreManager,
        query: &str,
    ) -> Result<Vec<Document>, SearchError> {
        let candidates = self.similarity(store, query).await?;
        match &self.compressor {
            Some(compressor) => compressor.compress(query, candidates).await,
            None => Ok(candidates),
        }
    }

    async fn hybrid(
        &self,
        store: &VectorStoreManager,
        query: &str,
    ) -> Result<Vec<Document>, SearchError> {
        let mut combined = self.similarity(store, query).await?;
        let scored = store.similarity_search_with_score(query, Some(self.k)).await?;
        combined.extend(
            scored
                .into_iter()
                .filter(|hit| hit.score < self.score_threshold)
                .map(|hit| hit.document),
        );

        let mut unique = deduplicate_documents(combined);
        unique.truncate(self.k);
        Ok(unique)
    }

    /// Similarity results whose metadata has every filter key with an equal value.
    pub async fn retrieve_with_metadata_filter(
        &self,
        store: &VectorStoreManager,
        query: &str,
        filter: &Metadata,
    ) -> Vec<Document> {
        self.retrieve_documents(store, query, RetrievalMethod::Similarity)
            .await
            .into_iter()
            .filter(|doc| {
                filter
                    .iter()
                    .all(|(key, value)| doc.metadata.get(key) == Some(value))
            })
            .collect()
    }
}

/// Drops documents whose content repeats an earlier one. Order is kept.
pub fn deduplicate_documents(documents: Vec<Document>) -> Vec<Document> {
    let mut seen = HashSet::new();
    documents
        .into_iter()
        .filter(|doc| seen.insert(doc.content.clone()))
        .collect()
}

pub fn get_document_sources(documents: &[Document]) -> Vec<String> {
    documents
        .iter()
        .filter_map(|doc| doc.source())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn format_retrieved_context(documents: &[Document]) -> String {
    if documents.is_empty() {
        return NO_CONTEXT.to_string();
    }

    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            format!(
                "[Document {} - {}]\n{}\n",
                i + 1,
                doc.source().unwrap_or("Unknown"),
                doc.content.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
