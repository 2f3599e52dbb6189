use crate::config::Settings;
use crate::embeddings::build_embedder;
use crate::error::ConfigError;
use crate::llm::{build_language_model, GenerationParams, LanguageModel, UnconfiguredModel};
use crate::memory::{ConversationMemory, Turn};
use crate::models::{
    ChatResponse, Document, RetrievalMethod, SearchPreview, Statistics,
};
use crate::prompt::{PromptBuilder, NOT_READY_ANSWER};
use crate::retriever::{
    format_retrieved_context, get_document_sources, ContextCompressor, DocumentRetriever,
};
use crate::vector_store::VectorStoreManager;
use crate::SearchError;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const PREVIEW_CHARS: usize = 200;

/// Retrieve, format and generate for one turn. Only exists while the store
/// is populated.
pub struct RagChain {
    retriever: DocumentRetriever,
    params: GenerationParams,
}

impl RagChain {
    async fn invoke(
        &self,
        store: &VectorStoreManager,
        llm: &dyn LanguageModel,
        memory: &ConversationMemory,
        question: &str,
        method: RetrievalMethod,
    ) -> Result<ChatResponse, SearchError> {
        let history = memory.render();
        let standalone = if memory.is_empty() {
            question.to_string()
        } else {
            let messages = PromptBuilder::build_condense_prompt(&history, question);
            let condensed = llm.complete(&messages, GenerationParams::DETERMINISTIC).await?;
            debug!(condensed = %condensed.trim(), "condensed follow-up question");
            condensed.trim().to_string()
        };

        let documents = self.retriever.try_retrieve(store, &standalone, method).await?;
        let context = format_retrieved_context(&documents);
        let messages = PromptBuilder::build_answer_prompt(&context, &history, &standalone);
        let answer = llm.complete(&messages, self.params).await?;

        Ok(ChatResponse {
            answer,
            sources: get_document_sources(&documents),
            source_documents: documents,
        })
    }
}

pub struct RagChatbot {
    settings: Settings,
    store: VectorStoreManager,
    llm: Arc<dyn LanguageModel>,
    retriever: DocumentRetriever,
    memory: ConversationMemory,
    chain: Option<RagChain>,
}

impl RagChatbot {
    /// Builds the configured embedder, chat model and store. Without a
    /// credential the local embedder still works; chat turns then fail
    /// with a missing-key answer.
    pub fn new(settings: &Settings) -> Result<Self, SearchError> {
        let embedder = build_embedder(settings)?;
        let llm: Arc<dyn LanguageModel> = match build_language_model(settings) {
            Ok(llm) => llm,
            Err(ConfigError::MissingApiKey) if settings.uses_local_embeddings() => {
                warn!("no API key configured, chat model unavailable");
                Arc::new(UnconfiguredModel::new(&settings.chat_model))
            }
            Err(error) => return Err(error.into()),
        };
        let store = VectorStoreManager::open(settings, embedder)?;
        Ok(Self::from_parts(settings, store, llm))
    }

    pub fn from_parts(
        settings: &Settings,
        store: VectorStoreManager,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        let retriever = DocumentRetriever::new(settings.retrieval_k)
            .with_compressor(ContextCompressor::new(llm.clone()));

        let mut chatbot = Self {
            settings: settings.clone(),
            store,
            llm,
            retriever,
            memory: ConversationMemory::new(),
            chain: None,
        };
        chatbot.setup_chain();
        chatbot
    }

    fn setup_chain(&mut self) {
        self.chain = if self.store.is_populated() {
            Some(RagChain {
                retriever: self.retriever.clone(),
                params: GenerationParams {
                    temperature: self.settings.temperature,
                },
            })
        } else {
            warn!("vector store is empty, conversation chain not ready");
            None
        };
    }

    pub fn is_ready(&self) -> bool {
        self.chain.is_some()
    }

    pub fn store(&self) -> &VectorStoreManager {
        &self.store
    }

    pub async fn chat(&mut self, message: &str, method: RetrievalMethod) -> ChatResponse {
        let Some(chain) = &self.chain else {
            return ChatResponse::without_sources(NOT_READY_ANSWER);
        };

        match chain
            .invoke(&self.store, self.llm.as_ref(), &self.memory, message, method)
            .await
        {
            Ok(response) => {
                self.memory.push_exchange(message, response.answer.clone());
                info!(
                    %method,
                    sources = response.sources.len(),
                    turns = self.memory.len(),
                    "answered question"
                );
                response
            }
            Err(error) => {
                error!(error = %error, "chat turn failed");
                ChatResponse::without_sources(format!("Sorry, an error occurred: {error}"))
            }
        }
    }

    pub async fn get_relevant_context(&self, query: &str, method: RetrievalMethod) -> String {
        let documents = self
            .retriever
            .retrieve_documents(&self.store, query, method)
            .await;
        format_retrieved_context(&documents)
    }

    pub fn clear_memory(&mut self) {
        self.memory.clear();
        info!("conversation memory cleared");
    }

    pub fn get_conversation_history(&self) -> &[Turn] {
        self.memory.turns()
    }

    /// Stores chunks and rebuilds the chain so the new index is picked up.
    pub async fn add_documents_to_knowledge_base(
        &mut self,
        chunks: &[Document],
    ) -> Result<usize, SearchError> {
        let added = self.store.add_documents(chunks).await?;
        self.setup_chain();
        info!(added, "knowledge base updated");
        Ok(added)
    }

    pub fn reset_knowledge_base(&mut self) -> Result<(), SearchError> {
        self.store.reset()?;
        self.setup_chain();
        Ok(())
    }

    pub async fn search_documents(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchPreview>, SearchError> {
        let documents = self.store.similarity_search(query, Some(k)).await?;
        Ok(documents
            .into_iter()
            .map(|doc| SearchPreview {
                content: preview(&doc.content),
                source: doc.source().unwrap_or("Unknown").to_string(),
                metadata: doc.metadata,
            })
            .collect())
    }

    pub fn get_statistics(&self) -> Statistics {
        Statistics {
            vector_store_type: self.settings.vector_store_type.to_string(),
            embedding_model: self.store.embedder().model_name().to_string(),
            chat_model: self.llm.model_name().to_string(),
            chunk_size: self.settings.chunk_size,
            retrieval_k: self.settings.retrieval_k,
            conversation_length: self.memory.len(),
            indexed_chunks: self.store.len(),
        }
    }
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}
