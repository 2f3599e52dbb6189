pub mod chatbot;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod files;
pub mod llm;
pub mod loader;
pub mod memory;
pub mod models;
pub mod prompt;
pub mod retriever;
pub mod session;
pub mod stores;
pub mod traits;
pub mod vector_store;

pub use chatbot::RagChatbot;
pub use chunking::{clean_text, ChunkingConfig, TextProcessor};
pub use config::{Settings, VectorStoreKind, LOCAL_EMBEDDING_MODEL};
pub use embeddings::{
    build_embedder, CharacterNgramEmbedder, Embedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ConfigError, IngestError, SearchError, SessionError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use files::{backup_vector_store, format_file_size, scan_documents_directory, FileInfo};
pub use llm::{build_language_model, ChatMessage, GenerationParams, LanguageModel, OpenAiChatModel};
pub use loader::{DocumentLoader, LoadReport, SkippedFile};
pub use memory::{ConversationMemory, Speaker, Turn};
pub use models::{
    ChatResponse, Document, Metadata, RetrievalMethod, ScoredDocument, SearchPreview, Statistics,
};
pub use retriever::{
    deduplicate_documents, format_retrieved_context, get_document_sources, ContextCompressor,
    DocumentRetriever,
};
pub use session::{DisplayedMessage, LoadSummary, MessageRole, Session};
pub use stores::{ChromaStore, FaissStore};
pub use traits::{IndexedRecord, VectorIndex};
pub use vector_store::{StoreRetriever, VectorStoreManager};
