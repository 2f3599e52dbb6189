use crate::chatbot::RagChatbot;
use crate::chunking::{ChunkingConfig, TextProcessor};
use crate::config::Settings;
use crate::error::{ConfigError, SessionError};
use crate::files::{scan_documents_directory, FileInfo};
use crate::loader::{DocumentLoader, SkippedFile};
use crate::models::{ChatResponse, RetrievalMethod, SearchPreview, Statistics};
use crate::stores::purge_index;
use crate::SearchError;
use serde::Serialize;
use tracing::{info, warn};

pub type ChatbotFactory = Box<dyn Fn(&Settings) -> Result<RagChatbot, SearchError> + Send + Sync>;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A message as shown to the user, with the sources cited for answers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DisplayedMessage {
    pub role: MessageRole,
    pub content: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    pub documents: usize,
    pub chunks: usize,
    pub skipped_files: Vec<SkippedFile>,
}

/// State of one interactive session. The chatbot is created on first use.
pub struct Session {
    settings: Settings,
    factory: ChatbotFactory,
    chatbot: Option<RagChatbot>,
    messages: Vec<DisplayedMessage>,
    documents_loaded: bool,
    retrieval_method: RetrievalMethod,
    document_files: Vec<FileInfo>,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self::with_factory(settings, Box::new(RagChatbot::new))
    }

    pub fn with_factory(settings: Settings, factory: ChatbotFactory) -> Self {
        Self {
            settings,
            factory,
            chatbot: None,
            messages: Vec::new(),
            documents_loaded: false,
            retrieval_method: RetrievalMethod::default(),
            document_files: Vec::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn messages(&self) -> &[DisplayedMessage] {
        &self.messages
    }

    pub fn documents_loaded(&self) -> bool {
        self.documents_loaded
    }

    pub fn retrieval_method(&self) -> RetrievalMethod {
        self.retrieval_method
    }

    pub fn document_files(&self) -> &[FileInfo] {
        &self.document_files
    }

    pub fn chatbot(&self) -> Option<&RagChatbot> {
        self.chatbot.as_ref()
    }

    fn ensure_chatbot(&mut self) -> Result<&mut RagChatbot, SessionError> {
        let chatbot = match &mut self.chatbot {
            Some(chatbot) => chatbot,
            slot => slot.insert((self.factory)(&self.settings)?),
        };
        if chatbot.is_ready() {
            self.documents_loaded = true;
        }
        Ok(chatbot)
    }

    /// Opens the chatbot so a previously persisted index is picked up.
    pub fn open(&mut self) -> Result<bool, SessionError> {
        self.ensure_chatbot()?;
        Ok(self.documents_loaded)
    }

    pub fn scan_documents(&mut self) -> &[FileInfo] {
        self.document_files = scan_documents_directory(&self.settings.documents_dir);
        info!(
            directory = %self.settings.documents_dir.display(),
            found = self.document_files.len(),
            "scanned documents directory"
        );
        &self.document_files
    }

    /// Load, chunk and index every document in the documents directory.
    pub async fn load_documents(&mut self) -> Result<LoadSummary, SessionError> {
        if self.settings.requires_api_key() && self.settings.openai_api_key.is_none() {
            return Err(ConfigError::MissingApiKey.into());
        }

        let report = DocumentLoader::new(&self.settings.documents_dir).load_report()?;
        let mut summary = LoadSummary {
            documents: report.documents.len(),
            chunks: 0,
            skipped_files: report.skipped_files,
        };
        if report.documents.is_empty() {
            warn!("no documents found to load");
            return Ok(summary);
        }

        let processor = TextProcessor::with_config(ChunkingConfig::from(&self.settings))?;
        let chunks = processor.process_documents(&report.documents);

        let chatbot = self.ensure_chatbot()?;
        summary.chunks = chatbot.add_documents_to_knowledge_base(&chunks).await?;
        self.documents_loaded = chatbot.is_ready();

        info!(
            documents = summary.documents,
            chunks = summary.chunks,
            "documents loaded into vector store"
        );
        Ok(summary)
    }

    /// Drops the index and its files, and forgets the chatbot.
    pub fn reset_vector_store(&mut self) -> Result<(), SessionError> {
        match self.chatbot.take() {
            Some(mut chatbot) => chatbot.reset_knowledge_base()?,
            None => purge_index(
                self.settings.vector_store_type,
                &self.settings.persist_directory,
            )?,
        }
        self.documents_loaded = false;
        info!("vector store reset");
        Ok(())
    }

    pub fn clear_chat(&mut self) {
        self.messages.clear();
        if let Some(chatbot) = &mut self.chatbot {
            chatbot.clear_memory();
        }
    }

    pub fn set_retrieval_method(&mut self, name: &str) -> Result<RetrievalMethod, SessionError> {
        let method: RetrievalMethod = name.trim().parse()?;
        self.retrieval_method = method;
        Ok(method)
    }

    pub async fn send_message(&mut self, text: &str) -> Result<ChatResponse, SessionError> {
        let method = self.retrieval_method;
        let chatbot = self.ensure_chatbot()?;
        let response = chatbot.chat(text, method).await;

        self.messages.push(DisplayedMessage {
            role: MessageRole::User,
            content: text.to_string(),
            sources: Vec::new(),
        });
        self.messages.push(DisplayedMessage {
            role: MessageRole::Assistant,
            content: response.answer.clone(),
            sources: response.sources.clone(),
        });
        Ok(response)
    }

    pub async fn search(&mut self, query: &str, k: usize) -> Result<Vec<SearchPreview>, SessionError> {
        let chatbot = self.ensure_chatbot()?;
        Ok(chatbot.search_documents(query, k).await?)
    }

    pub fn statistics(&self) -> Option<Statistics> {
        self.chatbot.as_ref().map(RagChatbot::get_statistics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::prompt::NOT_READY_ANSWER;
    use crate::vector_store::testing::{local_settings, open_local};
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn scripted_session(root: &Path, answer: &'static str) -> Session {
        let settings = Settings {
            documents_dir: root.join("documents"),
            chunk_size: 60,
            chunk_overlap: 10,
            ..local_settings(&root.join("vectorstore"))
        };
        Session::with_factory(
            settings,
            Box::new(move |settings: &Settings| {
                let store = open_local(settings)?;
                let model = Arc::new(ScriptedModel::replying(answer));
                Ok(RagChatbot::from_parts(settings, store, model))
            }),
        )
    }

    fn workspace() -> Result<TempDir, std::io::Error> {
        let dir = tempdir()?;
        let documents = dir.path().join("documents");
        fs::create_dir_all(&documents)?;
        fs::write(
            documents.join("garden.txt"),
            "Tomatoes need full sun. Water them regularly in the morning. Mulch keeps roots cool.",
        )?;
        fs::write(documents.join("prices.json"), r#"{"2024": {"05": {"01": {"price": 10}}}}"#)?;
        fs::write(documents.join("readme.docx"), "not loaded")?;
        Ok(dir)
    }

    #[tokio::test]
    async fn load_then_chat_records_messages() -> Result<(), Box<dyn std::error::Error>> {
        let dir = workspace()?;
        let mut session = scripted_session(dir.path(), "Full sun.");

        assert_eq!(session.scan_documents().len(), 3);

        let summary = session.load_documents().await?;
        assert_eq!(summary.documents, 2);
        assert!(summary.chunks >= 2);
        assert!(session.documents_loaded());

        let response = session.send_message("What do tomatoes need?").await?;
        assert_eq!(response.answer, "Full sun.");
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].role, MessageRole::Assistant);
        assert_eq!(session.messages()[1].sources, response.sources);

        let stats = session.statistics().ok_or("no statistics")?;
        assert_eq!(stats.conversation_length, 2);
        assert_eq!(stats.indexed_chunks, summary.chunks);
        Ok(())
    }

    #[tokio::test]
    async fn blank_documents_do_not_mark_session_loaded() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let documents = dir.path().join("documents");
        fs::create_dir_all(&documents)?;
        fs::write(documents.join("empty.txt"), "   \n\n  ")?;

        let mut session = scripted_session(dir.path(), "unused");
        let summary = session.load_documents().await?;
        assert_eq!(summary.chunks, 0);
        assert!(!session.documents_loaded());
        assert_eq!(session.chatbot().map(RagChatbot::is_ready), Some(false));
        Ok(())
    }

    #[tokio::test]
    async fn chat_before_loading_is_not_ready() -> Result<(), Box<dyn std::error::Error>> {
        let dir = workspace()?;
        let mut session = scripted_session(dir.path(), "unused");

        let response = session.send_message("Hello").await?;
        assert_eq!(response.answer, NOT_READY_ANSWER);
        assert!(!session.documents_loaded());
        assert_eq!(session.statistics().ok_or("no statistics")?.conversation_length, 0);
        Ok(())
    }

    #[tokio::test]
    async fn persisted_index_is_picked_up_by_new_session() -> Result<(), Box<dyn std::error::Error>> {
        let dir = workspace()?;
        scripted_session(dir.path(), "ok").load_documents().await?;

        let mut session = scripted_session(dir.path(), "ok");
        assert!(!session.documents_loaded());
        assert!(session.open()?);
        Ok(())
    }

    #[tokio::test]
    async fn reset_clears_loaded_state_and_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = workspace()?;
        let mut session = scripted_session(dir.path(), "ok");
        session.load_documents().await?;

        session.reset_vector_store()?;
        assert!(!session.documents_loaded());
        assert!(session.chatbot().is_none());
        assert!(!scripted_session(dir.path(), "ok").open()?);
        Ok(())
    }

    #[tokio::test]
    async fn reset_without_chatbot_purges_persisted_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = workspace()?;
        scripted_session(dir.path(), "ok").load_documents().await?;

        let mut fresh = scripted_session(dir.path(), "ok");
        fresh.reset_vector_store()?;
        assert!(!scripted_session(dir.path(), "ok").open()?);
        Ok(())
    }

    #[tokio::test]
    async fn clear_chat_empties_messages_and_memory() -> Result<(), Box<dyn std::error::Error>> {
        let dir = workspace()?;
        let mut session = scripted_session(dir.path(), "ok");
        session.load_documents().await?;
        session.send_message("tomatoes?").await?;

        session.clear_chat();
        assert!(session.messages().is_empty());
        assert_eq!(session.statistics().ok_or("no statistics")?.conversation_length, 0);
        Ok(())
    }

    #[test]
    fn retrieval_method_is_validated() {
        let mut session = Session::new(Settings::default());
        assert!(matches!(
            session.set_retrieval_method("hybrid"),
            Ok(RetrievalMethod::Hybrid)
        ));
        assert!(matches!(
            session.set_retrieval_method("mmr"),
            Err(SessionError::Search(SearchError::UnknownMethod(_)))
        ));
        assert_eq!(session.retrieval_method(), RetrievalMethod::Hybrid);
    }

    #[tokio::test]
    async fn remote_embeddings_require_api_key() {
        let mut session = Session::new(Settings::default());
        assert!(matches!(
            session.load_documents().await,
            Err(SessionError::Config(ConfigError::MissingApiKey))
        ));
    }

    #[tokio::test]
    async fn missing_documents_directory_is_reported() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut session = scripted_session(dir.path(), "ok");
        assert!(matches!(
            session.load_documents().await,
            Err(SessionError::Ingest(crate::IngestError::DirectoryNotFound(_)))
        ));
        Ok(())
    }
}
