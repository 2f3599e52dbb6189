use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use docchat_core::files::{create_directory_structure, truncate_text, validate_api_key};
use docchat_core::{
    backup_vector_store, ChatResponse, ConfigError, Session, Settings, Statistics, VectorStoreKind,
};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docchat", version, about = "Chat with a folder of documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Folder scanned recursively for documents. Overrides DOCUMENTS_DIR.
    #[arg(long)]
    documents_dir: Option<PathBuf>,

    /// Folder holding the persisted vector index. Overrides PERSIST_DIRECTORY.
    #[arg(long)]
    persist_directory: Option<PathBuf>,

    /// On-disk index layout (chroma or faiss). Overrides VECTOR_STORE_TYPE.
    #[arg(long)]
    vector_store_type: Option<VectorStoreKind>,

    /// Embedding model; `char-ngram` embeds locally without an API key.
    #[arg(long)]
    embedding_model: Option<String>,

    /// Chat completion model. Overrides CHAT_MODEL.
    #[arg(long)]
    chat_model: Option<String>,

    /// Number of chunks retrieved per question. Overrides RETRIEVAL_K.
    #[arg(long)]
    retrieval_k: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Create the data directory layout.
    Init {
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// List documents available for loading.
    Scan,
    /// Load, chunk and index every document.
    Load,
    /// Delete the vector index.
    Reset,
    /// Ask a single question.
    Ask {
        #[arg(long)]
        question: String,
        /// similarity, compression or hybrid.
        #[arg(long, default_value = "similarity")]
        method: String,
    },
    /// Interactive chat.
    Chat {
        #[arg(long, default_value = "similarity")]
        method: String,
    },
    /// Show the nearest chunks for a query.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "5")]
        k: usize,
    },
    /// Print the context block a question would be answered from.
    Context {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "similarity")]
        method: String,
    },
    /// Print configuration and index statistics.
    Stats,
    /// Copy the vector index to `{dest}_backup_{timestamp}`.
    Backup {
        #[arg(long)]
        dest: PathBuf,
    },
}

impl Cli {
    /// Flag values keyed by the environment variable they replace.
    fn overrides(&self) -> HashMap<&'static str, String> {
        let mut overrides = HashMap::new();
        if let Some(dir) = &self.documents_dir {
            overrides.insert("DOCUMENTS_DIR", dir.display().to_string());
        }
        if let Some(dir) = &self.persist_directory {
            overrides.insert("PERSIST_DIRECTORY", dir.display().to_string());
        }
        if let Some(kind) = self.vector_store_type {
            overrides.insert("VECTOR_STORE_TYPE", kind.to_string());
        }
        if let Some(model) = &self.embedding_model {
            overrides.insert("EMBEDDING_MODEL", model.clone());
        }
        if let Some(model) = &self.chat_model {
            overrides.insert("CHAT_MODEL", model.clone());
        }
        if let Some(k) = self.retrieval_k {
            overrides.insert("RETRIEVAL_K", k.to_string());
        }
        overrides
    }

    /// Flags win over `env`; the merged values are parsed and validated once.
    fn settings_from<F>(&self, env: F) -> Result<Settings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides = self.overrides();
        Settings::from_lookup(|key| overrides.get(key).cloned().or_else(|| env(key)))
    }

    fn settings(&self) -> anyhow::Result<Settings> {
        self.settings_from(|key| std::env::var(key).ok())
            .context("invalid configuration")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            return Err(error).context("failed to read .env");
        }
    }

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = cli.settings()?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        backend = %settings.vector_store_type,
        "docchat boot"
    );
    if let Some(key) = &settings.openai_api_key {
        if !validate_api_key(key) {
            warn!("OPENAI_API_KEY does not look like an OpenAI key");
        }
    }

    let mut session = Session::new(settings);

    match cli.command {
        Command::Init { root } => {
            for dir in create_directory_structure(&root)? {
                println!("created {}", dir.display());
            }
        }
        Command::Scan => {
            let files = session.scan_documents().to_vec();
            if files.is_empty() {
                println!(
                    "no documents found in {}",
                    session.settings().documents_dir.display()
                );
            }
            for file in &files {
                println!(
                    "{:<40} {:<6} {:>10} {}",
                    file.name,
                    file.extension,
                    file.size_formatted,
                    file.modified.format("%Y-%m-%d")
                );
            }
        }
        Command::Load => {
            let summary = session
                .load_documents()
                .await
                .context("error loading documents")?;

            for skipped in &summary.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
            }
            if summary.documents == 0 {
                println!("no documents found to load");
            } else {
                println!(
                    "loaded {} document chunks from {} documents ({} files skipped)",
                    summary.chunks,
                    summary.documents,
                    summary.skipped_files.len()
                );
            }
        }
        Command::Reset => {
            session.reset_vector_store()?;
            println!("vector store reset");
        }
        Command::Ask { question, method } => {
            session.set_retrieval_method(&method)?;
            let response = session.send_message(&question).await?;
            print_response(&response);
        }
        Command::Chat { method } => {
            session.set_retrieval_method(&method)?;
            run_repl(&mut session).await?;
        }
        Command::Search { query, k } => {
            let previews = session.search(&query, k).await?;
            if previews.is_empty() {
                println!("no results (is the vector store loaded?)");
            }
            for (index, preview) in previews.iter().enumerate() {
                println!("[{}] {}", index + 1, preview.source);
                println!("  {}", preview.content.replace('\n', " "));
            }
        }
        Command::Context { query, method } => {
            let method = session.set_retrieval_method(&method)?;
            session.open()?;
            if let Some(chatbot) = session.chatbot() {
                println!("{}", chatbot.get_relevant_context(&query, method).await);
            }
        }
        Command::Stats => {
            session.open()?;
            if let Some(stats) = session.statistics() {
                print_statistics(&stats);
            }
        }
        Command::Backup { dest } => {
            match backup_vector_store(&session.settings().persist_directory, &dest)? {
                Some(path) => println!("vector store backed up to {}", path.display()),
                None => println!("no vector store found to back up"),
            }
        }
    }

    Ok(())
}

async fn run_repl(session: &mut Session) -> anyhow::Result<()> {
    if !session.open()? {
        println!("No documents loaded yet. Run `docchat load` first.");
    }
    println!(
        "Ask about your documents (method: {}). Commands: /clear /history /stats /method <name> /quit",
        session.retrieval_method()
    );

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let input = line.trim();

        match input.split_once(' ').unwrap_or((input, "")) {
            ("", _) => continue,
            ("/quit" | "/exit", _) => break,
            ("/clear", _) => {
                session.clear_chat();
                println!("chat cleared");
            }
            ("/history", _) => {
                for message in session.messages() {
                    println!("{:?}: {}", message.role, truncate_text(&message.content, 120));
                }
            }
            ("/stats", _) => {
                if let Some(stats) = session.statistics() {
                    print_statistics(&stats);
                }
            }
            ("/method", name) => match session.set_retrieval_method(name) {
                Ok(method) => println!("retrieval method: {method}"),
                Err(error) => println!("{error}"),
            },
            _ => {
                let response = session.send_message(input).await?;
                print_response(&response);
            }
        }
    }
    Ok(())
}

fn print_response(response: &ChatResponse) {
    println!("{}", response.answer.trim());
    if !response.sources.is_empty() {
        println!("\nSources:");
        for source in &response.sources {
            println!("- {source}");
        }
    }
}

fn print_statistics(stats: &Statistics) {
    println!("vector store:    {}", stats.vector_store_type);
    println!("embedding model: {}", stats.embedding_model);
    println!("chat model:      {}", stats.chat_model);
    println!("chunk size:      {}", stats.chunk_size);
    println!("retrieval k:     {}", stats.retrieval_k);
    println!("conversation:    {} messages", stats.conversation_length);
    println!("indexed chunks:  {}", stats.indexed_chunks);
}
