use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{error, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use doc_rag::chat::{render, run_query_loop, ChatSession};
use doc_rag::chunking::DocumentChunker;
use doc_rag::config::{
    collection_from_env, tokenizer_path_from_env, RagConfig, StoreConfig, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE, DEFAULT_MIN_CHUNK_CHARS, DEFAULT_TOKENS_PER_CHUNK, DEFAULT_TOKEN_OVERLAP,
    DEFAULT_TOP_K,
};
use doc_rag::database::{Store, VectorStore};
use doc_rag::document::Document;
use doc_rag::gemini::{GeminiClient, GeminiConfig};
use doc_rag::generator::Generator;
use doc_rag::rag::RagEngine;
use doc_rag::tokenizer::{HfTokenizer, Tokenizer, WordTokenizer};

/// Question answering over your documents, grounded in retrieved passages
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Collection to read from and write to (defaults to RAG_COLLECTION)
    #[arg(long, global = true)]
    collection: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chunk, embed and store documents (supports text and PDF)
    Ingest {
        /// Paths of the documents to index
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Index again even if the collection already holds records
        #[arg(long)]
        force: bool,

        /// HuggingFace tokenizer.json matching the embedding model (defaults to RAG_TOKENIZER_PATH)
        #[arg(long)]
        tokenizer: Option<PathBuf>,

        #[command(flatten)]
        chunking: ChunkingArgs,
    },

    /// Ask questions interactively
    Chat {
        /// Number of passages used to ground each answer
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },

    /// Answer a single question and exit
    Ask {
        question: String,

        /// Number of passages used to ground the answer
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
}

#[derive(clap::Args, Debug)]
struct ChunkingArgs {
    /// Maximum characters per coarse chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared by consecutive coarse chunks
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Maximum tokens per embedded chunk
    #[arg(long, default_value_t = DEFAULT_TOKENS_PER_CHUNK)]
    tokens_per_chunk: usize,

    /// Tokens shared by consecutive embedded chunks
    #[arg(long, default_value_t = DEFAULT_TOKEN_OVERLAP)]
    token_overlap: usize,

    /// Chunks with no more characters than this are dropped
    #[arg(long, default_value_t = DEFAULT_MIN_CHUNK_CHARS)]
    min_chunk_chars: usize,
}

impl ChunkingArgs {
    fn to_config(&self) -> Result<RagConfig> {
        let config = RagConfig::builder()
            .chunk_size(self.chunk_size)
            .chunk_overlap(self.chunk_overlap)
            .tokens_per_chunk(self.tokens_per_chunk)
            .token_overlap(self.token_overlap)
            .min_chunk_chars(self.min_chunk_chars)
            .build()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let collection = cli.collection.unwrap_or_else(collection_from_env);

    // Validate credentials before touching the store
    let gemini_config = GeminiConfig::from_env().context("Missing GEMINI_API_KEY")?;
    let gemini = GeminiClient::new(gemini_config);

    let store_config = StoreConfig::from_env();
    let store = Store::open(&store_config, &collection, gemini.clone())
        .await
        .context("Failed to open vector store")?;

    match cli.command {
        Command::Ingest {
            files,
            force,
            tokenizer,
            chunking,
        } => {
            let config = chunking.to_config()?;
            let engine = RagEngine::new(store, gemini, &config);
            let tokenizer = tokenizer.or_else(tokenizer_path_from_env);
            ingest_files(&engine, &config, &files, tokenizer.as_deref(), force).await?;
            engine.shutdown();
        }
        Command::Chat { top_k } => {
            let engine = query_engine(store, gemini, top_k)?;
            if engine.record_count().await? == 0 {
                warn!("Collection {} is empty; run `ingest` first", engine.store().collection());
            }

            let mut session = ChatSession::new();
            run_query_loop(&engine, &mut session, io::stdin().lock(), io::stdout())
                .await
                .context("Error in query loop")?;
            engine.shutdown();
        }
        Command::Ask { question, top_k } => {
            let engine = query_engine(store, gemini, top_k)?;
            let answer = ask_once(&engine, &question).await;
            engine.shutdown();
            println!("{}", answer?);
        }
    }

    Ok(())
}

fn query_engine<S: VectorStore, G: Generator>(
    store: S,
    generator: G,
    top_k: usize,
) -> Result<RagEngine<S, G>> {
    let config = RagConfig::builder().top_k(top_k).build()?;
    Ok(RagEngine::new(store, generator, &config))
}

/// Answer one question; a failed answer is an error so the exit status reflects it
async fn ask_once<S: VectorStore, G: Generator>(
    engine: &RagEngine<S, G>,
    question: &str,
) -> Result<String> {
    let outcome = engine
        .answer(question)
        .await
        .context("Failed to answer question")?;
    Ok(render(Ok(outcome)))
}

async fn ingest_files<S: VectorStore, G: Generator>(
    engine: &RagEngine<S, G>,
    config: &RagConfig,
    files: &[PathBuf],
    tokenizer_path: Option<&Path>,
    force: bool,
) -> Result<()> {
    // Only process files if the collection has not been built yet
    let existing = engine.record_count().await?;
    if existing > 0 && !force {
        info!(
            "Using existing collection: {} ({} records). Pass --force to index again.",
            engine.store().collection(),
            existing
        );
        return Ok(());
    }

    let tokenizer: Arc<dyn Tokenizer> = match tokenizer_path {
        Some(path) => Arc::new(HfTokenizer::from_file(path).context("Failed to load tokenizer")?),
        None => {
            warn!("No tokenizer configured; counting tokens with the built-in word tokenizer");
            Arc::new(WordTokenizer)
        }
    };
    let chunker = DocumentChunker::new(config, tokenizer)?;

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        // Validate input file exists
        if !path.exists() {
            error!("File not found: {}", path.display());
            return Err(anyhow::anyhow!("File not found: {}", path.display()));
        }
        let document = Document::from_file(path)
            .with_context(|| format!("Failed to process document {}", path.display()))?;
        info!(
            "Loaded {} ({}, {} pages with text)",
            document.label,
            document.mime_type,
            document.pages.len()
        );
        documents.push(document);
    }

    // Documents are loaded before any stored record is replaced
    let report = if existing > 0 {
        warn!(
            "Replacing {} records in {}",
            existing,
            engine.store().collection()
        );
        engine.reingest(&chunker, &documents).await
    } else {
        engine.ingest(&chunker, &documents).await
    }
    .context("Failed to index documents")?;
    info!(
        "Indexed {} records from {} documents into {}",
        report.records,
        report.documents,
        engine.store().collection()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_rag::chat::NO_INFORMATION_MESSAGE;
    use doc_rag::embeddings::{Embedder, Embedding};
    use doc_rag::error::RagError;
    use doc_rag::indexer::{ChunkMetadata, IndexedRecord};
    use doc_rag::local::LocalStore;
    use std::fs;

    /// Letter counts over a-z
    struct LetterEmbedder {
        fail: bool,
    }

    impl Embedder for LetterEmbedder {
        async fn embed(&self, text: &str) -> doc_rag::error::Result<Embedding> {
            if self.fail {
                return Err(RagError::ModelUnavailable {
                    service: "letters".to_string(),
                    message: "offline".to_string(),
                });
            }
            let mut values = vec![0.0; 26];
            for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
                values[(c as u8 - b'a') as usize] += 1.0;
            }
            Ok(Embedding::new(values))
        }

        fn dimensions(&self) -> usize {
            26
        }
    }

    struct FixedGenerator {
        fail: bool,
    }

    impl Generator for FixedGenerator {
        async fn generate(&self, _prompt: &str) -> doc_rag::error::Result<String> {
            if self.fail {
                return Err(RagError::ModelUnavailable {
                    service: "fixed".to_string(),
                    message: "quota exceeded".to_string(),
                });
            }
            Ok("Refunds take five business days.".to_string())
        }
    }

    type TestEngine = RagEngine<LocalStore<LetterEmbedder>, FixedGenerator>;

    /// A local collection holding one record, reopened with the given embedder
    async fn populated_store(dir: &Path, embedder_fails: bool) -> LocalStore<LetterEmbedder> {
        let store = LocalStore::open_or_create(dir, "kb", LetterEmbedder { fail: false })
            .await
            .unwrap();
        store
            .add(vec![IndexedRecord {
                id: 0,
                text: "Refunds are issued within five business days.".to_string(),
                metadata: ChunkMetadata {
                    source: "policy.txt".to_string(),
                    chunk_index: 0,
                },
            }])
            .await
            .unwrap();
        drop(store);

        LocalStore::open_or_create(dir, "kb", LetterEmbedder { fail: embedder_fails })
            .await
            .unwrap()
    }

    async fn populated_engine(dir: &Path, embedder_fails: bool) -> TestEngine {
        let store = populated_store(dir, embedder_fails).await;
        RagEngine::new(store, FixedGenerator { fail: false }, &RagConfig::default())
    }

    fn text_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_forced_ingest_with_missing_file_keeps_collection() {
        let dir = tempfile::tempdir().unwrap();
        let engine = populated_engine(dir.path(), false).await;

        let result = ingest_files(
            &engine,
            &RagConfig::default(),
            &[PathBuf::from("/nonexistent/typo.pdf")],
            None,
            true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(engine.record_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_forced_ingest_with_failing_embedder_keeps_collection() {
        let dir = tempfile::tempdir().unwrap();
        let engine = populated_engine(dir.path(), true).await;
        let file = text_file(
            dir.path(),
            "faq.txt",
            "Support is available from nine to five on weekdays.",
        );

        let result = ingest_files(&engine, &RagConfig::default(), &[file], None, true).await;

        assert!(result.is_err());
        assert_eq!(engine.record_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_forced_ingest_with_bad_tokenizer_keeps_collection() {
        let dir = tempfile::tempdir().unwrap();
        let engine = populated_engine(dir.path(), false).await;
        let file = text_file(
            dir.path(),
            "faq.txt",
            "Support is available from nine to five on weekdays.",
        );
        let tokenizer = dir.path().join("missing-tokenizer.json");

        let result = ingest_files(
            &engine,
            &RagConfig::default(),
            &[file],
            Some(tokenizer.as_path()),
            true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(engine.record_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_forced_ingest_replaces_collection() {
        let dir = tempfile::tempdir().unwrap();
        let engine = populated_engine(dir.path(), false).await;
        let first = text_file(
            dir.path(),
            "faq.txt",
            "Support is available from nine to five on weekdays.",
        );
        let second = text_file(
            dir.path(),
            "shipping.txt",
            "Standard shipping takes four to six business days.",
        );

        ingest_files(&engine, &RagConfig::default(), &[first, second], None, true)
            .await
            .unwrap();

        let hits = engine.store().query("shipping", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.metadata.source != "policy.txt"));
    }

    #[tokio::test]
    async fn test_ingest_without_force_keeps_populated_collection() {
        let dir = tempfile::tempdir().unwrap();
        let engine = populated_engine(dir.path(), false).await;
        let file = text_file(
            dir.path(),
            "faq.txt",
            "Support is available from nine to five on weekdays.",
        );

        ingest_files(&engine, &RagConfig::default(), &[file], None, false)
            .await
            .unwrap();

        let hits = engine.store().query("refunds", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.source, "policy.txt");
    }

    #[tokio::test]
    async fn test_ask_once_answers_from_collection() {
        let dir = tempfile::tempdir().unwrap();
        let engine = populated_engine(dir.path(), false).await;

        let answer = ask_once(&engine, "How long do refunds take?").await.unwrap();

        assert_eq!(answer, "Refunds take five business days.");
    }

    #[tokio::test]
    async fn test_ask_once_no_match_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open_or_create(dir.path(), "kb", LetterEmbedder { fail: false })
            .await
            .unwrap();
        let engine = RagEngine::new(store, FixedGenerator { fail: false }, &RagConfig::default());

        let answer = ask_once(&engine, "Is there a warranty?").await.unwrap();

        assert_eq!(answer, NO_INFORMATION_MESSAGE);
        assert!(ask_once(&engine, "   ").await.is_err());
    }

    #[tokio::test]
    async fn test_ask_once_reports_generator_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = populated_store(dir.path(), false).await;
        let engine = RagEngine::new(store, FixedGenerator { fail: true }, &RagConfig::default());

        assert!(ask_once(&engine, "How long do refunds take?").await.is_err());
    }
}
