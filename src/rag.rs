use crate::chunking::{Chunk, DocumentChunker};
use crate::config::RagConfig;
use crate::database::VectorStore;
use crate::document::Document;
use crate::error::Result;
use crate::generator::Generator;
use crate::indexer::{index_chunks, replace_chunks};
use crate::prompt::PromptTemplate;
use crate::retrieval::{normalize_query, Retrieval, Retriever};
use log::{info, warn};

/// Terminal outcome of one question
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The generator's text, unmodified
    Answer(String),
    /// Retrieval found nothing to ground an answer on
    NoRelevantInformation,
}

/// Summary of an ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestReport {
    pub documents: usize,
    pub records: usize,
}

/// RAG (Retrieval-Augmented Generation) engine.
///
/// Owns the opened store and the generator for the lifetime of the process
/// and is shared by every front-end.
pub struct RagEngine<S, G> {
    store: S,
    generator: G,
    retriever: Retriever,
    template: PromptTemplate,
}

impl<S: VectorStore, G: Generator> RagEngine<S, G> {
    /// Create a new RAG engine around an already opened store
    pub fn new(store: S, generator: G, config: &RagConfig) -> Self {
        RagEngine {
            store,
            generator,
            retriever: Retriever::new(config.top_k),
            template: PromptTemplate::default(),
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of records already in the collection
    pub async fn record_count(&self) -> Result<u64> {
        self.store.count().await
    }

    /// Chunk every document and write all chunks to the store in one batch
    pub async fn ingest(
        &self,
        chunker: &DocumentChunker,
        documents: &[Document],
    ) -> Result<IngestReport> {
        let (processed, chunks) = chunk_documents(chunker, documents)?;
        let records = index_chunks(&self.store, chunks).await?;

        Ok(IngestReport {
            documents: processed,
            records,
        })
    }

    /// Like [`RagEngine::ingest`], but the new chunks replace the whole collection.
    ///
    /// Every document is chunked and embedded before anything stored is
    /// removed, so a failed run leaves the previous collection in place.
    pub async fn reingest(
        &self,
        chunker: &DocumentChunker,
        documents: &[Document],
    ) -> Result<IngestReport> {
        let (processed, chunks) = chunk_documents(chunker, documents)?;
        let records = replace_chunks(&self.store, chunks).await?;

        Ok(IngestReport {
            documents: processed,
            records,
        })
    }

    /// Answer one question from the stored documents
    pub async fn answer(&self, raw_query: &str) -> Result<QueryOutcome> {
        let query = normalize_query(raw_query)?;

        let chunks = match self.retriever.retrieve(&self.store, query).await? {
            Retrieval::Found(chunks) => chunks,
            Retrieval::NoRelevantInformation => return Ok(QueryOutcome::NoRelevantInformation),
        };

        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let prompt = self.template.assemble(query, &texts);

        let answer = self.generator.generate(&prompt).await?;
        info!("Generated answer from {} chunks", chunks.len());

        Ok(QueryOutcome::Answer(answer))
    }

    /// Release the store handle and the model client
    pub fn shutdown(self) {
        info!("Closing collection {}", self.store.collection());
    }
}

fn chunk_documents(
    chunker: &DocumentChunker,
    documents: &[Document],
) -> Result<(usize, Vec<Chunk>)> {
    let mut chunks = Vec::new();
    let mut processed = 0;

    for document in documents {
        if document.is_empty() {
            warn!("{} has no extractable text, skipping", document.label);
            continue;
        }
        chunks.extend(chunker.chunk_document(document)?);
        processed += 1;
    }

    info!(
        "Split {} documents into {} chunks",
        processed,
        chunks.len()
    );
    Ok((processed, chunks))
}
