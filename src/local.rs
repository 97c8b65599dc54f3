//! A vector store kept in memory and persisted as one JSON file per collection.
//!
//! Suitable for small corpora and for running without a Qdrant server. Search
//! is exhaustive cosine distance over every record.

use crate::database::{get_collection_name, ScoredChunk, VectorStore};
use crate::embeddings::{Embedder, Embedding};
use crate::error::{RagError, Result};
use crate::indexer::{ChunkMetadata, IndexedRecord};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

const BACKEND: &str = "local";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    text: String,
    metadata: ChunkMetadata,
    embedding: Embedding,
}

#[derive(Debug, Deserialize)]
struct CollectionFile {
    records: BTreeMap<u64, StoredRecord>,
}

pub struct LocalStore<E> {
    path: PathBuf,
    collection: String,
    embedder: E,
    records: RwLock<BTreeMap<u64, StoredRecord>>,
}

impl<E: Embedder> LocalStore<E> {
    /// Open `<dir>/<collection>.json`, creating an empty collection if the file is missing
    pub async fn open_or_create(dir: &Path, name: &str, embedder: E) -> Result<Self> {
        let collection = get_collection_name(name);
        let path = dir.join(format!("{}.json", collection));

        let records = match fs::read_to_string(&path) {
            Ok(content) => {
                let file: CollectionFile = serde_json::from_str(&content).map_err(|e| {
                    RagError::store(BACKEND, format!("corrupt collection {}: {}", path.display(), e))
                })?;
                info!(
                    "Using existing collection: {} ({} records)",
                    collection,
                    file.records.len()
                );
                file.records
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(dir).map_err(|e| RagError::store(BACKEND, e))?;
                let records = BTreeMap::new();
                persist(&path, &records)?;
                info!("Created collection: {}", collection);
                records
            }
            Err(e) => {
                return Err(RagError::store(
                    BACKEND,
                    format!("failed to read {}: {}", path.display(), e),
                ))
            }
        };

        Ok(LocalStore {
            path,
            collection,
            embedder,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<E: Embedder> VectorStore for LocalStore<E> {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn add(&self, records: Vec<IndexedRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let embedded = self.embed_records(records).await?;

        let mut stored = self.records.write().await;
        let mut updated = stored.clone();
        updated.extend(embedded);

        persist(&self.path, &updated)?;
        *stored = updated;

        Ok(())
    }

    async fn query(&self, query_text: &str, n_results: usize) -> Result<Vec<ScoredChunk>> {
        if self.records.read().await.is_empty() {
            return Ok(Vec::new());
        }

        // Embed without holding the lock; the call goes to a remote service
        let query_embedding = self.embedder.embed(query_text).await?;

        let stored = self.records.read().await;
        let mut scored: Vec<ScoredChunk> = stored
            .iter()
            .map(|(id, record)| ScoredChunk {
                id: *id,
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                distance: record.embedding.cosine_distance(&query_embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        scored.truncate(n_results);

        Ok(scored)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.records.read().await.len() as u64)
    }

    async fn replace_all(&self, records: Vec<IndexedRecord>) -> Result<()> {
        let replacement: BTreeMap<u64, StoredRecord> =
            self.embed_records(records).await?.into_iter().collect();

        let mut stored = self.records.write().await;
        persist(&self.path, &replacement)?;
        info!(
            "Replaced {} records in {} with {}",
            stored.len(),
            self.collection,
            replacement.len()
        );
        *stored = replacement;

        Ok(())
    }
}

impl<E: Embedder> LocalStore<E> {
    /// Embed the whole batch before touching the stored state
    async fn embed_records(&self, records: Vec<IndexedRecord>) -> Result<Vec<(u64, StoredRecord)>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != records.len() {
            return Err(RagError::malformed(
                "embedder",
                format!(
                    "expected {} embeddings, got {}",
                    records.len(),
                    embeddings.len()
                ),
            ));
        }

        Ok(records
            .into_iter()
            .zip(embeddings)
            .map(|(record, embedding)| {
                (
                    record.id,
                    StoredRecord {
                        text: record.text,
                        metadata: record.metadata,
                        embedding,
                    },
                )
            })
            .collect())
    }
}

/// Write the collection through a temporary file so a crash never leaves half a file
fn persist(path: &Path, records: &BTreeMap<u64, StoredRecord>) -> Result<()> {
    #[derive(Serialize)]
    struct CollectionFileRef<'a> {
        records: &'a BTreeMap<u64, StoredRecord>,
    }

    let content = serde_json::to_string(&CollectionFileRef { records })
        .map_err(|e| RagError::store(BACKEND, e))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, content).map_err(|e| RagError::store(BACKEND, e))?;
    fs::rename(&tmp_path, path).map_err(|e| RagError::store(BACKEND, e))?;

    Ok(())
}
