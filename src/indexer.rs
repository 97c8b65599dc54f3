use crate::chunking::Chunk;
use crate::database::VectorStore;
use crate::error::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Metadata stored next to every chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Label of the source document
    pub source: String,
    /// Position of the chunk within its source
    pub chunk_index: usize,
}

/// A chunk ready to be written to the store
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRecord {
    pub id: u64,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Assign sequential ids over the whole batch.
///
/// Ingesting the same corpus again yields the same ids, so a rerun overwrites
/// the earlier records instead of duplicating them.
pub fn build_records(chunks: Vec<Chunk>) -> Vec<IndexedRecord> {
    chunks
        .into_iter()
        .enumerate()
        .map(|(id, chunk)| IndexedRecord {
            id: id as u64,
            text: chunk.text,
            metadata: ChunkMetadata {
                source: chunk.source,
                chunk_index: chunk.index,
            },
        })
        .collect()
}

/// Write all chunks to the store in one batch and return how many were written.
///
/// A failure means the batch as a whole must be retried; no partial progress
/// is reported.
pub async fn index_chunks<S: VectorStore>(store: &S, chunks: Vec<Chunk>) -> Result<usize> {
    let records = build_records(chunks);
    let count = records.len();
    if count == 0 {
        info!("Nothing to index in {}", store.collection());
        return Ok(0);
    }

    store.add(records).await?;
    info!("Indexed {} records into {}", count, store.collection());

    Ok(count)
}

/// Make the chunks the whole content of the collection.
///
/// With nothing to write the collection is left as it was, so an ingestion
/// run that found no text never wipes the records it was meant to refresh.
pub async fn replace_chunks<S: VectorStore>(store: &S, chunks: Vec<Chunk>) -> Result<usize> {
    let records = build_records(chunks);
    let count = records.len();
    if count == 0 {
        warn!("Nothing to index, keeping {} as it is", store.collection());
        return Ok(0);
    }

    store.replace_all(records).await?;
    info!("Replaced the content of {} with {} records", store.collection(), count);

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn chunk(text: &str, index: usize, source: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            index,
            source: source.to_string(),
        }
    }

    #[test]
    fn test_build_records_assigns_unique_ids_and_metadata() {
        let records = build_records(vec![
            chunk("first chunk of the handbook", 0, "handbook.pdf"),
            chunk("second chunk of the handbook", 2, "handbook.pdf"),
            chunk("first chunk of the faq", 0, "faq.txt"),
        ]);

        let ids: HashSet<u64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(records[1].metadata.source, "handbook.pdf");
        assert_eq!(records[1].metadata.chunk_index, 2);
        assert_eq!(records[2].metadata.source, "faq.txt");
    }

    #[test]
    fn test_build_records_is_stable() {
        let chunks = vec![chunk("a", 0, "x"), chunk("b", 1, "x")];
        assert_eq!(build_records(chunks.clone()), build_records(chunks));
    }

    #[test]
    fn test_metadata_serializes_as_map() {
        let metadata = ChunkMetadata {
            source: "faq.txt".to_string(),
            chunk_index: 4,
        };
        assert_eq!(
            serde_json::to_value(&metadata).unwrap(),
            serde_json::json!({"source": "faq.txt", "chunk_index": 4})
        );
    }
}
