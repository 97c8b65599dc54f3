use crate::database::{ScoredChunk, VectorStore};
use crate::error::{RagError, Result};
use log::{debug, info};

/// What a retrieval produced
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// Nearest chunks, closest first
    Found(Vec<ScoredChunk>),
    /// The collection holds nothing close to the query (or nothing at all)
    NoRelevantInformation,
}

/// Trim a raw user question, rejecting blank input before any remote call
pub fn normalize_query(raw: &str) -> Result<&str> {
    let query = raw.trim();
    if query.is_empty() {
        return Err(RagError::EmptyQuery);
    }
    Ok(query)
}

/// Finds the `top_k` stored chunks nearest to a query
#[derive(Debug, Clone, Copy)]
pub struct Retriever {
    top_k: usize,
}

impl Retriever {
    pub fn new(top_k: usize) -> Self {
        Retriever { top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn retrieve<S: VectorStore>(&self, store: &S, query: &str) -> Result<Retrieval> {
        let chunks = store.query(query, self.top_k).await?;

        if chunks.is_empty() {
            info!("No relevant information found in {}", store.collection());
            return Ok(Retrieval::NoRelevantInformation);
        }

        debug!(
            "Retrieved {} chunks, best distance {:.4}",
            chunks.len(),
            chunks[0].distance
        );
        Ok(Retrieval::Found(chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  What is the refund policy? \n").unwrap(), "What is the refund policy?");
        assert!(matches!(normalize_query(""), Err(RagError::EmptyQuery)));
        assert!(matches!(normalize_query(" \t\n "), Err(RagError::EmptyQuery)));
    }
}
