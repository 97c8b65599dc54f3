//! Pipeline tuning and environment-sourced settings.

use crate::database::QdrantConfig;
use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_CHUNK_SIZE: usize = 2000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_TOKENS_PER_CHUNK: usize = 256;
pub const DEFAULT_TOKEN_OVERLAP: usize = 20;
pub const DEFAULT_MIN_CHUNK_CHARS: usize = 30;
pub const DEFAULT_TOP_K: usize = 5;

const DEFAULT_COLLECTION: &str = "documents";
const DEFAULT_STORE_DIR: &str = "./rag_store";

/// Chunking and retrieval parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum characters per coarse chunk.
    pub chunk_size: usize,
    /// Characters shared between consecutive coarse chunks.
    pub chunk_overlap: usize,
    /// Maximum tokens per fine chunk.
    pub tokens_per_chunk: usize,
    /// Tokens shared between consecutive fine chunks.
    pub token_overlap: usize,
    /// Chunks whose trimmed length is not above this are dropped.
    pub min_chunk_chars: usize,
    /// Number of nearest chunks fed into the prompt.
    pub top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        RagConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            tokens_per_chunk: DEFAULT_TOKENS_PER_CHUNK,
            token_overlap: DEFAULT_TOKEN_OVERLAP,
            min_chunk_chars: DEFAULT_MIN_CHUNK_CHARS,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl RagConfig {
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters describe a splitter that always makes progress.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.tokens_per_chunk == 0 {
            return Err(RagError::Config(
                "chunk_size and tokens_per_chunk must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.token_overlap >= self.tokens_per_chunk {
            return Err(RagError::Config(format!(
                "token_overlap ({}) must be less than tokens_per_chunk ({})",
                self.token_overlap, self.tokens_per_chunk
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Config(
                "top_k must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    pub fn tokens_per_chunk(mut self, tokens: usize) -> Self {
        self.config.tokens_per_chunk = tokens;
        self
    }

    pub fn token_overlap(mut self, overlap: usize) -> Self {
        self.config.token_overlap = overlap;
        self
    }

    pub fn min_chunk_chars(mut self, chars: usize) -> Self {
        self.config.min_chunk_chars = chars;
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when an overlap is not smaller than its
    /// budget or a budget is zero.
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Where records live between runs.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreConfig {
    /// A Qdrant server.
    Qdrant(QdrantConfig),
    /// JSON files under a local directory.
    Local { dir: PathBuf },
}

impl StoreConfig {
    /// Pick the backend from the environment: Qdrant when `QDRANT_URL` is set,
    /// otherwise the local store under `RAG_STORE_DIR`.
    pub fn from_env() -> Self {
        match QdrantConfig::from_env() {
            Ok(qdrant) if !qdrant.url.trim().is_empty() => StoreConfig::Qdrant(qdrant),
            _ => StoreConfig::Local {
                dir: env::var("RAG_STORE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORE_DIR)),
            },
        }
    }
}

/// Collection name from `RAG_COLLECTION`, falling back to a default.
pub fn collection_from_env() -> String {
    env::var("RAG_COLLECTION").unwrap_or_else(|_| DEFAULT_COLLECTION.to_string())
}

/// Optional tokenizer file from `RAG_TOKENIZER_PATH`.
pub fn tokenizer_path_from_env() -> Option<PathBuf> {
    env::var("RAG_TOKENIZER_PATH").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 2000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.tokens_per_chunk, 256);
        assert_eq!(config.token_overlap, 20);
        assert_eq!(config.min_chunk_chars, 30);
        assert_eq!(config.top_k, 5);
    }

    #[test]
    fn test_builder_rejects_overlap_not_below_size() {
        let err = RagConfig::builder()
            .chunk_size(100)
            .chunk_overlap(100)
            .build()
            .unwrap_err();
        assert!(matches!(err, RagError::Config(_)));

        let err = RagConfig::builder()
            .tokens_per_chunk(10)
            .token_overlap(12)
            .build()
            .unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn test_builder_rejects_zero_top_k() {
        assert!(RagConfig::builder().top_k(0).build().is_err());
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = RagConfig::builder()
            .chunk_size(400)
            .chunk_overlap(40)
            .tokens_per_chunk(64)
            .token_overlap(8)
            .min_chunk_chars(10)
            .top_k(3)
            .build()
            .unwrap();
        assert_eq!(config.chunk_size, 400);
        assert_eq!(config.token_overlap, 8);
        assert_eq!(config.top_k, 3);
    }
}
