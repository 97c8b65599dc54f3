//! Error types shared by the ingestion and query pipelines.

use thiserror::Error;

/// Errors that can occur while building or querying the knowledge base.
#[derive(Debug, Error)]
pub enum RagError {
    /// The user submitted a blank or whitespace-only question.
    #[error("Please enter a question.")]
    EmptyQuery,

    /// The vector store could not be reached or failed to read/write.
    #[error("Vector store unavailable ({backend}): {message}")]
    StoreUnavailable { backend: String, message: String },

    /// An embedding or generation call failed before a usable response arrived.
    #[error("Model service unavailable ({service}): {message}")]
    ModelUnavailable { service: String, message: String },

    /// A collaborator answered, but the answer could not be decoded.
    #[error("Malformed response from {service}: {message}")]
    MalformedResponse { service: String, message: String },

    /// Invalid configuration or a missing credential.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A document could not be loaded.
    #[error("Failed to load document {path}: {message}")]
    Document { path: String, message: String },

    /// The tokenizer could not be loaded or failed to encode text.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}

impl RagError {
    pub(crate) fn store(backend: &str, message: impl ToString) -> Self {
        RagError::StoreUnavailable {
            backend: backend.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn model(service: &str, message: impl ToString) -> Self {
        RagError::ModelUnavailable {
            service: service.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn malformed(service: &str, message: impl ToString) -> Self {
        RagError::MalformedResponse {
            service: service.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RagError>;
