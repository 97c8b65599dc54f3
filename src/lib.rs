pub mod chat;
pub mod chunking;
pub mod config;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod gemini;
pub mod generator;
pub mod indexer;
pub mod local;
pub mod prompt;
pub mod rag;
pub mod retrieval;
pub mod tokenizer;
