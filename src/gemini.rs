use crate::embeddings::{Embedder, Embedding};
use crate::error::{RagError, Result};
use crate::generator::Generator;
use log::debug;
use serde::{Deserialize, Serialize};
use std::env;

const DEFAULT_EMBEDDINGS_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:embedContent";
const DEFAULT_GENERATE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:generateContent";
const EMBEDDING_MODEL: &str = "models/text-embedding-004";
const EMBEDDING_DIMENSIONS: usize = 768;

const EMBEDDING_SERVICE: &str = "gemini-embedding";
const GENERATION_SERVICE: &str = "gemini-generation";

/// Configuration for Gemini API
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub embeddings_url: String,
    pub generate_url: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: i32,
    pub max_output_tokens: i32,
}

impl GeminiConfig {
    /// Configuration with the public endpoints and the given credential
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::Config("Gemini API key is empty".to_string()));
        }

        Ok(GeminiConfig {
            api_key,
            embeddings_url: DEFAULT_EMBEDDINGS_URL.to_string(),
            generate_url: DEFAULT_GENERATE_URL.to_string(),
            temperature: 0.2,
            top_p: 0.8,
            top_k: 40,
            max_output_tokens: 1024,
        })
    }

    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY")
            .or_else(|_| env::var("GOOGLE_API_KEY"))
            .map_err(|_| {
                RagError::Config("GEMINI_API_KEY (or GOOGLE_API_KEY) is not set".to_string())
            })?;

        let mut config = GeminiConfig::new(api_key)?;
        if let Ok(url) = env::var("GEMINI_EMBEDDINGS_URL") {
            config.embeddings_url = url;
        }
        if let Ok(url) = env::var("GEMINI_GENERATE_URL") {
            config.generate_url = url;
        }

        Ok(config)
    }
}

/// Client for interacting with Gemini API
#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: GeminiConfig) -> Self {
        let client = reqwest::Client::new();
        GeminiClient { config, client }
    }

    /// Get the client configuration
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    async fn post<T: Serialize>(
        &self,
        url: &str,
        body: &T,
        service: &str,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| RagError::model(service, e.without_url()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::model(
                service,
                format!("API request failed: {} {}", status, error_text),
            ));
        }

        Ok(response)
    }

    /// Generate text using the configured Gemini model
    pub async fn generate_text(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content::new_with_role(prompt, "user")],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                top_k: self.config.top_k,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let response = self
            .post(&self.config.generate_url, &request, GENERATION_SERVICE)
            .await?;
        let response_data: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RagError::malformed(GENERATION_SERVICE, e.without_url()))?;

        extract_text(response_data)
    }
}

impl Embedder for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let request = EmbeddingRequest {
            model: EMBEDDING_MODEL,
            content: EmbeddingContent {
                parts: vec![Part { text }],
            },
        };

        let response = self
            .post(&self.config.embeddings_url, &request, EMBEDDING_SERVICE)
            .await?;
        let response_data: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::malformed(EMBEDDING_SERVICE, e.without_url()))?;

        if response_data.embedding.values.is_empty() {
            return Err(RagError::malformed(EMBEDDING_SERVICE, "empty embedding"));
        }
        debug!(
            "Embedded {} chars into {} dimensions",
            text.len(),
            response_data.embedding.values.len()
        );

        Ok(Embedding::new(response_data.embedding.values))
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}

impl Generator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_text(prompt).await
    }
}

/// Extract the generated text from the first candidate
fn extract_text(response: GenerateResponse) -> Result<String> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .filter(|text| !text.is_empty())
        .ok_or_else(|| RagError::malformed(GENERATION_SERVICE, "no response generated"))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'static str,
    content: EmbeddingContent<'a>,
}

#[derive(Serialize)]
struct EmbeddingContent<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    embedding: EmbeddingData,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    values: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
    role: &'static str,
}

impl<'a> Content<'a> {
    fn new_with_role(text: &'a str, role: &'static str) -> Self {
        Content {
            parts: vec![Part { text }],
            role,
        }
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize, Debug)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}
