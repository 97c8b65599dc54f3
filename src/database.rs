use crate::config::StoreConfig;
use crate::embeddings::Embedder;
use crate::error::{RagError, Result};
use crate::indexer::{ChunkMetadata, IndexedRecord};
use crate::local::LocalStore;
use log::info;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    with_payload_selector, CollectionExistsRequest, CountPointsBuilder, CreateCollectionBuilder,
    DeletePointsBuilder, Distance, Filter, PointStruct, SearchPoints, UpsertPointsBuilder,
    VectorParams, WithPayloadSelector,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use std::env;

const BACKEND: &str = "qdrant";

/// A stored chunk returned by a nearest-neighbor query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: u64,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance to the query; smaller is closer
    pub distance: f32,
}

/// A named, persistent collection of indexed chunks.
///
/// The store embeds texts itself on `add` and `query`, so both sides of the
/// pipeline always use the same embedding function.
#[allow(async_fn_in_trait)]
pub trait VectorStore {
    /// Name of the underlying collection
    fn collection(&self) -> &str;

    /// Embed and write a batch of records. Records with an existing id are replaced.
    async fn add(&self, records: Vec<IndexedRecord>) -> Result<()>;

    /// The `n_results` records nearest to `query_text`, closest first
    async fn query(&self, query_text: &str, n_results: usize) -> Result<Vec<ScoredChunk>>;

    /// Number of records in the collection
    async fn count(&self) -> Result<u64>;

    /// Embed a batch and make it the whole content of the collection.
    ///
    /// The new batch is embedded before any stored record is removed, so a
    /// failed embedding leaves the previous records in place.
    async fn replace_all(&self, records: Vec<IndexedRecord>) -> Result<()>;
}

/// Configuration for Qdrant
#[derive(Debug, Clone, PartialEq)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl QdrantConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let url = env::var("QDRANT_URL")
            .map_err(|_| RagError::Config("QDRANT_URL is not set".to_string()))?;
        let api_key = env::var("QDRANT_API_KEY").ok();

        Ok(QdrantConfig { url, api_key })
    }
}

/// A collection in a Qdrant server
pub struct QdrantStore<E> {
    client: Qdrant,
    collection: String,
    embedder: E,
}

impl<E: Embedder> QdrantStore<E> {
    /// Open the named collection, creating it when it does not exist yet
    pub async fn open_or_create(config: QdrantConfig, name: &str, embedder: E) -> Result<Self> {
        let config_builder = Qdrant::from_url(&config.url);
        let config_builder = if let Some(api_key) = config.api_key {
            config_builder.api_key(api_key)
        } else {
            config_builder
        };

        let client = config_builder
            .build()
            .map_err(|e| RagError::store(BACKEND, e))?;
        let store = QdrantStore {
            client,
            collection: get_collection_name(name),
            embedder,
        };

        if store.collection_exists().await? {
            info!("Using existing collection: {}", store.collection);
        } else {
            store.create_collection().await?;
            info!("Created collection: {}", store.collection);
        }

        Ok(store)
    }

    /// Check if the collection exists. A failed lookup is reported as the
    /// store being unavailable, never as an absent collection.
    async fn collection_exists(&self) -> Result<bool> {
        self.client
            .collection_exists(CollectionExistsRequest {
                collection_name: self.collection.clone(),
            })
            .await
            .map_err(|e| {
                RagError::store(
                    BACKEND,
                    format!("failed to check collection {}: {}", self.collection, e),
                )
            })
    }

    async fn create_collection(&self) -> Result<()> {
        let create_collection = CreateCollectionBuilder::new(self.collection.clone())
            .vectors_config(VectorParams {
                size: self.embedder.dimensions() as u64,
                distance: Distance::Cosine.into(),
                ..Default::default()
            });

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| {
                RagError::store(
                    BACKEND,
                    format!("failed to create collection {}: {}", self.collection, e),
                )
            })?;

        Ok(())
    }

    /// Embed the whole batch before anything is written
    async fn embed_points(&self, records: Vec<IndexedRecord>) -> Result<Vec<PointStruct>> {
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

        records
            .into_iter()
            .zip(embeddings)
            .map(|(record, embedding)| {
                let payload = Payload::try_from(json!({
                    "text": record.text,
                    "source": record.metadata.source,
                    "chunk_index": record.metadata.chunk_index,
                }))
                .map_err(|e| RagError::store(BACKEND, format!("invalid payload: {}", e)))?;

                Ok(PointStruct::new(record.id, embedding.values, payload))
            })
            .collect()
    }

    async fn upsert(&self, points: Vec<PointStruct>) -> Result<()> {
        let point_count = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(self.collection.clone(), points).wait(true))
            .await
            .map_err(|e| {
                RagError::store(
                    BACKEND,
                    format!("failed to upsert points in {}: {}", self.collection, e),
                )
            })?;

        info!("Stored {} points in {}", point_count, self.collection);
        Ok(())
    }
}

impl<E: Embedder> VectorStore for QdrantStore<E> {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn add(&self, records: Vec<IndexedRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let points = self.embed_points(records).await?;
        self.upsert(points).await
    }

    async fn query(&self, query_text: &str, n_results: usize) -> Result<Vec<ScoredChunk>> {
        let query_embedding = self.embedder.embed(query_text).await?;

        let search_request = SearchPoints {
            collection_name: self.collection.clone(),
            vector: query_embedding.values,
            limit: n_results as u64,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(with_payload_selector::SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        let search_response = self
            .client
            .search_points(search_request)
            .await
            .map_err(|e| {
                RagError::store(
                    BACKEND,
                    format!("failed to search {}: {}", self.collection, e),
                )
            })?;

        // Points without an integer id or text payload were not written by this crate
        let chunks = search_response
            .result
            .into_iter()
            .filter_map(|scored_point| {
                let id = match scored_point.id?.point_id_options? {
                    PointIdOptions::Num(id) => id,
                    PointIdOptions::Uuid(_) => return None,
                };
                let payload = scored_point.payload;
                let text = payload.get("text")?.as_str()?.to_string();
                let source = payload
                    .get("source")
                    .and_then(|v| v.as_str())
                    .cloned()
                    .unwrap_or_default();
                let chunk_index = payload
                    .get("chunk_index")
                    .and_then(|v| v.as_integer())
                    .map(|v| v as usize)
                    .unwrap_or(0);

                Some(ScoredChunk {
                    id,
                    text,
                    metadata: ChunkMetadata {
                        source,
                        chunk_index,
                    },
                    distance: 1.0 - scored_point.score,
                })
            })
            .collect();

        Ok(chunks)
    }

    async fn count(&self) -> Result<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(self.collection.clone()).exact(true))
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn replace_all(&self, records: Vec<IndexedRecord>) -> Result<()> {
        let points = self.embed_points(records).await?;

        // An empty filter matches every point
        self.client
            .delete_points(
                DeletePointsBuilder::new(self.collection.clone())
                    .points(Filter::default())
                    .wait(true),
            )
            .await
            .map_err(|e| {
                RagError::store(
                    BACKEND,
                    format!("failed to clear {}: {}", self.collection, e),
                )
            })?;
        info!("Cleared collection: {}", self.collection);

        if points.is_empty() {
            return Ok(());
        }
        self.upsert(points).await
    }
}

/// Either backend, chosen at startup from [`StoreConfig`]
pub enum Store<E> {
    Qdrant(QdrantStore<E>),
    Local(LocalStore<E>),
}

impl<E: Embedder> Store<E> {
    pub async fn open(config: &StoreConfig, name: &str, embedder: E) -> Result<Self> {
        match config {
            StoreConfig::Qdrant(qdrant) => Ok(Store::Qdrant(
                QdrantStore::open_or_create(qdrant.clone(), name, embedder).await?,
            )),
            StoreConfig::Local { dir } => Ok(Store::Local(
                LocalStore::open_or_create(dir, name, embedder).await?,
            )),
        }
    }
}

impl<E: Embedder> VectorStore for Store<E> {
    fn collection(&self) -> &str {
        match self {
            Store::Qdrant(store) => store.collection(),
            Store::Local(store) => store.collection(),
        }
    }

    async fn add(&self, records: Vec<IndexedRecord>) -> Result<()> {
        match self {
            Store::Qdrant(store) => store.add(records).await,
            Store::Local(store) => store.add(records).await,
        }
    }

    async fn query(&self, query_text: &str, n_results: usize) -> Result<Vec<ScoredChunk>> {
        match self {
            Store::Qdrant(store) => store.query(query_text, n_results).await,
            Store::Local(store) => store.query(query_text, n_results).await,
        }
    }

    async fn count(&self) -> Result<u64> {
        match self {
            Store::Qdrant(store) => store.count().await,
            Store::Local(store) => store.count().await,
        }
    }

    async fn replace_all(&self, records: Vec<IndexedRecord>) -> Result<()> {
        match self {
            Store::Qdrant(store) => store.replace_all(records).await,
            Store::Local(store) => store.replace_all(records).await,
        }
    }
}

/// Generate a collection name from a user-facing name
pub(crate) fn get_collection_name(name: &str) -> String {
    // Replace non-alphanumeric characters with underscores and convert to lowercase
    let name = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase();

    format!("rag_{}", name)
}
