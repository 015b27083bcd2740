//! Document store abstraction.
//!
//! The loader never talks to a vendor SDK directly. It goes through two
//! capability traits:
//!
//! - [`StoreProvisioner`]: collection existence, inspection, creation, and
//!   handle lookup
//! - [`DocumentStore`]: a handle on one collection (insert, delete-all)
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Backend | Purpose |
//! |---------|---------|
//! | [`data_api::DataApiClient`] | JSON Data API over HTTPS |
//! | [`memory::InMemoryStore`] | tests and dry runs |

pub mod data_api;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::models::Record;

/// Field that carries the searchable text in an inserted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    /// Feeds embedding generation only.
    Vectorize,
    /// Feeds both lexical and vector indexing.
    Hybrid,
}

impl TextField {
    /// The convention matching a collection's lexical capability.
    pub fn for_collection(lexical_enabled: bool) -> Self {
        if lexical_enabled {
            TextField::Hybrid
        } else {
            TextField::Vectorize
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            TextField::Vectorize => "$vectorize",
            TextField::Hybrid => "$hybrid",
        }
    }
}

/// Embedding service the store calls on insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingService {
    pub provider: String,
    pub model: String,
    /// Name under which the provider API key is registered with the store.
    pub provider_key: Option<String>,
}

/// Definition of a collection to create.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    pub name: String,
    pub vector_dimension: usize,
    pub vector_metric: String,
    pub embedding: EmbeddingService,
}

impl CollectionSpec {
    /// Spec for `name` using the collection defaults from `config`.
    pub fn from_config(config: &Config, name: &str) -> Self {
        Self {
            name: name.to_string(),
            vector_dimension: config.collections.vector_dimension,
            vector_metric: config.collections.vector_metric.clone(),
            embedding: EmbeddingService {
                provider: config.collections.embedding_provider.clone(),
                model: config.collections.embedding_model.clone(),
                provider_key: config.env.provider_key_name.clone(),
            },
        }
    }
}

/// One stage of a lexical analyzer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzerStage {
    pub name: String,
}

/// Lexical indexing pipeline. Opaque to the loader, which only cares
/// whether one was provisioned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexicalConfig {
    pub tokenizer: String,
    pub filters: Vec<AnalyzerStage>,
}

impl Default for LexicalConfig {
    /// Standard tokenizer, then lowercase, stop words, Porter stemming, ASCII folding.
    fn default() -> Self {
        Self {
            tokenizer: "standard".to_string(),
            filters: ["lowercase", "stop", "porterstem", "asciifolding"]
                .iter()
                .map(|name| AnalyzerStage {
                    name: name.to_string(),
                })
                .collect(),
        }
    }
}

/// Handle on a single collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn name(&self) -> &str;

    /// Insert one document.
    async fn insert(&self, document: &Record) -> Result<()>;

    /// Delete every document, returning how many were removed.
    async fn delete_all(&self) -> Result<u64>;
}

/// Collection-level operations.
#[async_trait]
pub trait StoreProvisioner: Send + Sync {
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Whether an existing collection was created with lexical indexing.
    async fn lexical_enabled(&self, name: &str) -> Result<bool>;

    /// Whether the service can provision lexical indexing right now.
    async fn lexical_available(&self) -> Result<bool>;

    /// Create a collection. Returns whether lexical indexing is active.
    async fn create_collection(
        &self,
        spec: &CollectionSpec,
        lexical: Option<&LexicalConfig>,
    ) -> Result<bool>;

    async fn get_collection(&self, name: &str) -> Result<Box<dyn DocumentStore>>;
}
