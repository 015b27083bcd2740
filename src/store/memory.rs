//! In-memory [`StoreProvisioner`] / [`DocumentStore`] for tests and dry runs.
//!
//! Collections live in a shared map behind `std::sync::RwLock`, so handles
//! returned by [`get_collection`](StoreProvisioner::get_collection) see the
//! same data as the provisioner. Duplicate `_id`s are accepted by default;
//! [`InMemoryStore::reject_duplicates`] makes it behave like a store that
//! enforces unique ids.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{CatalogError, Result};
use crate::models::Record;

use super::{CollectionSpec, DocumentStore, LexicalConfig, StoreProvisioner};

#[derive(Default)]
struct StoredCollection {
    spec: Option<CollectionSpec>,
    lexical: bool,
    docs: Vec<Record>,
}

#[derive(Default)]
struct Behavior {
    lexical_available: bool,
    unreachable: bool,
    reject_duplicates: bool,
    rejected_ids: HashSet<String>,
    transient_failures: usize,
}

type Shared = Arc<RwLock<HashMap<String, StoredCollection>>>;

/// In-memory store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    collections: Shared,
    behavior: Arc<RwLock<Behavior>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report lexical indexing as available when creating collections.
    pub fn with_lexical_available(self, available: bool) -> Self {
        self.behavior.write().unwrap().lexical_available = available;
        self
    }

    /// Fail every call with a connectivity error.
    pub fn unreachable(self) -> Self {
        self.behavior.write().unwrap().unreachable = true;
        self
    }

    /// Refuse inserts whose `_id` is already present.
    pub fn reject_duplicates(self) -> Self {
        self.behavior.write().unwrap().reject_duplicates = true;
        self
    }

    /// Refuse inserts of documents with this `_id`.
    pub fn reject_id(self, id: &str) -> Self {
        self.behavior
            .write()
            .unwrap()
            .rejected_ids
            .insert(id.to_string());
        self
    }

    /// Fail the next `count` inserts with a transient error.
    pub fn fail_inserts_transiently(self, count: usize) -> Self {
        self.behavior.write().unwrap().transient_failures = count;
        self
    }

    /// Register an existing collection.
    pub fn with_collection(self, name: &str, lexical: bool) -> Self {
        self.collections.write().unwrap().insert(
            name.to_string(),
            StoredCollection {
                lexical,
                ..Default::default()
            },
        );
        self
    }

    /// Documents currently stored in `name`, in insertion order.
    pub fn documents(&self, name: &str) -> Vec<Record> {
        self.collections
            .read()
            .unwrap()
            .get(name)
            .map(|c| c.docs.clone())
            .unwrap_or_default()
    }

    /// Spec the collection was created with, if it was created here.
    pub fn spec(&self, name: &str) -> Option<CollectionSpec> {
        self.collections
            .read()
            .unwrap()
            .get(name)
            .and_then(|c| c.spec.clone())
    }

    fn check_reachable(&self) -> Result<()> {
        if self.behavior.read().unwrap().unreachable {
            return Err(CatalogError::Connectivity(
                "in-memory store marked unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreProvisioner for InMemoryStore {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.check_reachable()?;
        Ok(self.collections.read().unwrap().contains_key(name))
    }

    async fn lexical_enabled(&self, name: &str) -> Result<bool> {
        self.check_reachable()?;
        self.collections
            .read()
            .unwrap()
            .get(name)
            .map(|c| c.lexical)
            .ok_or_else(|| CatalogError::RemoteRejection(format!("no collection '{}'", name)))
    }

    async fn lexical_available(&self) -> Result<bool> {
        self.check_reachable()?;
        Ok(self.behavior.read().unwrap().lexical_available)
    }

    async fn create_collection(
        &self,
        spec: &CollectionSpec,
        lexical: Option<&LexicalConfig>,
    ) -> Result<bool> {
        self.check_reachable()?;
        let mut collections = self.collections.write().unwrap();
        if collections.contains_key(&spec.name) {
            return Err(CatalogError::RemoteRejection(format!(
                "collection '{}' already exists",
                spec.name
            )));
        }
        collections.insert(
            spec.name.clone(),
            StoredCollection {
                spec: Some(spec.clone()),
                lexical: lexical.is_some(),
                docs: Vec::new(),
            },
        );
        Ok(lexical.is_some())
    }

    async fn get_collection(&self, name: &str) -> Result<Box<dyn DocumentStore>> {
        self.check_reachable()?;
        Ok(Box::new(InMemoryCollection {
            name: name.to_string(),
            store: self.clone(),
        }))
    }
}

/// Handle on one in-memory collection.
pub struct InMemoryCollection {
    name: String,
    store: InMemoryStore,
}

#[async_trait]
impl DocumentStore for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, document: &Record) -> Result<()> {
        self.store.check_reachable()?;
        let id = document.get("_id").and_then(|v| v.as_str()).map(str::to_string);
        let (reject_duplicates, rejected) = {
            let mut behavior = self.store.behavior.write().unwrap();
            if behavior.transient_failures > 0 {
                behavior.transient_failures -= 1;
                return Err(CatalogError::Transient("in-memory insert timed out".to_string()));
            }
            let rejected = id
                .as_deref()
                .map(|id| behavior.rejected_ids.contains(id))
                .unwrap_or(false);
            (behavior.reject_duplicates, rejected)
        };
        if rejected {
            return Err(CatalogError::RemoteRejection(format!(
                "document '{}' refused",
                id.as_deref().unwrap_or_default()
            )));
        }

        let mut collections = self.store.collections.write().unwrap();
        let collection = collections
            .get_mut(&self.name)
            .ok_or_else(|| CatalogError::RemoteRejection(format!("no collection '{}'", self.name)))?;
        if reject_duplicates {
            if let Some(id) = &id {
                let duplicate = collection
                    .docs
                    .iter()
                    .any(|d| d.get("_id").and_then(|v| v.as_str()) == Some(id.as_str()));
                if duplicate {
                    return Err(CatalogError::RemoteRejection(format!(
                        "document with _id '{}' already exists",
                        id
                    )));
                }
            }
        }
        collection.docs.push(document.clone());
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64> {
        self.store.check_reachable()?;
        let mut collections = self.store.collections.write().unwrap();
        let collection = collections
            .get_mut(&self.name)
            .ok_or_else(|| CatalogError::RemoteRejection(format!("no collection '{}'", self.name)))?;
        let count = collection.docs.len() as u64;
        collection.docs.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EmbeddingService;
    use serde_json::json;

    fn spec(name: &str) -> CollectionSpec {
        CollectionSpec {
            name: name.to_string(),
            vector_dimension: 1536,
            vector_metric: "dot_product".to_string(),
            embedding: EmbeddingService {
                provider: "openai".to_string(),
                model: "text-embedding-3-small".to_string(),
                provider_key: None,
            },
        }
    }

    fn doc(id: &str) -> Record {
        json!({"_id": id}).as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_create_insert_delete() {
        let store = InMemoryStore::new();
        assert!(!store.collection_exists("products").await.unwrap());
        let lexical = store
            .create_collection(&spec("products"), Some(&LexicalConfig::default()))
            .await
            .unwrap();
        assert!(lexical);
        assert!(store.lexical_enabled("products").await.unwrap());

        let handle = store.get_collection("products").await.unwrap();
        handle.insert(&doc("a")).await.unwrap();
        handle.insert(&doc("a")).await.unwrap();
        assert_eq!(store.documents("products").len(), 2);
        assert_eq!(handle.delete_all().await.unwrap(), 2);
        assert!(store.documents("products").is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_rejection() {
        let store = InMemoryStore::new()
            .with_collection("products", false)
            .reject_duplicates();
        let handle = store.get_collection("products").await.unwrap();
        handle.insert(&doc("a")).await.unwrap();
        let err = handle.insert(&doc("a")).await.unwrap_err();
        assert!(matches!(err, CatalogError::RemoteRejection(_)));
    }

    #[tokio::test]
    async fn test_unreachable() {
        let store = InMemoryStore::new().unreachable();
        let err = store.collection_exists("x").await.unwrap_err();
        assert!(matches!(err, CatalogError::Connectivity(_)));
    }
}
