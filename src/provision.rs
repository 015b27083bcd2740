//! Collection provisioning.
//!
//! [`ensure_collection`] is called once before the loader writes anything.
//! It never reconfigures an existing collection: if the collection exists
//! its lexical capability is only inspected.

use anyhow::Context;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{CatalogError, Result};
use crate::store::data_api::DataApiClient;
use crate::store::{CollectionSpec, LexicalConfig, StoreProvisioner};

/// Make sure `spec.name` exists. Returns `(lexical_enabled, collection_name)`.
///
/// - Existing collection: its lexical configuration is inspected; if the
///   inspection fails, vector-only is assumed.
/// - Missing collection: lexical availability is probed (failure counts as
///   unavailable) and the collection is created with the default lexical
///   pipeline only when available.
///
/// Connectivity failures on the existence check are returned, since
/// nothing can be loaded without the store.
pub async fn ensure_collection(
    provisioner: &dyn StoreProvisioner,
    spec: &CollectionSpec,
) -> Result<(bool, String)> {
    let name = spec.name.clone();

    if provisioner.collection_exists(&name).await? {
        info!("Collection '{}' already exists. Inspecting its configuration...", name);
        return match provisioner.lexical_enabled(&name).await {
            Ok(true) => {
                info!("Existing collection '{}' has lexical indexing configured.", name);
                Ok((true, name))
            }
            Ok(false) => {
                info!("Existing collection '{}' does not have lexical indexing configured.", name);
                Ok((false, name))
            }
            Err(e) => {
                warn!(
                    "Could not inspect existing collection '{}': {}. Assuming no lexical indexing.",
                    name, e
                );
                Ok((false, name))
            }
        };
    }

    info!("Collection '{}' not found. Preparing to create it...", name);
    if spec.embedding.provider_key.is_none() {
        return Err(CatalogError::Config(
            "ASTRA_DB_INTEGRATION_OPENAI_KEY_NAME must be set for collection creation".to_string(),
        ));
    }

    let available = match provisioner.lexical_available().await {
        Ok(available) => available,
        Err(e) => {
            warn!("Lexical capability probe failed: {}. Creating vector-only collection.", e);
            false
        }
    };
    let lexical = LexicalConfig::default();
    let lexical_enabled = provisioner
        .create_collection(spec, available.then_some(&lexical))
        .await?;

    info!(
        "Collection '{}' created with {} indexing and {} embeddings ({}).",
        name,
        if lexical_enabled { "lexical" } else { "vector" },
        spec.embedding.provider,
        spec.embedding.model
    );
    Ok((lexical_enabled, name))
}

/// `catalog provision`: ensure both catalog collections exist.
pub async fn run_provision(config: &Config) -> anyhow::Result<()> {
    let settings = config.require_store()?;
    let client = DataApiClient::new(&settings)?;

    println!("provision {}", client.endpoint());
    for name in [&config.collections.products, &config.collections.documents] {
        let spec = CollectionSpec::from_config(config, name);
        let (lexical, resolved) = ensure_collection(&client, &spec)
            .await
            .with_context(|| format!("Failed to provision collection '{}'", name))?;
        println!(
            "  {:<16} {}",
            resolved,
            if lexical { "hybrid (lexical + vector)" } else { "vector only" }
        );
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::store::EmbeddingService;

    fn spec(name: &str, key: Option<&str>) -> CollectionSpec {
        CollectionSpec {
            name: name.to_string(),
            vector_dimension: 1536,
            vector_metric: "dot_product".to_string(),
            embedding: EmbeddingService {
                provider: "openai".to_string(),
                model: "text-embedding-3-small".to_string(),
                provider_key: key.map(str::to_string),
            },
        }
    }

    #[tokio::test]
    async fn test_creates_with_lexical_when_available() {
        let store = InMemoryStore::new().with_lexical_available(true);
        let (lexical, name) = ensure_collection(&store, &spec("products", Some("k")))
            .await
            .unwrap();
        assert!(lexical);
        assert_eq!(name, "products");
        assert!(store.lexical_enabled("products").await.unwrap());
        assert_eq!(store.spec("products").unwrap().vector_dimension, 1536);
    }

    #[tokio::test]
    async fn test_creates_vector_only_when_unavailable() {
        let store = InMemoryStore::new().with_lexical_available(false);
        let (lexical, _) = ensure_collection(&store, &spec("products", Some("k")))
            .await
            .unwrap();
        assert!(!lexical);
    }

    #[tokio::test]
    async fn test_existing_collection_is_inspected_not_recreated() {
        let store = InMemoryStore::new()
            .with_collection("products", true)
            .with_lexical_available(false);
        let (lexical, _) = ensure_collection(&store, &spec("products", None))
            .await
            .unwrap();
        assert!(lexical);
        assert!(store.spec("products").is_none());
    }

    #[tokio::test]
    async fn test_creation_requires_provider_key() {
        let store = InMemoryStore::new();
        let err = ensure_collection(&store, &spec("products", None))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Config(_)));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_fatal() {
        let store = InMemoryStore::new().unreachable();
        let err = ensure_collection(&store, &spec("products", Some("k")))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Connectivity(_)));
    }
}
