//! Delete every document from the catalog collections.
//!
//! Destructive, so the operator must type `yes` first.

use std::io::{BufRead, Write};

use tracing::{error, info};

use crate::config::Config;
use crate::store::data_api::DataApiClient;
use crate::store::{DocumentStore, StoreProvisioner};

/// Ask for confirmation. Only a case-insensitive `yes` proceeds.
pub fn confirm<R: BufRead, W: Write>(
    mut reader: R,
    mut writer: W,
    collections: &[&str],
    endpoint: &str,
) -> std::io::Result<bool> {
    write!(
        writer,
        "This will delete ALL data from the collections {:?} in database {}.\nAre you sure you want to continue? (yes/no): ",
        collections, endpoint
    )?;
    writer.flush()?;
    let mut answer = String::new();
    reader.read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

/// Per-collection outcome: deleted count, or the error message.
pub type TruncateOutcome = (String, Result<u64, String>);

/// Empty each collection in turn. A failure on one does not stop the rest.
pub async fn truncate_collections(
    provisioner: &dyn StoreProvisioner,
    names: &[&str],
) -> Vec<TruncateOutcome> {
    let mut outcomes = Vec::with_capacity(names.len());
    for name in names {
        info!("Truncating collection '{}'...", name);
        let result = match provisioner.get_collection(name).await {
            Ok(collection) => collection.delete_all().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(count) => {
                info!("Deleted {} documents from '{}'", count, name);
                outcomes.push((name.to_string(), Ok(count)));
            }
            Err(e) => {
                error!("Error truncating collection '{}': {}", name, e);
                outcomes.push((name.to_string(), Err(e.to_string())));
            }
        }
    }
    outcomes
}

/// Confirm on `reader`/`writer`, then truncate. `None` when the operator
/// declined and nothing was touched.
pub async fn confirm_and_truncate<R: BufRead, W: Write>(
    provisioner: &dyn StoreProvisioner,
    names: &[&str],
    endpoint: &str,
    reader: R,
    writer: W,
) -> std::io::Result<Option<Vec<TruncateOutcome>>> {
    if !confirm(reader, writer, names, endpoint)? {
        return Ok(None);
    }
    Ok(Some(truncate_collections(provisioner, names).await))
}

/// `catalog truncate`.
pub async fn run_truncate(config: &Config) -> anyhow::Result<()> {
    let settings = config.require_store()?;
    let client = DataApiClient::new(&settings)?;
    let names = [
        config.collections.products.as_str(),
        config.collections.documents.as_str(),
    ];

    let stdin = std::io::stdin();
    let outcomes = match confirm_and_truncate(
        &client,
        &names,
        client.endpoint(),
        stdin.lock(),
        std::io::stdout(),
    )
    .await?
    {
        Some(outcomes) => outcomes,
        None => {
            println!("Truncation cancelled.");
            return Ok(());
        }
    };
    println!("truncate {}", client.endpoint());
    for (name, outcome) in &outcomes {
        match outcome {
            Ok(count) => println!("  {:<16} deleted {}", name, count),
            Err(e) => println!("  {:<16} error: {}", name, e),
        }
    }
    if outcomes.iter().any(|(_, o)| o.is_err()) {
        anyhow::bail!("one or more collections could not be truncated");
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use serde_json::json;

    #[test]
    fn test_confirm_requires_yes() {
        let mut prompt = Vec::new();
        assert!(confirm("YES\n".as_bytes(), &mut prompt, &["products"], "https://db").unwrap());
        let text = String::from_utf8(prompt).unwrap();
        assert!(text.contains("[\"products\"]"));
        assert!(text.contains("https://db"));

        assert!(!confirm("y\n".as_bytes(), Vec::new(), &["products"], "https://db").unwrap());
        assert!(!confirm("".as_bytes(), Vec::new(), &["products"], "https://db").unwrap());
    }

    #[tokio::test]
    async fn test_declined_confirmation_leaves_data() {
        let store = InMemoryStore::new().with_collection("products", false);
        let handle = store.get_collection("products").await.unwrap();
        handle
            .insert(json!({"_id": "a"}).as_object().unwrap())
            .await
            .unwrap();

        let declined =
            confirm_and_truncate(&store, &["products"], "https://db", "no\n".as_bytes(), Vec::new())
                .await
                .unwrap();
        assert!(declined.is_none());
        assert_eq!(store.documents("products").len(), 1);

        let outcomes =
            confirm_and_truncate(&store, &["products"], "https://db", "yes\n".as_bytes(), Vec::new())
                .await
                .unwrap()
                .unwrap();
        assert_eq!(outcomes, vec![("products".to_string(), Ok(1))]);
        assert!(store.documents("products").is_empty());
    }

    #[tokio::test]
    async fn test_failure_on_one_collection_continues() {
        let store = InMemoryStore::new().with_collection("documents", false);
        let handle = store.get_collection("documents").await.unwrap();
        for id in ["a", "b"] {
            handle
                .insert(json!({"_id": id}).as_object().unwrap())
                .await
                .unwrap();
        }

        let outcomes = truncate_collections(&store, &["products", "documents"]).await;
        assert!(outcomes[0].1.is_err());
        assert_eq!(outcomes[1], ("documents".to_string(), Ok(2)));
        assert!(store.documents("documents").is_empty());
    }
}
