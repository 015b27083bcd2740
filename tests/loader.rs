use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use catalog_harness::error::CatalogError;
use catalog_harness::load::{discover_family_files, Loader, TextSource};
use catalog_harness::models::FailureKind;
use catalog_harness::retry::RetryPolicy;
use catalog_harness::store::memory::InMemoryStore;
use catalog_harness::store::{CollectionSpec, EmbeddingService, StoreProvisioner};
use serde_json::json;
use tempfile::TempDir;

fn spec(name: &str) -> CollectionSpec {
    CollectionSpec {
        name: name.to_string(),
        vector_dimension: 1536,
        vector_metric: "dot_product".to_string(),
        embedding: EmbeddingService {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            provider_key: Some("OPENAI_API_KEY".to_string()),
        },
    }
}

fn family_file(tmp: &TempDir, slug: &str, content: &str) -> PathBuf {
    let dir = tmp.path().join(slug);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("products.jsonl");
    fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn test_malformed_line_is_counted_and_skipped() {
    let tmp = TempDir::new().unwrap();
    let path = family_file(
        &tmp,
        "constructobots",
        "{\"_id\": \"CB-1\", \"name\": \"Arm\", \"description\": \"Lifts things\"}\n{\"_id\": \"CB-2\", \n",
    );
    let store = InMemoryStore::new().with_lexical_available(true);
    let loader = Loader::new(&store, spec("products"), TextSource::Product);

    let report = loader.load(&[path.clone()]).await.unwrap();

    assert_eq!(report.total_inserted, 1);
    assert_eq!(report.error_count(), 1);
    assert_eq!(report.errors[0].kind, FailureKind::Format);
    assert_eq!(report.errors[0].line, 2);
    assert_eq!(report.errors[0].payload.as_deref(), Some("{\"_id\": \"CB-2\","));
    assert_eq!(report.per_file.len(), 1);
    assert_eq!(report.per_file[0].path, path);
    assert_eq!(report.per_file[0].inserted, 1);

    let docs = store.documents("products");
    assert_eq!(docs[0]["$hybrid"], json!("# Arm\n\nLifts things"));
}

#[tokio::test]
async fn test_vector_only_collection_never_gets_hybrid() {
    let tmp = TempDir::new().unwrap();
    let path = family_file(
        &tmp,
        "kinetikits",
        "{\"_id\": \"KK-1\", \"name\": \"Gears\", \"description\": \"Spin\", \"tags\": [\"mechanics\"]}\n",
    );
    let store = InMemoryStore::new().with_lexical_available(false);
    let loader = Loader::new(&store, spec("products"), TextSource::Product);

    let report = loader.load(&[path]).await.unwrap();

    assert!(!report.lexical_enabled);
    let docs = store.documents("products");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["$vectorize"], json!("Spin"));
    assert!(!docs[0].contains_key("$hybrid"));
}

#[tokio::test]
async fn test_existing_hybrid_collection_is_reused() {
    let tmp = TempDir::new().unwrap();
    let path = family_file(
        &tmp,
        "logicleaps",
        "{\"_id\": \"LL-1\", \"name\": \"Blocks\", \"description\": \"Stack\"}\n",
    );
    let store = InMemoryStore::new()
        .with_collection("products", true)
        .with_lexical_available(false);
    let loader = Loader::new(&store, spec("products"), TextSource::Product);

    let report = loader.load(&[path]).await.unwrap();

    assert!(report.lexical_enabled);
    assert_eq!(report.per_file[0].unprojected, 0);
    assert_eq!(store.documents("products")[0]["$hybrid"], json!("# Blocks\n\nStack"));
}

#[tokio::test]
async fn test_repeat_run_with_rejecting_store_completes() {
    let tmp = TempDir::new().unwrap();
    let path = family_file(
        &tmp,
        "constructobots",
        "{\"_id\": \"CB-1\", \"name\": \"Arm\"}\n{\"_id\": \"CB-2\", \"name\": \"Gripper\"}\n",
    );
    let store = InMemoryStore::new().reject_duplicates();
    let loader = Loader::new(&store, spec("products"), TextSource::Product);

    let first = loader.load(&[path.clone()]).await.unwrap();
    assert_eq!(first.total_inserted, 2);

    let second = loader.load(&[path]).await.unwrap();
    assert_eq!(second.total_inserted, 0);
    assert_eq!(second.error_count(), 2);
    assert!(second.errors.iter().all(|e| e.kind == FailureKind::Insert));
    assert_eq!(store.documents("products").len(), 2);
}

#[tokio::test]
async fn test_rejected_document_does_not_stop_the_file() {
    let tmp = TempDir::new().unwrap();
    let path = family_file(
        &tmp,
        "constructobots",
        "{\"_id\": \"CB-1\", \"name\": \"Arm\"}\n{\"_id\": \"CB-2\", \"name\": \"Gripper\"}\n{\"_id\": \"CB-3\", \"name\": \"Wheel\"}\n",
    );
    let store = InMemoryStore::new().reject_id("CB-2");
    let loader = Loader::new(&store, spec("products"), TextSource::Product);

    let report = loader.load(&[path]).await.unwrap();

    assert_eq!(report.total_inserted, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].line, 2);
    assert!(report.errors[0].payload.as_deref().unwrap().contains("CB-2"));
}

#[tokio::test]
async fn test_documents_use_text_field() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("logicleaps");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("documents.jsonl"),
        "{\"_id\": \"D-1\", \"title\": \"Guide\", \"text\": \"Plug it in.\"}\n{\"_id\": \"D-2\", \"title\": \"Empty\"}\n",
    )
    .unwrap();
    let files = discover_family_files(tmp.path(), "documents.jsonl").unwrap();
    let store = InMemoryStore::new();
    let loader = Loader::new(&store, spec("documents"), TextSource::Field("text".to_string()));

    let report = loader.load(&files).await.unwrap();

    assert_eq!(report.total_inserted, 2);
    assert_eq!(report.per_file[0].unprojected, 1);
    let docs = store.documents("documents");
    assert_eq!(docs[0]["$vectorize"], json!("Plug it in."));
    assert!(!docs[1].contains_key("$vectorize"));
}

#[tokio::test]
async fn test_unreadable_file_is_recorded() {
    let tmp = TempDir::new().unwrap();
    let good = family_file(&tmp, "constructobots", "{\"_id\": \"CB-1\", \"name\": \"Arm\"}\n");
    let missing = tmp.path().join("ghost/products.jsonl");
    let store = InMemoryStore::new();
    let loader = Loader::new(&store, spec("products"), TextSource::Product);

    let report = loader.load(&[missing, good]).await.unwrap();

    assert_eq!(report.total_inserted, 1);
    assert_eq!(report.errors[0].kind, FailureKind::Read);
    assert_eq!(report.per_file.len(), 2);
}

#[tokio::test]
async fn test_no_files_is_an_error() {
    let store = InMemoryStore::new();
    let loader = Loader::new(&store, spec("products"), TextSource::Product);
    let err = loader.load(&[]).await.unwrap_err();
    assert!(matches!(err, CatalogError::NoInput(_)));
    assert!(!store.collection_exists("products").await.unwrap());
}

#[tokio::test]
async fn test_unreachable_store_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let path = family_file(&tmp, "constructobots", "{\"_id\": \"CB-1\"}\n");
    let store = InMemoryStore::new().unreachable();
    let loader = Loader::new(&store, spec("products"), TextSource::Product);
    let err = loader.load(&[path]).await.unwrap_err();
    assert!(matches!(err, CatalogError::Connectivity(_)));
}

#[tokio::test]
async fn test_invalid_utf8_line_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("constructobots");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("products.jsonl");
    fs::write(
        &path,
        b"{\"_id\": \"CB-1\", \"name\": \"Arm\"}\n{\"_id\": \"CB-\xff\"}\n{\"_id\": \"CB-3\", \"name\": \"Wheel\"}\n",
    )
    .unwrap();
    let store = InMemoryStore::new();
    let loader = Loader::new(&store, spec("products"), TextSource::Product);

    let report = loader.load(&[path]).await.unwrap();

    assert_eq!(report.total_inserted, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, FailureKind::Format);
    assert_eq!(report.errors[0].line, 2);
    assert!(report.errors[0].payload.as_deref().unwrap().contains("CB-\u{FFFD}"));
    let ids: Vec<_> = store
        .documents("products")
        .iter()
        .map(|d| d["_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["CB-1", "CB-3"]);
}

#[tokio::test]
async fn test_transient_insert_failure_is_retried() {
    let tmp = TempDir::new().unwrap();
    let path = family_file(&tmp, "constructobots", "{\"_id\": \"CB-1\", \"name\": \"Arm\"}\n");
    let store = InMemoryStore::new().fail_inserts_transiently(2);
    let loader = Loader::new(&store, spec("products"), TextSource::Product)
        .with_retry(RetryPolicy::fixed(2, Duration::from_millis(1)));

    let report = loader.load(&[path]).await.unwrap();

    assert_eq!(report.total_inserted, 1);
    assert!(report.errors.is_empty());
    assert_eq!(store.documents("products").len(), 1);
}

#[tokio::test]
async fn test_transient_insert_failure_counts_after_budget() {
    let tmp = TempDir::new().unwrap();
    let path = family_file(
        &tmp,
        "constructobots",
        "{\"_id\": \"CB-1\", \"name\": \"Arm\"}\n{\"_id\": \"CB-2\", \"name\": \"Gripper\"}\n",
    );
    let store = InMemoryStore::new().fail_inserts_transiently(3);
    let loader = Loader::new(&store, spec("products"), TextSource::Product)
        .with_retry(RetryPolicy::fixed(2, Duration::from_millis(1)));

    let report = loader.load(&[path]).await.unwrap();

    assert_eq!(report.total_inserted, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, FailureKind::Insert);
    assert_eq!(report.errors[0].line, 1);
}
