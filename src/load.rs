//! Catalog loader.
//!
//! Streams family `.jsonl` files into a store collection:
//!
//! ```text
//! ensure_collection ──▶ pick text field ($vectorize | $hybrid)
//!        │
//!        ▼
//! for each file, for each line:
//!   parse ──▶ project searchable text ──▶ attach ──▶ insert
//! ```
//!
//! Bad lines and refused inserts are logged with file, line number, and
//! payload, counted, and skipped. Only an empty file list or a store that
//! cannot be provisioned stops the run.

use anyhow::Context;
use globset::{Glob, GlobMatcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{CatalogError, Result};
use crate::jsonl::JsonlReader;
use crate::markdown;
use crate::models::{FailureKind, FileReport, LoadFailure, LoadReport, Record};
use crate::provision::ensure_collection;
use crate::retry::{Pacer, RetryPolicy};
use crate::store::data_api::DataApiClient;
use crate::store::{CollectionSpec, DocumentStore, StoreProvisioner, TextField};

/// Where a record's searchable text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextSource {
    /// Product records: the raw `description` under `$vectorize`, the
    /// Markdown projection under `$hybrid`.
    Product,
    /// A non-empty string field, e.g. `text` on documentation records.
    Field(String),
}

impl TextSource {
    pub fn text_for(&self, record: &Record, field: TextField) -> Option<String> {
        match (self, field) {
            (TextSource::Product, TextField::Hybrid) => markdown::project(record),
            (TextSource::Product, TextField::Vectorize) => non_empty(record, "description"),
            (TextSource::Field(name), _) => non_empty(record, name),
        }
    }
}

fn non_empty(record: &Record, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Attach searchable text under `field`. Returns the document and whether
/// text was attached.
pub fn prepare_document(mut record: Record, source: &TextSource, field: TextField) -> (Record, bool) {
    // Never send both conventions.
    record.remove(TextField::Vectorize.key());
    record.remove(TextField::Hybrid.key());
    match source.text_for(&record, field) {
        Some(text) => {
            record.insert(field.key().to_string(), serde_json::Value::String(text));
            (record, true)
        }
        None => (record, false),
    }
}

pub struct Loader<'a> {
    provisioner: &'a dyn StoreProvisioner,
    spec: CollectionSpec,
    source: TextSource,
    pacer: Pacer,
    retry: RetryPolicy,
}

impl<'a> Loader<'a> {
    pub fn new(provisioner: &'a dyn StoreProvisioner, spec: CollectionSpec, source: TextSource) -> Self {
        Self {
            provisioner,
            spec,
            source,
            pacer: Pacer::none(),
            retry: RetryPolicy::fixed(0, Duration::ZERO),
        }
    }

    /// Fixed delay between inserts.
    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    /// Retry budget for transient insert failures.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load every file into the collection described by the loader's spec.
    pub async fn load(&self, files: &[PathBuf]) -> Result<LoadReport> {
        if files.is_empty() {
            return Err(CatalogError::NoInput(format!(
                "nothing to load into '{}'",
                self.spec.name
            )));
        }

        let (lexical_enabled, name) = ensure_collection(self.provisioner, &self.spec).await?;
        let field = TextField::for_collection(lexical_enabled);
        let store = self.provisioner.get_collection(&name).await?;
        info!("Loading into '{}' using the {} field", name, field.key());

        let mut report = LoadReport {
            collection: name,
            lexical_enabled,
            ..Default::default()
        };
        let mut first_call = true;
        for path in files {
            info!("Processing {}...", path.display());
            let file_report = self
                .load_file(path, store.as_ref(), field, &mut first_call, &mut report.errors)
                .await;
            info!(
                "Inserted {} documents from {} ({} errors)",
                file_report.inserted,
                path.display(),
                file_report.errors
            );
            report.total_inserted += file_report.inserted;
            report.per_file.push(file_report);
        }
        Ok(report)
    }

    async fn load_file(
        &self,
        path: &Path,
        store: &dyn DocumentStore,
        field: TextField,
        first_call: &mut bool,
        failures: &mut Vec<LoadFailure>,
    ) -> FileReport {
        let mut file_report = FileReport {
            path: path.to_path_buf(),
            ..Default::default()
        };

        let mut reader = match JsonlReader::open(path).await {
            Ok(reader) => reader,
            Err(e) => {
                error!("Error opening {}: {}", path.display(), e);
                file_report.errors += 1;
                failures.push(LoadFailure {
                    path: path.to_path_buf(),
                    line: 0,
                    kind: FailureKind::Read,
                    message: e.to_string(),
                    payload: None,
                });
                return file_report;
            }
        };

        loop {
            let line = match reader.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("Error reading {}: {}", path.display(), e);
                    file_report.errors += 1;
                    failures.push(LoadFailure {
                        path: path.to_path_buf(),
                        line: 0,
                        kind: FailureKind::Read,
                        message: e.to_string(),
                        payload: None,
                    });
                    break;
                }
            };

            let record = match line.parsed {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping invalid JSON line in {} (line {}): {}", path.display(), line.number, e);
                    file_report.errors += 1;
                    failures.push(LoadFailure {
                        path: path.to_path_buf(),
                        line: line.number,
                        kind: FailureKind::Format,
                        message: e.to_string(),
                        payload: Some(line.raw),
                    });
                    continue;
                }
            };

            let (document, projected) = prepare_document(record, &self.source, field);
            if !projected {
                warn!(
                    "No searchable text for document in {} (line {}); inserting without {}",
                    path.display(),
                    line.number,
                    field.key()
                );
                file_report.unprojected += 1;
            }

            if !*first_call {
                self.pacer.pause().await;
            }
            *first_call = false;

            let label = format!("insert from {} line {}", path.display(), line.number);
            match self.retry.run(&label, || store.insert(&document)).await {
                Ok(()) => file_report.inserted += 1,
                Err(e) => {
                    error!("Error inserting document from {} (line {}): {}", path.display(), line.number, e);
                    error!("Problematic data: {}", line.raw);
                    file_report.errors += 1;
                    failures.push(LoadFailure {
                        path: path.to_path_buf(),
                        line: line.number,
                        kind: FailureKind::Insert,
                        message: e.to_string(),
                        payload: Some(line.raw),
                    });
                }
            }
        }

        file_report
    }
}

/// Sorted `root/*/<file_name>` paths.
pub fn discover_family_files(root: &Path, file_name: &str) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let matcher: GlobMatcher = Glob::new(&format!("*/{}", file_name))
        .map_err(|e| CatalogError::Config(format!("bad file name '{}': {}", file_name, e)))?
        .compile_matcher();

    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(2).max_depth(2) {
        let entry = entry.map_err(|e| CatalogError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let rel_str = relative.to_string_lossy().replace('\\', "/");
        if matcher.is_match(&rel_str) {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Which family files a load command reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Products,
    Documents,
}

impl CatalogKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            CatalogKind::Products => "products.jsonl",
            CatalogKind::Documents => "documents.jsonl",
        }
    }

    pub fn text_source(&self) -> TextSource {
        match self {
            CatalogKind::Products => TextSource::Product,
            CatalogKind::Documents => TextSource::Field("text".to_string()),
        }
    }

    pub fn collection<'c>(&self, config: &'c Config) -> &'c str {
        match self {
            CatalogKind::Products => &config.collections.products,
            CatalogKind::Documents => &config.collections.documents,
        }
    }
}

/// `catalog load-products` / `catalog load-documents`.
pub async fn run_load(config: &Config, kind: CatalogKind) -> anyhow::Result<()> {
    let settings = config.require_store()?;
    let root = config.products_dir();
    let files = discover_family_files(&root, kind.file_name())?;
    if files.is_empty() {
        anyhow::bail!(
            "No {} files found under {}",
            kind.file_name(),
            root.display()
        );
    }
    info!("Found {} file(s) under {}", files.len(), root.display());

    let client = DataApiClient::new(&settings)?;
    info!("Connecting to document store: {}", client.endpoint());
    let spec = CollectionSpec::from_config(config, kind.collection(config));
    let loader = Loader::new(&client, spec, kind.text_source())
        .with_pacer(config.pacing.insert_pacer())
        .with_retry(config.pacing.retry_policy());
    let report = loader
        .load(&files)
        .await
        .with_context(|| format!("Failed to load into '{}'", kind.collection(config)))?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &LoadReport) {
    println!("load {}", report.collection);
    println!(
        "  text field: {}",
        TextField::for_collection(report.lexical_enabled).key()
    );
    for file in &report.per_file {
        println!(
            "  {}: inserted {}, errors {}, without text {}",
            file.path.display(),
            file.inserted,
            file.errors,
            file.unprojected
        );
    }
    println!("  total inserted: {}", report.total_inserted);
    println!("  errors: {}", report.error_count());
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(value: serde_json::Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_prepare_attaches_markdown_under_hybrid() {
        let (doc, projected) = prepare_document(
            rec(json!({"_id": "a", "name": "X", "description": "Y"})),
            &TextSource::Product,
            TextField::Hybrid,
        );
        assert!(projected);
        assert_eq!(doc.get("$hybrid"), Some(&json!("# X\n\nY")));
        assert!(!doc.contains_key("$vectorize"));
    }

    #[test]
    fn test_prepare_vectorize_uses_raw_description() {
        let (doc, projected) = prepare_document(
            rec(json!({"_id": "a", "name": "X", "description": "Y", "tags": ["t"]})),
            &TextSource::Product,
            TextField::Vectorize,
        );
        assert!(projected);
        assert_eq!(doc.get("$vectorize"), Some(&json!("Y")));
    }

    #[test]
    fn test_prepare_without_description() {
        let (doc, projected) = prepare_document(
            rec(json!({"_id": "a", "name": "X"})),
            &TextSource::Product,
            TextField::Vectorize,
        );
        assert!(!projected);
        assert!(!doc.contains_key("$vectorize"));
        assert!(!doc.contains_key("$hybrid"));
    }

    #[test]
    fn test_prepare_replaces_stale_text_fields() {
        let (doc, _) = prepare_document(
            rec(json!({"_id": "d", "text": "Body", "$hybrid": "old"})),
            &TextSource::Field("text".to_string()),
            TextField::Vectorize,
        );
        assert_eq!(doc.get("$vectorize"), Some(&json!("Body")));
        assert!(!doc.contains_key("$hybrid"));
    }

    #[test]
    fn test_discover_family_files_sorted() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();
        for slug in ["logicleaps", "constructobots", "kinetikits"] {
            std::fs::create_dir_all(root.join(slug)).unwrap();
        }
        std::fs::write(root.join("logicleaps/products.jsonl"), "").unwrap();
        std::fs::write(root.join("constructobots/products.jsonl"), "").unwrap();
        std::fs::write(root.join("kinetikits/documents.jsonl"), "").unwrap();
        std::fs::write(root.join("products.jsonl"), "").unwrap();

        let files = discover_family_files(root, "products.jsonl").unwrap();
        assert_eq!(
            files,
            vec![
                root.join("constructobots/products.jsonl"),
                root.join("logicleaps/products.jsonl"),
            ]
        );
        assert!(discover_family_files(&root.join("missing"), "products.jsonl")
            .unwrap()
            .is_empty());
    }
}
