//! Documentation cross-reference check for one family directory.
//!
//! `check-docs <dir>` reads `<dir>/products.jsonl` and
//! `<dir>/documents.jsonl`, reports items missing required fields, and
//! lists every `documentation_ids` entry that names no known document.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{CatalogError, Result};
use crate::jsonl;
use crate::models::Record;

/// Which kind of family file is being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Products,
    Documents,
}

impl FileKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            FileKind::Products => "products.jsonl",
            FileKind::Documents => "documents.jsonl",
        }
    }

    /// Required fields. Each entry lists accepted alternatives.
    fn required(&self) -> &'static [&'static [&'static str]] {
        match self {
            FileKind::Products => &[&["id", "_id"], &["name"], &["documentation_ids"]],
            FileKind::Documents => &[&["doc_id", "_id"], &["title"], &["text"], &["product_id"]],
        }
    }

    fn id_keys(&self) -> &'static [&'static str] {
        self.required()[0]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingFields {
    pub path: PathBuf,
    pub line: usize,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDoc {
    pub product_id: String,
    pub product_name: String,
    pub doc_id: String,
}

#[derive(Debug, Default)]
pub struct CheckReport {
    pub products: usize,
    pub documents: usize,
    pub field_errors: Vec<MissingFields>,
    pub missing_docs: Vec<MissingDoc>,
}

/// Parsed records of one file. The first unparseable line fails the file.
pub fn validate_file(path: &Path, kind: FileKind) -> Result<(Vec<Record>, Vec<MissingFields>)> {
    let mut records = Vec::new();
    let mut field_errors = Vec::new();
    for line in jsonl::read_file(path)? {
        let record = line.parsed.map_err(|e| match e {
            CatalogError::Format { line, message } => CatalogError::Format {
                line,
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })?;
        let missing: Vec<String> = kind
            .required()
            .iter()
            .filter(|alternatives| !alternatives.iter().any(|key| record.contains_key(*key)))
            .map(|alternatives| alternatives.join("|"))
            .collect();
        if !missing.is_empty() {
            field_errors.push(MissingFields {
                path: path.to_path_buf(),
                line: line.number,
                missing,
            });
        }
        records.push(record);
    }
    Ok((records, field_errors))
}

fn record_id(record: &Record, kind: FileKind) -> Option<String> {
    kind.id_keys()
        .iter()
        .find_map(|key| record.get(*key))
        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
}

/// Validate both files in `dir` and cross-check documentation references.
pub fn check_docs(dir: &Path) -> Result<CheckReport> {
    if !dir.is_dir() {
        return Err(CatalogError::NoInput(format!(
            "directory '{}' does not exist",
            dir.display()
        )));
    }
    let (products, mut field_errors) =
        validate_file(&dir.join(FileKind::Products.file_name()), FileKind::Products)?;
    let (documents, doc_field_errors) =
        validate_file(&dir.join(FileKind::Documents.file_name()), FileKind::Documents)?;
    field_errors.extend(doc_field_errors);

    let known: HashSet<String> = documents
        .iter()
        .filter_map(|d| record_id(d, FileKind::Documents))
        .collect();

    let mut missing_docs = Vec::new();
    for product in &products {
        let product_id = record_id(product, FileKind::Products).unwrap_or_default();
        let product_name = product
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let required = product
            .get("documentation_ids")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).collect::<Vec<_>>())
            .unwrap_or_default();
        for doc_id in required {
            if !known.contains(doc_id) {
                missing_docs.push(MissingDoc {
                    product_id: product_id.clone(),
                    product_name: product_name.clone(),
                    doc_id: doc_id.to_string(),
                });
            }
        }
    }

    Ok(CheckReport {
        products: products.len(),
        documents: documents.len(),
        field_errors,
        missing_docs,
    })
}

/// `catalog check-docs <dir>`.
pub fn run_check_docs(dir: &Path) -> anyhow::Result<()> {
    let report = check_docs(dir)?;

    println!("check-docs {}", dir.display());
    println!("  products: {}", report.products);
    println!("  documents: {}", report.documents);
    for error in &report.field_errors {
        println!(
            "  {} line {}: missing required fields: {}",
            error.path.display(),
            error.line,
            error.missing.join(", ")
        );
    }
    if report.missing_docs.is_empty() {
        println!("  all documentation present");
    } else {
        for missing in &report.missing_docs {
            println!(
                "  {} ({}): missing {}",
                missing.product_name, missing.product_id, missing.doc_id
            );
        }
        println!("  total missing documents: {}", report.missing_docs.len());
    }
    println!("ok");
    Ok(())
}
