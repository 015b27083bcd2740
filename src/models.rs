//! Core data types shared by the catalog commands.
//!
//! Catalog records stay untyped (`serde_json::Map`) so that unknown fields
//! pass through every stage untouched and in their original order. The
//! typed structs here describe what the commands report.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A JSON object from a `.jsonl` file. Field order is preserved.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// One entry of `image-prompts.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePrompt {
    pub id: String,
    pub prompt: String,
    pub family: String,
}

/// Why a line or record failed during a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Line was not a JSON object.
    Format,
    /// The store refused the document or the insert call failed.
    Insert,
    /// The file could not be opened or read.
    Read,
}

/// A single recorded failure with enough context to reprocess by hand.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub path: PathBuf,
    /// 1-based line number; `0` when the failure concerns the whole file.
    pub line: usize,
    pub kind: FailureKind,
    pub message: String,
    /// The offending raw line, when there is one.
    pub payload: Option<String>,
}

/// Per-file counts from a load run.
#[derive(Debug, Clone, Default)]
pub struct FileReport {
    pub path: PathBuf,
    pub inserted: u64,
    pub errors: u64,
    /// Records inserted without a searchable-text field.
    pub unprojected: u64,
}

/// Aggregate result of [`Loader::load`](crate::load::Loader::load).
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub collection: String,
    pub lexical_enabled: bool,
    pub total_inserted: u64,
    pub per_file: Vec<FileReport>,
    pub errors: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}
