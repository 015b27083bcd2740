//! Turn product and document IDs inside documentation text into Markdown links.
//!
//! Known IDs come from the family files themselves. Only lines whose `text`
//! contains something ID-shaped are sent to the [`ChatClient`]; every other
//! line is written back byte-for-byte, and a file with no updates is not
//! touched at all.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::jsonl;
use crate::load::discover_family_files;
use crate::openai::OpenAiClient;
use crate::retry::Pacer;
use crate::split::PRODUCTS_FILE;

const DOCUMENTS_FILE: &str = "documents.jsonl";

/// Model that rewrites a text given system and user instructions.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Returns the rewritten text.
    async fn rewrite(&self, system: &str, user: &str) -> Result<String>;
}

fn candidate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b([A-Z]{2,}-[A-Z0-9]{3,}-[0-9]{3}(?:_[A-Z]+(?:_[vV][0-9.]+)?)?)\b")
            .expect("candidate pattern is valid")
    })
}

/// ID-shaped substrings of `text`, e.g. `LL-MCU-002` or `LL-MCU-002_FAQ_v1.0`.
pub fn find_candidates(text: &str) -> Vec<&str> {
    candidate_regex()
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Insertion-ordered id → label map where the first value wins.
#[derive(Debug, Default)]
pub struct IdMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl IdMap {
    fn insert(&mut self, id: &str, label: &str, what: &str) {
        match self.index.get(id) {
            Some(&idx) => {
                if self.entries[idx].1 != label {
                    warn!("Duplicate {} id '{}' found with different labels. Keeping first.", what, id);
                }
            }
            None => {
                self.index.insert(id.to_string(), self.entries.len());
                self.entries.push((id.to_string(), label.to_string()));
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.index.get(id).map(|&idx| self.entries[idx].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn render(&self, prefix: &str) -> String {
        self.entries
            .iter()
            .map(|(id, label)| format!("{}: {} - {}", prefix, id, label))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Default)]
pub struct LinkMaps {
    /// Document `_id` → title.
    pub documents: IdMap,
    /// Product `_id` (or `sku`) → name.
    pub products: IdMap,
}

impl LinkMaps {
    pub fn document_list(&self) -> String {
        self.documents.render("Doc")
    }

    pub fn product_list(&self) -> String {
        self.products.render("Prod")
    }
}

fn str_field<'r>(record: &'r crate::models::Record, key: &str) -> Option<&'r str> {
    record.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn collect_into(map: &mut IdMap, path: &Path, id_keys: &[&str], label_key: &str, what: &str) {
    let lines = match jsonl::read_file(path) {
        Ok(lines) => lines,
        Err(e) => {
            error!("Error reading file {}: {}", path.display(), e);
            return;
        }
    };
    for line in lines {
        let record = match line.parsed {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping invalid JSON in {} line {}: {}", path.display(), line.number, e);
                continue;
            }
        };
        let Some(id) = id_keys.iter().find_map(|key| str_field(&record, key)) else {
            continue;
        };
        match str_field(&record, label_key) {
            Some(label) => map.insert(id, label, what),
            None => warn!("{} '{}' in {} is missing a {}.", what, id, path.display(), label_key),
        }
    }
}

/// Read every family file under `products_dir` into id maps.
pub fn build_maps(products_dir: &Path) -> Result<LinkMaps> {
    let mut maps = LinkMaps::default();
    for path in discover_family_files(products_dir, DOCUMENTS_FILE)? {
        collect_into(&mut maps.documents, &path, &["_id"], "title", "document");
    }
    for path in discover_family_files(products_dir, PRODUCTS_FILE)? {
        collect_into(&mut maps.products, &path, &["_id", "sku"], "name", "product");
    }
    info!(
        "Found titles for {} documents and names for {} products",
        maps.documents.len(),
        maps.products.len()
    );
    Ok(maps)
}

pub const SYSTEM_PROMPT: &str = "You are an expert technical writer assistant. Your task is to analyze text and replace references to specific document and product IDs with Markdown links, using the provided lists for accuracy. Respond with the fully modified text.";

/// Instructions for one document text.
pub fn user_prompt(maps: &LinkMaps, current_id: &str, current_title: &str, text: &str) -> String {
    format!(
        "Analyze the following text and replace references to document or product IDs with Markdown links.

Instructions:
1. Use the provided lists (`Known Documents`, `Known Products`) to find the correct title/name for each ID referenced in the `Original Text`.
2. Format document links as: `[Document Title](/document/DOCUMENT_ID)`
3. Format product links as: `[Product Name](/product/PRODUCT_ID)`
4. If a reference in the text is ambiguous (e.g., missing version like 'LL-MCU-002 FAQ' when the list has 'LL-MCU-002_FAQ_v1.0'), use the most likely match from the list if confidence is high.
5. When you identify a reference like `Some Name (ID)` or `(ID) Some Name` or just `ID` that corresponds to an entry in the lists, replace the entire reference phrase with the single Markdown link. Do not leave parts of the original reference text around the link.
6. Preserve all surrounding text, whitespace, and existing Markdown formatting accurately.
7. Do NOT create a link for the title or ID of the document being processed (Current Document ID: `{current_id}`, Title: `{current_title}`). Leave references to it as plain text.

Known Documents:
---
{documents}
---

Known Products:
---
{products}
---

Original Text:
---
{text}
---

Output the full modified text containing the replacements.
",
        current_id = current_id,
        current_title = current_title,
        documents = maps.document_list(),
        products = maps.product_list(),
        text = text,
    )
}

/// Rewrite one `documents.jsonl`. Returns the number of updated lines.
pub async fn rewrite_file(
    chat: &dyn ChatClient,
    path: &Path,
    maps: &LinkMaps,
    pacer: &Pacer,
) -> Result<usize> {
    let content = std::fs::read_to_string(path)?;
    let mut output = String::with_capacity(content.len());
    let mut updates = 0;

    for (idx, original) in content.split_inclusive('\n').enumerate() {
        let number = idx + 1;
        let trimmed = original.trim();
        if trimmed.is_empty() {
            output.push_str(original);
            continue;
        }
        let mut record = match jsonl::parse_line(number, trimmed) {
            Ok(record) => record,
            Err(e) => {
                warn!("Invalid JSON on line {} of {}: {}. Keeping original line.", number, path.display(), e);
                output.push_str(original);
                continue;
            }
        };
        let Some(text) = record.get("text").and_then(Value::as_str).map(str::to_string) else {
            output.push_str(original);
            continue;
        };
        let candidates = find_candidates(&text);
        if candidates.is_empty() {
            output.push_str(original);
            continue;
        }

        let current_id = str_field(&record, "_id").unwrap_or_default().to_string();
        let current_title = maps.documents.get(&current_id).unwrap_or_default();
        info!(
            "{} line {} ({}): found candidates {:?}",
            path.display(),
            number,
            current_id,
            candidates
        );
        let prompt = user_prompt(maps, &current_id, current_title, &text);
        let result = chat.rewrite(SYSTEM_PROMPT, &prompt).await;
        pacer.pause().await;

        match result {
            Ok(modified) if modified != text => {
                record.insert("text".to_string(), Value::String(modified));
                output.push_str(&serde_json::to_string(&record)?);
                if original.ends_with('\n') {
                    output.push('\n');
                }
                updates += 1;
                info!("Line {} updated.", number);
            }
            Ok(_) => {
                debug!("Line {} returned identical text.", number);
                output.push_str(original);
            }
            Err(e) => {
                error!("Rewrite failed for line {} in {}: {}. Keeping original.", number, path.display(), e);
                output.push_str(original);
            }
        }
    }

    if updates > 0 {
        info!("Writing {} updates to {}...", updates, path.display());
        jsonl::write_atomic(path, &output)?;
    } else {
        info!("No updates made to {}.", path.display());
    }
    Ok(updates)
}

/// `catalog links`.
pub async fn run_links(config: &Config) -> anyhow::Result<()> {
    let settings = config.require_openai()?;
    let products_dir = config.products_dir();
    let maps = build_maps(&products_dir)?;
    if maps.documents.is_empty() && maps.products.is_empty() {
        anyhow::bail!("Failed to build document and product maps under {}", products_dir.display());
    }
    if maps.documents.is_empty() {
        warn!("Document map is empty; only product links can be resolved.");
    } else if maps.products.is_empty() {
        warn!("Product map is empty; only document links can be resolved.");
    }

    let doc_files = discover_family_files(&products_dir, DOCUMENTS_FILE)?;
    if doc_files.is_empty() {
        anyhow::bail!("No {} files found under {}", DOCUMENTS_FILE, products_dir.display());
    }

    let client = OpenAiClient::new(&settings, &config.openai)?;
    client
        .ping()
        .await
        .context("Failed to connect to the OpenAI API")?;
    let pacer = config.pacing.chat_pacer();

    println!("links {}", products_dir.display());
    let mut total = 0;
    for path in &doc_files {
        match rewrite_file(&client, path, &maps, &pacer).await {
            Ok(updates) => {
                println!("  {}: {} updated", path.display(), updates);
                total += updates;
            }
            Err(e) => {
                error!("Failed to process {}: {}", path.display(), e);
                println!("  {}: error: {}", path.display(), e);
            }
        }
    }
    println!("  total updates: {}", total);
    println!("ok");
    Ok(())
}
