//! Image prompts from the product catalog.
//!
//! Every product with an id yields one [`ImagePrompt`] describing a studio
//! product photograph. The prompts file is rewritten in full on each run.

use std::path::Path;

use anyhow::Context;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::jsonl;
use crate::load::discover_family_files;
use crate::models::{ImagePrompt, Record};
use crate::split::PRODUCTS_FILE;

const STYLE_TAGS: [&str; 6] = [
    "educational kit",
    "STEAM",
    "learning tool",
    "electronics components",
    "modular",
    "robotics",
];

const COMPOSITION: [&str; 5] = [
    "The product should be clearly visible, well-lit, and presented attractively.",
    "Showcase the key components mentioned in the description.",
    "Setting: Clean white or light grey neutral background, studio lighting.",
    "Style: Realistic, sharp focus, detailed product photography, slightly elevated angle view.",
    "--no text labels on components --no excessive clutter --no people --no hands --no packaging unless specified",
];

fn str_field<'r>(record: &'r Record, key: &str) -> Option<&'r str> {
    record.get(key).and_then(Value::as_str)
}

fn attribute<'r>(record: &'r Record, key: &str) -> Option<&'r Value> {
    record
        .get("attributes")
        .and_then(Value::as_object)
        .and_then(|attrs| attrs.get(key))
        .filter(|v| !v.is_null())
}

fn attribute_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn is_style_tag(tag: &str) -> bool {
    STYLE_TAGS.contains(&tag) || tag.contains("kit") || tag.contains("sensor") || tag.contains("module")
}

/// Photography prompt for one product. `fallback_family` is used when the
/// record carries no `family`.
pub fn build_prompt(record: &Record, fallback_family: &str) -> String {
    let name = str_field(record, "name").unwrap_or("Unnamed Product");
    let family = str_field(record, "family").unwrap_or(fallback_family);
    let product_type = str_field(record, "product_type").unwrap_or("product");

    let mut parts = vec![
        format!(
            "High-quality product photograph of a '{}' from the '{}' family.",
            name, family
        ),
        format!("Type: {}.", product_type),
    ];
    if let Some(description) = str_field(record, "description").filter(|d| !d.is_empty()) {
        parts.push(description.to_string());
    }

    if let Some(focus) = attribute(record, "focus_area").map(attribute_text) {
        if !focus.is_empty() {
            parts.push(format!("Focuses on: {}.", focus));
        }
    }
    if let Some(complexity) = attribute(record, "complexity").map(attribute_text) {
        parts.push(format!("Complexity: {}.", complexity));
    }
    if let Some(age) = attribute(record, "age_range").map(attribute_text) {
        parts.push(format!("Target age: {}.", age));
    }

    let tags: Vec<&str> = record
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(Value::as_str).filter(|t| is_style_tag(t)).collect())
        .unwrap_or_default();
    if !tags.is_empty() {
        parts.push(format!("Keywords: {}.", tags.join(", ")));
    }

    parts.extend(COMPOSITION.iter().map(|s| s.to_string()));
    parts.join(" ")
}

/// Prompts plus the number of lines that could not be used.
#[derive(Debug, Default)]
pub struct PromptSet {
    pub prompts: Vec<ImagePrompt>,
    pub errors: usize,
}

/// Build prompts for every `products_dir/*/products.jsonl`.
pub fn collect_prompts(products_dir: &Path) -> Result<PromptSet> {
    let mut set = PromptSet::default();
    for path in discover_family_files(products_dir, PRODUCTS_FILE)? {
        let dir_family = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        info!("Processing file: {}", path.display());

        let lines = match jsonl::read_file(&path) {
            Ok(lines) => lines,
            Err(e) => {
                error!("Error reading file {}: {}", path.display(), e);
                set.errors += 1;
                continue;
            }
        };
        for line in lines {
            let record = match line.parsed {
                Ok(record) => record,
                Err(e) => {
                    error!("Skipping invalid JSON line in {} (line {}): {}", path.display(), line.number, e);
                    set.errors += 1;
                    continue;
                }
            };
            let id = str_field(&record, "_id").or_else(|| str_field(&record, "id"));
            let Some(id) = id.filter(|id| !id.is_empty()) else {
                warn!("Skipping product with missing id in {} (line {})", path.display(), line.number);
                set.errors += 1;
                continue;
            };
            set.prompts.push(ImagePrompt {
                id: id.to_string(),
                prompt: build_prompt(&record, &dir_family),
                family: str_field(&record, "family").unwrap_or(&dir_family).to_string(),
            });
        }
    }
    Ok(set)
}

/// `catalog prompts`.
pub fn run_prompts(config: &Config) -> anyhow::Result<()> {
    let products_dir = config.products_dir();
    let set = collect_prompts(&products_dir)?;
    if set.prompts.is_empty() {
        anyhow::bail!("No products with ids found under {}", products_dir.display());
    }

    let out = config.prompts_path();
    let mut content = String::new();
    for prompt in &set.prompts {
        content.push_str(&serde_json::to_string(prompt)?);
        content.push('\n');
    }
    jsonl::write_atomic(&out, &content)
        .with_context(|| format!("Failed to write prompts to {}", out.display()))?;

    println!("prompts {}", out.display());
    println!("  prompts written: {}", set.prompts.len());
    println!("  errors: {}", set.errors);
    println!("ok");
    Ok(())
}
