//! Family splitter.
//!
//! Normalizes a flat product export and partitions it into one
//! `products.jsonl` per known family:
//!
//! ```text
//! products.jsonl ──▶ normalize ──▶ group by `family` ──▶ products/<slug>/products.jsonl
//! ```
//!
//! Records whose `family` is not a known display name are dropped, but
//! counted and logged so nothing disappears silently. Families with no
//! records in this batch are left alone on disk, so a partial export never
//! clobbers data written by an earlier run.

use anyhow::Context;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::jsonl;
use crate::models::Record;
use crate::normalize::normalize;

/// File written inside each family directory.
pub const PRODUCTS_FILE: &str = "products.jsonl";

/// Lower-case and drop whitespace: `"Robo Kits"` → `"robokits"`.
pub fn slugify(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Ordered mapping of family display name → directory slug.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Families {
    entries: Vec<(String, String)>,
}

impl Families {
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Case-sensitive lookup by display name.
    pub fn slug_for(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(display, _)| display == name)
            .map(|(_, slug)| slug.as_str())
    }

    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, slug)| slug.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(d, s)| (d.as_str(), s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of grouping records by family.
#[derive(Debug, Default)]
pub struct SplitOutcome {
    /// Every known slug, each with its records in input order (possibly empty).
    pub groups: BTreeMap<String, Vec<Record>>,
    /// Records dropped because their `family` is unknown, keyed by that value.
    pub dropped: BTreeMap<String, usize>,
    /// Records rejected by the normalizer.
    pub schema_errors: usize,
}

impl SplitOutcome {
    pub fn dropped_unknown_family(&self) -> usize {
        self.dropped.values().sum()
    }
}

/// Normalize each record and group it under its family's slug.
pub fn split<I>(records: I, families: &Families) -> SplitOutcome
where
    I: IntoIterator<Item = Record>,
{
    let mut outcome = SplitOutcome {
        groups: families.slugs().map(|s| (s.to_string(), Vec::new())).collect(),
        ..Default::default()
    };

    for record in records {
        let record = match normalize(record) {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping product: {}", e);
                outcome.schema_errors += 1;
                continue;
            }
        };

        let family = match record.get("family") {
            Some(serde_json::Value::String(f)) => f.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };

        match families.slug_for(&family) {
            Some(slug) => outcome
                .groups
                .entry(slug.to_string())
                .or_default()
                .push(record),
            None => {
                let id = record.get("_id").map(|v| v.to_string()).unwrap_or_default();
                warn!("Dropping product {} with unknown family '{}'", id, family);
                *outcome.dropped.entry(family).or_insert(0) += 1;
            }
        }
    }

    outcome
}

/// A family file produced by [`write_families`].
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenFile {
    pub slug: String,
    pub path: PathBuf,
    pub count: usize,
}

/// Create every family directory under `root` and write the non-empty groups.
pub fn write_families(
    root: &Path,
    outcome: &SplitOutcome,
    families: &Families,
) -> Result<Vec<WrittenFile>> {
    std::fs::create_dir_all(root)?;
    for slug in families.slugs() {
        std::fs::create_dir_all(root.join(slug))?;
    }

    let mut written = Vec::new();
    for slug in families.slugs() {
        let records = match outcome.groups.get(slug) {
            Some(records) if !records.is_empty() => records,
            _ => continue,
        };
        let path = root.join(slug).join(PRODUCTS_FILE);
        let contents = jsonl::to_jsonl(records)?;
        jsonl::write_atomic(&path, &contents)?;
        info!("Created {} with {} products", path.display(), records.len());
        written.push(WrittenFile {
            slug: slug.to_string(),
            path,
            count: records.len(),
        });
    }
    Ok(written)
}

/// `catalog split`: read the flat export and write per-family files.
pub fn run_split(config: &Config) -> anyhow::Result<()> {
    let input = config.export_path();
    let lines = jsonl::read_file(&input)
        .with_context(|| format!("Failed to read product export: {}", input.display()))?;

    let mut format_errors = 0usize;
    let mut records = Vec::with_capacity(lines.len());
    for line in lines {
        match line.parsed {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("Skipping line in {}: {} ({})", input.display(), e, line.raw);
                format_errors += 1;
            }
        }
    }

    let families = config.families();
    let outcome = split(records, &families);
    let out_root = config.products_dir();
    let written = write_families(&out_root, &outcome, &families)
        .with_context(|| format!("Failed to write family files under {}", out_root.display()))?;

    println!("split {}", input.display());
    for file in &written {
        println!("  {:<16} {} products", file.slug, file.count);
    }
    println!("  files written: {}", written.len());
    println!("  dropped (unknown family): {}", outcome.dropped_unknown_family());
    for (family, count) in &outcome.dropped {
        println!("    '{}': {}", family, count);
    }
    println!("  schema errors: {}", outcome.schema_errors);
    println!("  invalid lines: {}", format_errors);
    println!("ok");
    Ok(())
}
