//! Raw product record → canonical stored shape.
//!
//! Three rewrites, each a no-op on already-normalized input:
//!
//! - `id` is renamed to `_id`
//! - `category_path` (`"Toys > Robotics > Arms"`) becomes `product_type`
//!   (`"Robotics"`)
//! - `image_url` gets a lower-cased file stem and a `.png` extension
//!
//! Everything else passes through in its original position.

use serde_json::Value;
use tracing::warn;

use crate::error::{CatalogError, Result};
use crate::models::Record;

/// Normalize a raw product record.
///
/// Fails only when the record has neither `id` nor `_id`.
pub fn normalize(record: Record) -> Result<Record> {
    let has_id = record.contains_key("id");
    if !has_id && !record.contains_key("_id") {
        return Err(CatalogError::Schema(
            "record has no identifier (expected `id` or `_id`)".to_string(),
        ));
    }
    let derives_type = matches!(record.get("category_path"), Some(Value::String(_)));

    let mut out = Record::new();
    for (key, value) in record {
        match key.as_str() {
            "id" => {
                out.insert("_id".to_string(), value);
            }
            // Superseded by `id` above.
            "_id" if has_id => {}
            "product_type" if derives_type => {}
            "category_path" => match value {
                Value::String(path) => {
                    out.insert(
                        "product_type".to_string(),
                        Value::String(product_type(&path)),
                    );
                }
                other => {
                    warn!("category_path is not a string, leaving it unchanged: {}", other);
                    out.insert(key, other);
                }
            },
            "image_url" => {
                let value = match value {
                    Value::String(path) => match normalize_image_path(&path) {
                        Some(normalized) => Value::String(normalized),
                        None => {
                            warn!("Could not process image_url '{}', leaving it unchanged", path);
                            Value::String(path)
                        }
                    },
                    other => other,
                };
                out.insert(key, value);
            }
            _ => {
                out.insert(key, value);
            }
        }
    }
    Ok(out)
}

/// Second `>`-separated segment of a category path, or the first when
/// there is only one. Segments are trimmed.
pub fn product_type(category_path: &str) -> String {
    let mut parts = category_path.split('>');
    let first = parts.next().unwrap_or_default();
    parts.next().unwrap_or(first).trim().to_string()
}

/// Lower-case the file stem, force `.png`, keep the directory, use `/`.
///
/// Returns `None` for paths with no usable file name.
pub fn normalize_image_path(path: &str) -> Option<String> {
    let unified = path.trim().replace('\\', "/");
    let (dir, file) = match unified.rfind('/') {
        Some(idx) => (Some(&unified[..idx]), &unified[idx + 1..]),
        None => (None, unified.as_str()),
    };
    if file.is_empty() || file == "." || file == ".." {
        return None;
    }
    let stem = match file.rfind('.') {
        Some(idx) if idx > 0 => &file[..idx],
        _ => file,
    };
    let name = format!("{}.png", stem.to_lowercase());
    Some(match dir {
        Some(dir) => format!("{}/{}", dir, name),
        None => name,
    })
}
