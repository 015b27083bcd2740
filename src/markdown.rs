//! Markdown projection of a product record.
//!
//! The projection is the searchable-text payload sent to the store. It is
//! deterministic: the same record always renders to the same string, with
//! attributes in the order they appear in the record.
//!
//! ```text
//! # Name
//!
//! Description
//!
//! ## Attributes
//!
//! * **age_range**: 8-12
//! * battery-free
//!
//! ## Tags
//!
//! robotics, STEAM
//! ```

use serde_json::Value;

use crate::models::Record;

/// Render `record` as markdown, or `None` when it has no description.
pub fn project(record: &Record) -> Option<String> {
    let description = record
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty())?;

    let mut sections = Vec::new();

    if let Some(name) = record
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        sections.push(format!("# {}", name));
    }

    sections.push(description.to_string());

    let attributes = record.get("attributes").map(attribute_lines).unwrap_or_default();
    if !attributes.is_empty() {
        sections.push(format!("## Attributes\n\n{}", attributes.join("\n")));
    }

    let tags = record.get("tags").map(tag_list).unwrap_or_default();
    if !tags.is_empty() {
        sections.push(format!("## Tags\n\n{}", tags.join(", ")));
    }

    Some(sections.join("\n\n"))
}

/// Bullet lines for either attribute shape: a mapping of name → scalar or a
/// sequence of `{name, value}` objects.
fn attribute_lines(attributes: &Value) -> Vec<String> {
    match attributes {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| bullet(k, Some(v)))
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Null => None,
                Value::Object(obj) => {
                    let name = obj.get("name").filter(|n| !n.is_null()).map(render_value)?;
                    let value = obj.get("value").filter(|v| !v.is_null());
                    Some(bullet(&name, value))
                }
                other => Some(format!("* {}", render_value(other))),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn bullet(name: &str, value: Option<&Value>) -> String {
    match value {
        Some(v) => format!("* **{}**: {}", name, render_value(v)),
        None => format!("* {}", name),
    }
}

fn tag_list(tags: &Value) -> Vec<String> {
    let raw: Vec<String> = match tags {
        Value::Array(items) => items
            .iter()
            .filter(|t| !t.is_null())
            .map(render_value)
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    };
    raw.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Text for a JSON value: strings as-is, arrays comma-joined, other scalars
/// via their JSON form.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
