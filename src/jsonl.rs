//! JSON-lines reading and writing.
//!
//! Every catalog file is UTF-8 with one JSON object per line. Readers keep
//! the raw text of each line alongside the parse result so failures can be
//! logged with the exact payload. Blank lines are skipped but still count
//! toward line numbers. Lines are split on raw bytes and decoded one at a
//! time, so a line that is not UTF-8 is a `Format` failure for that line
//! only.

use std::io::Write;
use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{CatalogError, Result};
use crate::models::Record;

/// A non-blank line from a `.jsonl` file.
#[derive(Debug)]
pub struct JsonlLine {
    /// 1-based line number.
    pub number: usize,
    /// Line text with surrounding whitespace trimmed.
    pub raw: String,
    pub parsed: Result<Record>,
}

/// Parse one line into a JSON object.
pub fn parse_line(number: usize, raw: &str) -> Result<Record> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(CatalogError::Format {
            line: number,
            message: format!("expected a JSON object, found {}", json_kind(&other)),
        }),
        Err(e) => Err(CatalogError::Format {
            line: number,
            message: e.to_string(),
        }),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Decode one raw line. `None` for blank lines.
fn decode_line(number: usize, bytes: &[u8]) -> Option<JsonlLine> {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            Some(JsonlLine {
                number,
                raw: trimmed.to_string(),
                parsed: parse_line(number, trimmed),
            })
        }
        Err(e) => Some(JsonlLine {
            number,
            raw: String::from_utf8_lossy(bytes).trim().to_string(),
            parsed: Err(CatalogError::Format {
                line: number,
                message: format!("invalid UTF-8: {}", e),
            }),
        }),
    }
}

/// Split raw file contents into parsed lines.
pub fn parse_bytes(content: &[u8]) -> Vec<JsonlLine> {
    content
        .split(|b| *b == b'\n')
        .enumerate()
        .filter_map(|(idx, line)| decode_line(idx + 1, line))
        .collect()
}

/// Split already-loaded text into parsed lines.
pub fn parse_str(content: &str) -> Vec<JsonlLine> {
    parse_bytes(content.as_bytes())
}

/// Read a whole `.jsonl` file. I/O failures are returned; per-line parse
/// and decode failures are carried inside each [`JsonlLine`].
pub fn read_file(path: &Path) -> Result<Vec<JsonlLine>> {
    let content = std::fs::read(path)?;
    Ok(parse_bytes(&content))
}

/// Streaming reader used by the loader so large files never sit in memory.
pub struct JsonlReader {
    reader: BufReader<tokio::fs::File>,
    buf: Vec<u8>,
    number: usize,
}

impl JsonlReader {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self {
            reader: BufReader::new(file),
            buf: Vec::new(),
            number: 0,
        })
    }

    /// Next non-blank line, or `None` at end of file.
    pub async fn next_line(&mut self) -> Result<Option<JsonlLine>> {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
                return Ok(None);
            }
            self.number += 1;
            if let Some(line) = decode_line(self.number, &self.buf) {
                return Ok(Some(line));
            }
        }
    }
}

/// Serialize records as compact JSON, one per line, each newline-terminated.
pub fn to_jsonl<'a, I>(records: I) -> Result<String>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

/// Replace `path` with `contents` without ever leaving it half-written.
///
/// Content goes to a sibling temp file first, then is renamed over the
/// target, so a failure leaves any previous file intact.
pub fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| CatalogError::Config(format!("not a file path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(contents.as_ref())?;
        file.sync_all()?;
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_str_skips_blank_lines_keeps_numbers() {
        let lines = parse_str("{\"a\":1}\n\n   \n{\"b\":2}\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].number, 1);
        assert_eq!(lines[1].number, 4);
        assert!(lines[1].parsed.is_ok());
    }

    #[test]
    fn test_parse_line_rejects_non_objects() {
        let err = parse_line(3, "[1,2]").unwrap_err();
        match err {
            CatalogError::Format { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("array"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(parse_line(1, "{not json").is_err());
    }

    #[test]
    fn test_to_jsonl_preserves_field_order() {
        let record = json!({"z": 1, "a": 2, "m": 3});
        let map = record.as_object().unwrap().clone();
        let text = to_jsonl([&map]).unwrap();
        assert_eq!(text, "{\"z\":1,\"a\":2,\"m\":3}\n");
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("products.jsonl");
        std::fs::write(&path, "old\n").unwrap();
        write_atomic(&path, "new\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_parse_bytes_isolates_invalid_utf8() {
        let lines = parse_bytes(b"{\"a\":1}\n{\"b\":\"\xff\"}\r\n{\"c\":3}\n");
        assert_eq!(lines.len(), 3);
        assert!(lines[0].parsed.is_ok());
        match &lines[1].parsed {
            Err(CatalogError::Format { line, message }) => {
                assert_eq!(*line, 2);
                assert!(message.contains("UTF-8"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(lines[1].raw, "{\"b\":\"\u{FFFD}\"}");
        assert_eq!(lines[2].number, 3);
        assert!(lines[2].parsed.is_ok());
    }

    #[tokio::test]
    async fn test_reader_skips_past_invalid_utf8() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("products.jsonl");
        std::fs::write(&path, b"{\"a\":1}\n\xfe\xff\n{\"c\":3}\n").unwrap();

        let mut reader = JsonlReader::open(&path).await.unwrap();
        assert!(reader.next_line().await.unwrap().unwrap().parsed.is_ok());
        let bad = reader.next_line().await.unwrap().unwrap();
        assert_eq!(bad.number, 2);
        assert!(matches!(bad.parsed, Err(CatalogError::Format { line: 2, .. })));
        let last = reader.next_line().await.unwrap().unwrap();
        assert_eq!(last.number, 3);
        assert!(last.parsed.is_ok());
        assert!(reader.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_streams_lines() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("docs.jsonl");
        std::fs::write(&path, "{\"a\":1}\nnot json\n\n{\"c\":3}").unwrap();

        let mut reader = JsonlReader::open(&path).await.unwrap();
        let first = reader.next_line().await.unwrap().unwrap();
        assert_eq!(first.number, 1);
        assert!(first.parsed.is_ok());
        let second = reader.next_line().await.unwrap().unwrap();
        assert_eq!(second.raw, "not json");
        assert!(second.parsed.is_err());
        let third = reader.next_line().await.unwrap().unwrap();
        assert_eq!(third.number, 4);
        assert!(reader.next_line().await.unwrap().is_none());
    }
}
