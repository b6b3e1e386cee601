//! Adapts the accepted input shapes into one record iterator.

use crate::error::ShredError;
use crate::Record;
use serde_json::Value;
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

/// The input shapes accepted by the pump. Everything converges on an
/// iterator of records; see [`record_iterator`].
#[derive(Debug)]
pub enum DataSource {
    /// A single record.
    Record(Record),
    /// An in-memory sequence of records.
    Records(Vec<Record>),
    /// An already-parsed JSON document: an object or an array of objects.
    Parsed(Value),
    /// JSON or JSONL text; which one is sniffed from the content.
    Text(String),
    /// JSON or JSONL bytes, assumed UTF-8.
    Bytes(Vec<u8>),
    /// A file path. `.jsonl`/`.ndjson` are read line by line; anything
    /// else is parsed as a single JSON document.
    Path(PathBuf),
}

impl From<Record> for DataSource {
    fn from(record: Record) -> DataSource {
        DataSource::Record(record)
    }
}

impl From<Vec<Record>> for DataSource {
    fn from(records: Vec<Record>) -> DataSource {
        DataSource::Records(records)
    }
}

impl From<Value> for DataSource {
    fn from(value: Value) -> DataSource {
        DataSource::Parsed(value)
    }
}

impl From<String> for DataSource {
    fn from(text: String) -> DataSource {
        DataSource::Text(text)
    }
}

impl From<&str> for DataSource {
    fn from(text: &str) -> DataSource {
        DataSource::Text(text.to_string())
    }
}

impl From<Vec<u8>> for DataSource {
    fn from(bytes: Vec<u8>) -> DataSource {
        DataSource::Bytes(bytes)
    }
}

impl From<PathBuf> for DataSource {
    fn from(path: PathBuf) -> DataSource {
        DataSource::Path(path)
    }
}

impl From<&Path> for DataSource {
    fn from(path: &Path) -> DataSource {
        DataSource::Path(path.to_path_buf())
    }
}

/// Iterator over input records. Item errors are per-record (a bad JSONL
/// line, a non-object element) and are routed through the recovery policy
/// by the pump; errors constructing the iterator are fatal.
pub struct RecordIter {
    inner: Box<dyn Iterator<Item = Result<Record, ShredError>>>,
}

impl std::fmt::Debug for RecordIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordIter").finish_non_exhaustive()
    }
}

impl Iterator for RecordIter {
    type Item = Result<Record, ShredError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl RecordIter {
    fn new(inner: impl Iterator<Item = Result<Record, ShredError>> + 'static) -> RecordIter {
        RecordIter {
            inner: Box::new(inner),
        }
    }
}

/// Opens `source` as a uniform record iterator.
pub fn record_iterator(source: DataSource) -> Result<RecordIter, ShredError> {
    match source {
        DataSource::Record(record) => Ok(RecordIter::new(std::iter::once(Ok(record)))),
        DataSource::Records(records) => Ok(RecordIter::new(records.into_iter().map(Ok))),
        DataSource::Parsed(value) => parsed_iterator(value, "input"),
        DataSource::Text(text) => text_iterator(text),
        DataSource::Bytes(bytes) => {
            let text = String::from_utf8(bytes)
                .map_err(|err| ShredError::Parse(format!("input is not valid UTF-8: {err}")))?;
            text_iterator(text)
        }
        DataSource::Path(path) => path_iterator(&path),
    }
}

fn path_iterator(path: &Path) -> Result<RecordIter, ShredError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jsonl") | Some("ndjson") => {
            let file = fs::File::open(path).map_err(|err| open_error(path, err))?;
            Ok(RecordIter::new(JsonlLines::new(
                io::BufReader::new(file).lines(),
                path.display().to_string(),
            )))
        }
        _ => {
            let content = fs::read(path).map_err(|err| open_error(path, err))?;
            let value: Value = serde_json::from_slice(&content).map_err(|err| {
                ShredError::Parse(format!("invalid JSON in file {}: {err}", path.display()))
            })?;
            parsed_iterator(value, &path.display().to_string())
        }
    }
}

fn open_error(path: &Path, err: io::Error) -> ShredError {
    ShredError::Processing(format!("failed to read file {}: {err}", path.display()))
}

/// Decides whether in-memory text is one JSON document or JSONL: multi-line
/// content where at least two lines independently parse as objects is
/// treated as JSONL.
fn text_iterator(text: String) -> Result<RecordIter, ShredError> {
    if text.trim().is_empty() {
        return Err(ShredError::Processing(
            "no JSON content provided".to_string(),
        ));
    }

    if looks_like_jsonl(&text) {
        let lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();
        Ok(RecordIter::new(JsonlLines::new(
            lines.into_iter().map(Ok),
            "JSONL input".to_string(),
        )))
    } else {
        let value: Value = serde_json::from_str(&text)
            .map_err(|err| ShredError::Parse(format!("invalid JSON input: {err}")))?;
        parsed_iterator(value, "input")
    }
}

fn looks_like_jsonl(text: &str) -> bool {
    let snippet = text.trim();
    if !snippet.contains('\n') {
        return false;
    }
    let mut hits = 0;
    for line in snippet
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(5)
    {
        if !line.starts_with('{') {
            continue;
        }
        if serde_json::from_str::<Value>(line).is_ok() {
            hits += 1;
        }
    }
    hits >= 2
}

fn parsed_iterator(value: Value, source: &str) -> Result<RecordIter, ShredError> {
    match value {
        Value::Object(record) => Ok(RecordIter::new(std::iter::once(Ok(record)))),
        Value::Array(items) => {
            let source = source.to_string();
            Ok(RecordIter::new(items.into_iter().enumerate().map(
                move |(index, item)| match item {
                    Value::Object(record) => Ok(record),
                    other => Err(ShredError::Parse(format!(
                        "expected JSON object at index {index} in {source}, got {}",
                        kind_name(&other)
                    ))),
                },
            )))
        }
        other => Err(ShredError::Processing(format!(
            "expected JSON object or array of objects in {source}, got {}",
            kind_name(&other)
        ))),
    }
}

/// Line-oriented JSONL decoding. Each line is decoded independently so one
/// bad line surfaces as one item error without corrupting the stream. An
/// underlying read error ends the stream after being reported.
struct JsonlLines<L> {
    lines: L,
    source: String,
    line_no: usize,
    done: bool,
}

impl<L> JsonlLines<L> {
    fn new(lines: L, source: String) -> JsonlLines<L> {
        JsonlLines {
            lines,
            source,
            line_no: 0,
            done: false,
        }
    }
}

impl<L: Iterator<Item = io::Result<String>>> Iterator for JsonlLines<L> {
    type Item = Result<Record, ShredError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    self.done = true;
                    return Some(Err(ShredError::Processing(format!(
                        "error reading {}: {err}",
                        self.source
                    ))));
                }
            };
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            return Some(match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Object(record)) => Ok(record),
                Ok(other) => Err(ShredError::Parse(format!(
                    "expected JSON object on line {} in {}, got {}",
                    self.line_no,
                    self.source,
                    kind_name(&other)
                ))),
                Err(err) => Err(ShredError::Parse(format!(
                    "invalid JSON on line {} in {}: {err}",
                    self.line_no, self.source
                ))),
            });
        }
        None
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn collect(source: DataSource) -> Vec<Result<Record, ShredError>> {
        record_iterator(source).expect("open iterator").collect()
    }

    #[test]
    fn single_record_yields_once() {
        let record = json!({"a": 1}).as_object().unwrap().clone();
        let results = collect(DataSource::Record(record));
        assert_eq!(1, results.len());
        assert!(results[0].is_ok());
    }

    #[test]
    fn parsed_array_yields_elements_and_flags_non_objects() {
        let results = collect(DataSource::from(json!([{"a": 1}, 42, {"b": 2}])));
        assert_eq!(3, results.len());
        assert!(results[0].is_ok());
        let err = results[1].as_ref().expect_err("non-object element");
        assert!(err.to_string().contains("index 1"), "got: {err}");
        assert!(results[2].is_ok());
    }

    #[test]
    fn parsed_scalar_root_is_rejected() {
        let err = record_iterator(DataSource::from(json!(42))).expect_err("scalar root");
        assert!(matches!(err, ShredError::Processing(_)));
    }

    #[test]
    fn text_with_single_document_is_parsed_whole() {
        let results = collect(DataSource::from("{\n  \"a\": 1\n}"));
        assert_eq!(1, results.len());
        assert!(results[0].is_ok());
    }

    #[test]
    fn multiline_object_text_is_jsonl() {
        let text = "{\"a\": 1}\n\n{\"a\": 2}\n{\"a\": 3}";
        let results = collect(DataSource::from(text));
        assert_eq!(3, results.len());
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn bad_jsonl_lines_are_item_errors_not_stream_errors() {
        let text = "{\"a\": 1}\nnot json at all\n{\"a\": 3}";
        let results = collect(DataSource::from(text));
        assert_eq!(3, results.len());
        assert!(results[0].is_ok());
        let err = results[1].as_ref().expect_err("bad line");
        assert!(err.to_string().contains("line 2"), "got: {err}");
        assert!(results[2].is_ok());
    }

    #[test]
    fn non_object_jsonl_lines_are_item_errors() {
        let text = "{\"a\": 1}\n[1,2]\n{\"a\": 3}";
        let results = collect(DataSource::from(text));
        let err = results[1].as_ref().expect_err("array line");
        assert!(err.to_string().contains("got array"), "got: {err}");
    }

    #[test]
    fn empty_text_is_rejected() {
        let err = record_iterator(DataSource::from("   \n ")).expect_err("empty");
        assert!(matches!(err, ShredError::Processing(_)));
    }

    #[test]
    fn missing_file_is_a_processing_error() {
        let err = record_iterator(DataSource::Path(PathBuf::from("/no/such/file.json")))
            .expect_err("missing file");
        assert!(matches!(err, ShredError::Processing(_)));
    }

    #[test]
    fn jsonl_files_are_read_line_by_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        fs::write(&path, "{\"a\": 1}\n{\"a\": 2}\n").unwrap();

        let results = collect(DataSource::Path(path));
        assert_eq!(2, results.len());
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn json_files_are_parsed_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "[{\"a\": 1}, {\"a\": 2}]").unwrap();

        let results = collect(DataSource::Path(path));
        assert_eq!(2, results.len());

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ not json").unwrap();
        let err = record_iterator(DataSource::Path(bad)).expect_err("malformed document");
        assert!(matches!(err, ShredError::Parse(_)));
    }
}
