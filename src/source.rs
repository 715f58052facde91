//! Document loading from JSON volume files.
//!
//! A volume file is one JSON object mapping record keys to records; every
//! record carries an author, a date and an already tokenized text under
//! configurable field names. Nothing here tokenizes: a string text is only
//! split on whitespace.

use std::{
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    document::Document,
    error::{AnalysisError, Result},
};

/// Field names of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSelector {
    pub author_field: String,
    pub date_field: String,
    pub text_field: String,
}

impl Default for FieldSelector {
    fn default() -> Self {
        Self {
            author_field: "Author".to_string(),
            date_field: "Year Published".to_string(),
            text_field: "Text".to_string(),
        }
    }
}

impl FieldSelector {
    pub fn with_text_field(mut self, field: impl Into<String>) -> Self {
        self.text_field = field.into();
        self
    }

    /// Builds a document from one record.
    pub fn document(&self, id: String, record: &Value) -> Result<Document> {
        let Some(fields) = record.as_object() else {
            return Err(AnalysisError::malformed(id, "record is not an object"));
        };
        let author = match fields.get(&self.author_field) {
            Some(Value::String(s)) => s.clone(),
            _ => return Err(missing(id, &self.author_field)),
        };
        let year = match fields.get(&self.date_field).and_then(year_of) {
            Some(y) => y,
            None => return Err(missing(id, &self.date_field)),
        };
        let tokens = match fields.get(&self.text_field) {
            Some(Value::Array(items)) => {
                let tokens: Vec<String> = items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                if tokens.len() < items.len() {
                    warn!(
                        doc = %id,
                        dropped = items.len() - tokens.len(),
                        "non-string tokens dropped"
                    );
                }
                tokens
            }
            Some(Value::String(text)) => text.split_whitespace().map(str::to_string).collect(),
            _ => return Err(missing(id, &self.text_field)),
        };
        let doc = Document::new(id, author, year, tokens);
        doc.validate()?;
        Ok(doc)
    }
}

fn missing(id: String, field: &str) -> AnalysisError {
    AnalysisError::malformed(id, format!("missing or invalid field `{field}`"))
}

fn year_of(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(true, |n| n.starts_with('.'))
}

/// Reads one volume file. Records that cannot be turned into documents are
/// skipped with a warning; document ids are `<file name>[<record key>]`.
pub fn load_volume(path: &Path, selector: &FieldSelector) -> Result<Vec<Document>> {
    let raw = fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
    let volume: Map<String, Value> = serde_json::from_str(&raw)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut docs = Vec::with_capacity(volume.len());
    for (key, record) in &volume {
        match selector.document(format!("{name}[{key}]"), record) {
            Ok(doc) => docs.push(doc),
            Err(e) => warn!(error = %e, "skipping record"),
        }
    }
    Ok(docs)
}

/// Reads every visible volume file directly under `dir`, in file name order.
/// Unreadable or unparsable files are skipped with a warning.
pub fn load_dir(dir: impl AsRef<Path>, selector: &FieldSelector) -> Result<Vec<Document>> {
    let dir = dir.as_ref();
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| AnalysisError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && !is_hidden(p))
        .collect();
    files.sort();

    let mut docs = Vec::new();
    for file in &files {
        match load_volume(file, selector) {
            Ok(mut batch) => {
                debug!(file = %file.display(), docs = batch.len(), "volume loaded");
                docs.append(&mut batch);
            }
            Err(e) => warn!(file = %file.display(), error = %e, "skipping volume file"),
        }
    }
    info!(dir = %dir.display(), files = files.len(), docs = docs.len(), "documents loaded");
    Ok(docs)
}

/// One JSON record per line. The id is the record's `id` field, or the
/// 1-based line number when it has none. Blank lines are ignored.
pub fn load_json_lines(path: impl AsRef<Path>, selector: &FieldSelector) -> Result<Vec<Document>> {
    let path = path.as_ref();
    let file = fs::File::open(path).map_err(|e| AnalysisError::io(path, e))?;
    let mut docs = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| AnalysisError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!(line = idx + 1, error = %e, "skipping unparsable line");
                continue;
            }
        };
        let id = match record.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => (idx + 1).to_string(),
        };
        match selector.document(id, &record) {
            Ok(doc) => docs.push(doc),
            Err(e) => warn!(error = %e, "skipping record"),
        }
    }
    Ok(docs)
}
