// Manual override file: operator-maintained key → target id pairs
//
// Contract: CSV whose first row is the header `key,target_id`. Additional
// columns (operator notes) are allowed and ignored. Keys are normalized
// (trimmed, lowercased) on load and on lookup.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum OverrideError {
    #[error("cannot read {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed override file: {0}")]
    Csv(#[from] csv::Error),
    #[error("override file must start with the header 'key,target_id' (found '{found}')")]
    MissingHeader { found: String },
    #[error("line {line}: empty {field}")]
    EmptyField { line: u64, field: &'static str },
}

pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualOverrides {
    entries: BTreeMap<String, String>,
}

impl ManualOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, OverrideError> {
        let file = std::fs::File::open(path).map_err(|source| OverrideError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let overrides = Self::from_reader(file)?;
        log::info!("loaded {} manual override(s) from {}", overrides.len(), path.display());
        Ok(overrides)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, OverrideError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let header_ok = headers.len() >= 2
            && headers[0].eq_ignore_ascii_case("key")
            && headers[1].eq_ignore_ascii_case("target_id");
        if !header_ok {
            return Err(OverrideError::MissingHeader {
                found: headers.iter().collect::<Vec<_>>().join(","),
            });
        }

        let mut overrides = Self::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let key = record.get(0).unwrap_or("");
            let target_id = record.get(1).unwrap_or("");
            if key.is_empty() {
                return Err(OverrideError::EmptyField { line, field: "key" });
            }
            if target_id.is_empty() {
                return Err(OverrideError::EmptyField { line, field: "target_id" });
            }
            if let Some(previous) = overrides.insert(key, target_id) {
                log::warn!("line {line}: override for '{key}' replaces earlier target {previous}");
            }
        }

        Ok(overrides)
    }

    /// Insert or replace; returns the previous target id for the key.
    pub fn insert(&mut self, key: &str, target_id: &str) -> Option<String> {
        self.entries.insert(normalize_key(key), target_id.trim().to_string())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&normalize_key(key)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
