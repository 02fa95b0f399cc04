// Append-only CSV report of rows that could not be reconciled
//
// The file accumulates across runs. Operators prune it and turn lines into
// manual-override entries.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const REPORT_HEADER: [&str; 5] = ["identifier", "name", "partial_foreign_key", "reason", "logged_at"];

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write unmatched report: {0}")]
    Write(#[from] csv::Error),
    #[error("cannot flush unmatched report: {0}")]
    Flush(#[from] std::io::Error),
    #[error("cannot read unmatched report: {0}")]
    Read(csv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedRow {
    pub identifier: String,
    pub name: String,
    pub partial_foreign_key: String,
    pub reason: String,
    pub logged_at: String,
}

impl UnmatchedRow {
    /// Build a row stamped with the current UTC time.
    pub fn now(
        identifier: impl Into<String>,
        name: impl Into<String>,
        partial_foreign_key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            partial_foreign_key: partial_foreign_key.into(),
            reason: reason.into(),
            logged_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Append-only sink. The file is opened lazily on the first append, and the
/// header is written only when that file is new or empty.
pub struct UnmatchedReport {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    appended: usize,
}

impl UnmatchedReport {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            appended: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended through this handle (not the file total).
    pub fn appended(&self) -> usize {
        self.appended
    }

    pub fn append(&mut self, row: &UnmatchedRow) -> Result<(), ReportError> {
        if self.writer.is_none() {
            self.writer = Some(self.open_writer()?);
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.serialize(row)?;
            // Flush per line so a killed run keeps what it reported.
            writer.flush()?;
        }
        self.appended += 1;
        Ok(())
    }

    fn open_writer(&self) -> Result<csv::Writer<File>, ReportError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| ReportError::Open { path: self.path.clone(), source })?;
        let fresh = file
            .metadata()
            .map_err(|source| ReportError::Open { path: self.path.clone(), source })?
            .len()
            == 0;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if fresh {
            writer.write_record(REPORT_HEADER)?;
        }
        Ok(writer)
    }
}

/// Read every row of a report file.
pub fn read_all(path: &Path) -> Result<Vec<UnmatchedRow>, ReportError> {
    let mut reader = csv::Reader::from_path(path).map_err(ReportError::Read)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record.map_err(ReportError::Read)?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn header_written_once_across_handles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unmatched_records.csv");

        let mut first = UnmatchedReport::open(&path);
        first
            .append(&UnmatchedRow::now("7", "Ann Lee", "", "no_match_found"))
            .unwrap();
        drop(first);

        let mut second = UnmatchedReport::open(&path);
        second
            .append(&UnmatchedRow::now("8", "Bo Chen", "99", "target_not_migrated"))
            .unwrap();
        assert_eq!(second.appended(), 1);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.matches("identifier,name,partial_foreign_key,reason,logged_at").count(),
            1
        );

        let rows = read_all(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].identifier, "7");
        assert_eq!(rows[1].partial_foreign_key, "99");
        assert_eq!(rows[1].reason, "target_not_migrated");
    }

    #[test]
    fn no_file_until_first_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unmatched_records.csv");
        let report = UnmatchedReport::open(&path);
        assert_eq!(report.appended(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn names_with_commas_are_quoted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("u.csv");
        let mut report = UnmatchedReport::open(&path);
        report
            .append(&UnmatchedRow::now("1", "Lee, Ann", "", "no_match_found"))
            .unwrap();
        let rows = read_all(&path).unwrap();
        assert_eq!(rows[0].name, "Lee, Ann");
    }
}
