// Legacy id → new id mapping store, backed by SQLite

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS id_mappings (
    old_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    new_id INTEGER NOT NULL,
    migrated_at TEXT NOT NULL,      -- RFC 3339, UTC
    notes TEXT NOT NULL DEFAULT '',
    UNIQUE (old_id, entity_type)
);

CREATE INDEX IF NOT EXISTS idx_id_mappings_new_id ON id_mappings (new_id, entity_type);
"#;

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("mapping database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(
        "{entity_type} '{old_id}' is already mapped to {existing}, refusing to remap to {attempted}"
    )]
    Conflict {
        old_id: String,
        entity_type: String,
        existing: i64,
        attempted: i64,
    },
    #[error("corrupt migrated_at timestamp '{0}'")]
    Timestamp(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingEntry {
    pub old_id: String,
    pub entity_type: String,
    pub new_id: i64,
    pub migrated_at: DateTime<Utc>,
    pub notes: String,
}

/// Result of a `set` call. Both variants are success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Inserted,
    /// Same (old_id, entity_type) → new_id already recorded.
    Unchanged,
}

/// Durable (old_id, entity_type) → new_id store.
///
/// A key is assigned exactly once. Setting the same value again is a no-op;
/// setting a different value is a `Conflict`. Dry-run is the caller's
/// business: this type always writes.
pub struct MappingStore {
    conn: Connection,
}

impl MappingStore {
    pub fn open(path: &Path) -> Result<Self, MappingError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, MappingError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, MappingError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn get(&self, old_id: &str, entity_type: &str) -> Result<Option<i64>, MappingError> {
        let new_id = self
            .conn
            .query_row(
                "SELECT new_id FROM id_mappings WHERE old_id = ?1 AND entity_type = ?2",
                params![old_id, entity_type],
                |row| row.get(0),
            )
            .optional()?;
        Ok(new_id)
    }

    pub fn set(&self, old_id: &str, entity_type: &str, new_id: i64) -> Result<SetOutcome, MappingError> {
        self.set_with_notes(old_id, entity_type, new_id, "")
    }

    pub fn set_with_notes(
        &self,
        old_id: &str,
        entity_type: &str,
        new_id: i64,
        notes: &str,
    ) -> Result<SetOutcome, MappingError> {
        match self.get(old_id, entity_type)? {
            Some(existing) if existing == new_id => Ok(SetOutcome::Unchanged),
            Some(existing) => Err(MappingError::Conflict {
                old_id: old_id.to_string(),
                entity_type: entity_type.to_string(),
                existing,
                attempted: new_id,
            }),
            None => {
                self.conn.execute(
                    "INSERT INTO id_mappings (old_id, entity_type, new_id, migrated_at, notes) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![old_id, entity_type, new_id, Utc::now().to_rfc3339(), notes],
                )?;
                Ok(SetOutcome::Inserted)
            }
        }
    }

    pub fn entry(&self, old_id: &str, entity_type: &str) -> Result<Option<MappingEntry>, MappingError> {
        let raw = self
            .conn
            .query_row(
                "SELECT old_id, entity_type, new_id, migrated_at, notes FROM id_mappings WHERE old_id = ?1 AND entity_type = ?2",
                params![old_id, entity_type],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((old_id, entity_type, new_id, migrated_at, notes)) = raw else {
            return Ok(None);
        };
        let migrated_at = DateTime::parse_from_rfc3339(&migrated_at)
            .map_err(|_| MappingError::Timestamp(migrated_at.clone()))?
            .with_timezone(&Utc);

        Ok(Some(MappingEntry { old_id, entity_type, new_id, migrated_at, notes }))
    }

    /// Reverse lookup: which legacy id produced `new_id`.
    pub fn reverse(&self, new_id: i64, entity_type: &str) -> Result<Option<String>, MappingError> {
        let old_id = self
            .conn
            .query_row(
                "SELECT old_id FROM id_mappings WHERE new_id = ?1 AND entity_type = ?2",
                params![new_id, entity_type],
                |row| row.get(0),
            )
            .optional()?;
        Ok(old_id)
    }

    pub fn count(&self, entity_type: &str) -> Result<usize, MappingError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM id_mappings WHERE entity_type = ?1",
            params![entity_type],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Mapping counts per entity type, sorted by entity type.
    pub fn counts(&self) -> Result<BTreeMap<String, usize>, MappingError> {
        let mut stmt = self
            .conn
            .prepare("SELECT entity_type, COUNT(*) FROM id_mappings GROUP BY entity_type")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (entity_type, n) = row?;
            counts.insert(entity_type, n as usize);
        }
        Ok(counts)
    }
}
