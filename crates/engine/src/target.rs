// Target system contract + the SQLite store the CLI migrates into

use std::path::Path;

use chrono::Utc;
use relink_io::Value;
use relink_recon::CanonicalRow;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::TargetError;

/// Record fields as written to the target: canonical column → JSON value.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Where migrated records land. Ids are assigned by the store.
pub trait TargetStore {
    fn create(&mut self, entity_type: &str, fields: &Fields) -> Result<i64, TargetError>;
    fn update(&mut self, entity_type: &str, id: i64, fields: &Fields) -> Result<(), TargetError>;
    fn exists(&self, entity_type: &str, id: i64) -> Result<bool, TargetError>;
    /// Point `association` of record `id` at `target_id`, replacing any earlier link.
    fn assign(
        &mut self,
        entity_type: &str,
        id: i64,
        association: &str,
        target_id: i64,
    ) -> Result<(), TargetError>;
}

/// Canonical row → target fields. Non-finite floats become null.
pub fn fields_of(row: &CanonicalRow) -> Fields {
    row.fields
        .iter()
        .map(|(column, value)| {
            let json = match value {
                Value::Null => serde_json::Value::Null,
                Value::Int(n) => serde_json::Value::from(*n),
                Value::Float(f) => serde_json::Number::from_f64(*f)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
                Value::Text(s) => serde_json::Value::String(s.clone()),
            };
            (column.clone(), json)
        })
        .collect()
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    fields TEXT NOT NULL,           -- JSON object
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_entity_type ON records (entity_type);

CREATE TABLE IF NOT EXISTS associations (
    entity_type TEXT NOT NULL,
    record_id INTEGER NOT NULL,
    association TEXT NOT NULL,
    target_id INTEGER NOT NULL,
    PRIMARY KEY (entity_type, record_id, association)
);
"#;

pub struct SqliteTargetStore {
    conn: Connection,
}

impl SqliteTargetStore {
    pub fn open(path: &Path) -> Result<Self, TargetError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, TargetError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, TargetError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn fields(&self, entity_type: &str, id: i64) -> Result<Option<Fields>, TargetError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT fields FROM records WHERE id = ?1 AND entity_type = ?2",
                params![id, entity_type],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    pub fn association(
        &self,
        entity_type: &str,
        id: i64,
        association: &str,
    ) -> Result<Option<i64>, TargetError> {
        let target = self
            .conn
            .query_row(
                "SELECT target_id FROM associations WHERE entity_type = ?1 AND record_id = ?2 AND association = ?3",
                params![entity_type, id, association],
                |row| row.get(0),
            )
            .optional()?;
        Ok(target)
    }

    pub fn count(&self, entity_type: &str) -> Result<usize, TargetError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE entity_type = ?1",
            params![entity_type],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Remove a record and its links. Used to simulate drift in the target.
    pub fn delete(&mut self, entity_type: &str, id: i64) -> Result<bool, TargetError> {
        self.conn.execute(
            "DELETE FROM associations WHERE entity_type = ?1 AND record_id = ?2",
            params![entity_type, id],
        )?;
        let n = self.conn.execute(
            "DELETE FROM records WHERE id = ?1 AND entity_type = ?2",
            params![id, entity_type],
        )?;
        Ok(n > 0)
    }
}

impl TargetStore for SqliteTargetStore {
    fn create(&mut self, entity_type: &str, fields: &Fields) -> Result<i64, TargetError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO records (entity_type, fields, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![entity_type, serde_json::to_string(fields)?, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update(&mut self, entity_type: &str, id: i64, fields: &Fields) -> Result<(), TargetError> {
        let n = self.conn.execute(
            "UPDATE records SET fields = ?1, updated_at = ?2 WHERE id = ?3 AND entity_type = ?4",
            params![serde_json::to_string(fields)?, Utc::now().to_rfc3339(), id, entity_type],
        )?;
        if n == 0 {
            return Err(TargetError::NotFound {
                entity_type: entity_type.to_string(),
                id,
            });
        }
        Ok(())
    }

    fn exists(&self, entity_type: &str, id: i64) -> Result<bool, TargetError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM records WHERE id = ?1 AND entity_type = ?2",
                params![id, entity_type],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn assign(
        &mut self,
        entity_type: &str,
        id: i64,
        association: &str,
        target_id: i64,
    ) -> Result<(), TargetError> {
        if !self.exists(entity_type, id)? {
            return Err(TargetError::NotFound {
                entity_type: entity_type.to_string(),
                id,
            });
        }
        self.conn.execute(
            "INSERT OR REPLACE INTO associations (entity_type, record_id, association, target_id) VALUES (?1, ?2, ?3, ?4)",
            params![entity_type, id, association, target_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn create_update_exists() {
        let mut store = SqliteTargetStore::open_in_memory().unwrap();
        let id = store.create("company", &fields(&[("name", "Acme")])).unwrap();
        assert!(store.exists("company", id).unwrap());
        assert!(!store.exists("user", id).unwrap());

        store.update("company", id, &fields(&[("name", "Acme Corp")])).unwrap();
        let stored = store.fields("company", id).unwrap().unwrap();
        assert_eq!(stored["name"], "Acme Corp");
        assert_eq!(store.count("company").unwrap(), 1);
    }

    #[test]
    fn update_missing_is_not_found() {
        let mut store = SqliteTargetStore::open_in_memory().unwrap();
        let err = store.update("company", 99, &Fields::new()).unwrap_err();
        assert!(matches!(err, TargetError::NotFound { id: 99, .. }));
    }

    #[test]
    fn assign_replaces_link() {
        let mut store = SqliteTargetStore::open_in_memory().unwrap();
        let user = store.create("user", &Fields::new()).unwrap();
        store.assign("user", user, "company", 1).unwrap();
        store.assign("user", user, "company", 2).unwrap();
        assert_eq!(store.association("user", user, "company").unwrap(), Some(2));
        assert!(store.assign("user", 42, "company", 1).is_err());
    }

    #[test]
    fn delete_drops_links() {
        let mut store = SqliteTargetStore::open_in_memory().unwrap();
        let user = store.create("user", &Fields::new()).unwrap();
        store.assign("user", user, "company", 7).unwrap();
        assert!(store.delete("user", user).unwrap());
        assert!(!store.exists("user", user).unwrap());
        assert_eq!(store.association("user", user, "company").unwrap(), None);
    }
}
