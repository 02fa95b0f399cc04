//! Column alias resolution.
//!
//! Legacy exports spell the same logical field several ways (`userId`,
//! `UserId`, `user_id`). Rows are canonicalized once, where they are consumed,
//! so matching and migration code only ever see canonical column names.

use std::collections::BTreeMap;

use relink_io::dump::{SourceRow, Value};
use serde::Serialize;

use crate::error::ReconError;

/// Canonical column names used by the reconciler and the orchestrator.
pub mod columns {
    pub const ID: &str = "id";
    pub const EMAIL: &str = "email";
    pub const FIRST_NAME: &str = "first_name";
    pub const LAST_NAME: &str = "last_name";
    pub const NAME: &str = "name";
    pub const WEBSITE: &str = "website";
    pub const DOMAIN: &str = "domain";
    pub const COMPANY_ID: &str = "company_id";
}

const USER_ALIASES: &[(&str, &str)] = &[
    ("ID", "id"),
    ("Id", "id"),
    ("userId", "id"),
    ("UserId", "id"),
    ("userID", "id"),
    ("UserID", "id"),
    ("user_id", "id"),
    ("Email", "email"),
    ("EMAIL", "email"),
    ("user_email", "email"),
    ("userEmail", "email"),
    ("UserEmail", "email"),
    ("emailAddress", "email"),
    ("EmailAddress", "email"),
    ("firstName", "first_name"),
    ("FirstName", "first_name"),
    ("firstname", "first_name"),
    ("fname", "first_name"),
    ("lastName", "last_name"),
    ("LastName", "last_name"),
    ("lastname", "last_name"),
    ("lname", "last_name"),
    ("companyId", "company_id"),
    ("CompanyId", "company_id"),
    ("companyID", "company_id"),
    ("CompanyID", "company_id"),
    ("organization_id", "company_id"),
    ("organizationId", "company_id"),
    ("OrganizationId", "company_id"),
];

const COMPANY_ALIASES: &[(&str, &str)] = &[
    ("ID", "id"),
    ("Id", "id"),
    ("companyId", "id"),
    ("CompanyId", "id"),
    ("companyID", "id"),
    ("CompanyID", "id"),
    ("company_id", "id"),
    ("Name", "name"),
    ("companyName", "name"),
    ("CompanyName", "name"),
    ("company_name", "name"),
    ("Email", "email"),
    ("EMAIL", "email"),
    ("companyEmail", "email"),
    ("CompanyEmail", "email"),
    ("contact_email", "email"),
    ("contactEmail", "email"),
    ("Website", "website"),
    ("url", "website"),
    ("URL", "website"),
    ("homepage", "website"),
    ("Domain", "domain"),
    ("email_domain", "domain"),
    ("firstName", "first_name"),
    ("FirstName", "first_name"),
    ("contact_first_name", "first_name"),
    ("lastName", "last_name"),
    ("LastName", "last_name"),
    ("contact_last_name", "last_name"),
];

/// A row keyed by canonical column names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRow {
    pub entity_type: String,
    pub line: usize,
    pub tuple: usize,
    pub fields: Vec<(String, Value)>,
}

impl CanonicalRow {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    /// Trimmed, non-empty string form of a column.
    pub fn text(&self, column: &str) -> Option<String> {
        let s = self.get(column)?.as_key()?;
        let s = s.trim();
        if s.is_empty() {
            None
        } else {
            Some(s.to_string())
        }
    }

    /// Foreign-key form of a column: like `text`, but `0` also means unset.
    pub fn reference(&self, column: &str) -> Option<String> {
        self.text(column).filter(|v| v != "0")
    }

    pub fn set(&mut self, column: &str, value: Value) {
        match self.fields.iter_mut().find(|(c, _)| c == column) {
            Some((_, v)) => *v = value,
            None => self.fields.push((column.to_string(), value)),
        }
    }

    /// Human label for reports: full name, else `name`, else e-mail.
    pub fn display_name(&self) -> String {
        let first = self.text(columns::FIRST_NAME);
        let last = self.text(columns::LAST_NAME);
        match (first, last) {
            (Some(f), Some(l)) => format!("{f} {l}"),
            (Some(n), None) | (None, Some(n)) => n,
            (None, None) => self
                .text(columns::NAME)
                .or_else(|| self.text(columns::EMAIL))
                .unwrap_or_default(),
        }
    }
}

/// Per-entity-type `{variant → canonical}` tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    tables: BTreeMap<String, BTreeMap<String, String>>,
}

impl AliasTable {
    /// Built-in aliases for `user` and `company`.
    pub fn builtin() -> Self {
        let mut table = Self::default();
        for (variant, canonical) in USER_ALIASES {
            table.insert("user", variant, canonical);
        }
        for (variant, canonical) in COMPANY_ALIASES {
            table.insert("company", variant, canonical);
        }
        table
    }

    pub fn insert(&mut self, entity_type: &str, variant: &str, canonical: &str) {
        self.tables
            .entry(entity_type.to_string())
            .or_default()
            .insert(variant.to_string(), canonical.to_string());
    }

    /// Merge configured aliases over the current ones, rejecting chains.
    pub fn extend(
        &mut self,
        entity_type: &str,
        aliases: &BTreeMap<String, String>,
    ) -> Result<(), ReconError> {
        for (variant, canonical) in aliases {
            if variant == canonical {
                return Err(ReconError::InvalidAlias {
                    entity_type: entity_type.to_string(),
                    message: format!("'{variant}' maps onto itself"),
                });
            }
            if aliases.contains_key(canonical) {
                return Err(ReconError::InvalidAlias {
                    entity_type: entity_type.to_string(),
                    message: format!("'{variant}' → '{canonical}' targets another alias"),
                });
            }
            self.insert(entity_type, variant, canonical);
        }
        Ok(())
    }

    pub fn resolve<'a>(&'a self, entity_type: &str, column: &'a str) -> &'a str {
        self.tables
            .get(entity_type)
            .and_then(|t| t.get(column))
            .map(String::as_str)
            .unwrap_or(column)
    }

    /// Re-key a parsed row. When several columns land on the same canonical
    /// name, a non-null value beats NULL and the canonical spelling beats a
    /// variant; otherwise the first column wins.
    pub fn canonicalize(&self, row: &SourceRow) -> CanonicalRow {
        let mut fields: Vec<(String, Value)> = Vec::with_capacity(row.fields.len());
        let mut exact: Vec<bool> = Vec::with_capacity(row.fields.len());

        for (column, value) in &row.fields {
            let canonical = self.resolve(&row.entity_type, column);
            let is_exact = canonical == column;

            match fields.iter().position(|(c, _)| c == canonical) {
                None => {
                    fields.push((canonical.to_string(), value.clone()));
                    exact.push(is_exact);
                }
                Some(i) => {
                    let replace = if fields[i].1.is_null() {
                        !value.is_null()
                    } else {
                        is_exact && !exact[i] && !value.is_null()
                    };
                    if replace {
                        fields[i].1 = value.clone();
                        exact[i] = is_exact;
                    }
                }
            }
        }

        CanonicalRow {
            entity_type: row.entity_type.clone(),
            line: row.line,
            tuple: row.tuple,
            fields,
        }
    }
}
