use std::collections::{BTreeMap, BTreeSet};

use crate::alias::{columns, CanonicalRow};
use crate::normalize::{self, FreeDomains};

/// The parts of a target row the strategies look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRecord {
    pub id: String,
    pub email: Option<String>,
    pub domains: Vec<String>,
    pub name: Option<String>,
}

impl TargetRecord {
    /// `None` when the row carries no identifier.
    pub fn from_row(row: &CanonicalRow, free: &FreeDomains) -> Option<Self> {
        let id = row.text(columns::ID)?;
        let email = row.text(columns::EMAIL).and_then(|e| normalize::email(&e));

        let mut domains = Vec::new();
        let candidates = [
            email.as_deref().and_then(normalize::email_domain),
            row.text(columns::WEBSITE).and_then(|w| normalize::url_host(&w)),
            row.text(columns::DOMAIN).and_then(|d| normalize::url_host(&d)),
        ];
        for domain in candidates.into_iter().flatten() {
            if !free.contains(&domain) && !domains.contains(&domain) {
                domains.push(domain);
            }
        }

        let first = row.text(columns::FIRST_NAME);
        let last = row.text(columns::LAST_NAME);
        let name = normalize::full_name(first.as_deref(), last.as_deref())
            .or_else(|| row.text(columns::NAME).and_then(|n| normalize::full_name(Some(n.as_str()), None)));

        Some(Self {
            id,
            email,
            domains,
            name,
        })
    }
}

/// Lookup tables over the target dump of a linked step.
#[derive(Debug, Clone, Default)]
pub struct TargetIndex {
    ids: BTreeSet<String>,
    by_email: BTreeMap<String, String>,
    by_domain: BTreeMap<String, BTreeSet<String>>,
    by_name: BTreeMap<String, BTreeSet<String>>,
    free: FreeDomains,
}

/// Outcome of a domain lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainHit<'a> {
    Unique(&'a str),
    Ambiguous(usize),
    Miss,
}

impl TargetIndex {
    pub fn build<'a, I>(rows: I, free: FreeDomains) -> Self
    where
        I: IntoIterator<Item = &'a CanonicalRow>,
    {
        let mut index = Self {
            free,
            ..Self::default()
        };
        for row in rows {
            if let Some(record) = TargetRecord::from_row(row, &index.free) {
                index.insert(record);
            }
        }
        index
    }

    pub fn insert(&mut self, record: TargetRecord) {
        if let Some(email) = &record.email {
            // first target in file order owns the address
            self.by_email
                .entry(email.clone())
                .or_insert_with(|| record.id.clone());
        }
        for domain in &record.domains {
            self.by_domain
                .entry(domain.clone())
                .or_default()
                .insert(record.id.clone());
        }
        if let Some(name) = &record.name {
            self.by_name
                .entry(name.clone())
                .or_default()
                .insert(record.id.clone());
        }
        self.ids.insert(record.id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn free_domains(&self) -> &FreeDomains {
        &self.free
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn by_email(&self, email: &str) -> Option<&str> {
        self.by_email.get(email).map(String::as_str)
    }

    pub fn by_domain(&self, domain: &str) -> DomainHit<'_> {
        if self.free.contains(domain) {
            return DomainHit::Miss;
        }
        match self.by_domain.get(domain) {
            Some(ids) if ids.len() == 1 => ids
                .iter()
                .next()
                .map_or(DomainHit::Miss, |id| DomainHit::Unique(id.as_str())),
            Some(ids) if ids.len() > 1 => DomainHit::Ambiguous(ids.len()),
            _ => DomainHit::Miss,
        }
    }

    /// Only a name carried by exactly one target counts.
    pub fn by_name(&self, name: &str) -> Option<&str> {
        match self.by_name.get(name) {
            Some(ids) if ids.len() == 1 => ids.iter().next().map(String::as_str),
            _ => None,
        }
    }
}
