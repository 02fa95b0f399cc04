use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use relink_recon::{AliasTable, FreeDomains};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::step::{MigrationStep, OnExisting, StepLink, DEFAULT_BATCH_SIZE};

pub const DEFAULT_CONFIG_FILE: &str = "relink.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_dump_dir")]
    pub dump_dir: PathBuf,
    #[serde(default = "default_mapping_db")]
    pub mapping_db: PathBuf,
    #[serde(default = "default_target_db")]
    pub target_db: PathBuf,
    #[serde(default = "default_unmatched_report")]
    pub unmatched_report: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Replaces the built-in free-mail list when present.
    #[serde(default)]
    pub free_email_domains: Option<Vec<String>>,
    /// `[aliases.<entity_type>]` tables of `variant = "canonical"`.
    #[serde(default)]
    pub aliases: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default = "default_steps")]
    pub steps: Vec<MigrationStep>,
    /// Directory relative paths resolve against. Set by `load`.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_name() -> String {
    "relink".into()
}

fn default_dump_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_mapping_db() -> PathBuf {
    PathBuf::from("relink.db")
}

fn default_target_db() -> PathBuf {
    PathBuf::from("target.db")
}

fn default_unmatched_report() -> PathBuf {
    PathBuf::from("unmatched_records.csv")
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// companies → users, each user linked to its company. Users are linked
/// while they are created; relinking existing users is an opt-in
/// `on_existing = "refresh"` step.
fn default_steps() -> Vec<MigrationStep> {
    vec![
        MigrationStep {
            name: "companies".into(),
            order_index: 0,
            entity_type: "company".into(),
            dump: PathBuf::from("companies.sql"),
            depends_on: Vec::new(),
            on_existing: OnExisting::Skip,
            link: None,
        },
        MigrationStep {
            name: "users".into(),
            order_index: 1,
            entity_type: "user".into(),
            dump: PathBuf::from("users.sql"),
            depends_on: vec!["companies".into()],
            on_existing: OnExisting::Skip,
            link: Some(StepLink {
                entity_type: "company".into(),
                dump: PathBuf::from("companies.sql"),
                association: "company".into(),
                foreign_key: "company_id".into(),
            }),
        },
    ]
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            dump_dir: default_dump_dir(),
            mapping_db: default_mapping_db(),
            target_db: default_target_db(),
            unmatched_report: default_unmatched_report(),
            batch_size: default_batch_size(),
            free_email_domains: None,
            aliases: BTreeMap::new(),
            steps: default_steps(),
            base_dir: PathBuf::from("."),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl MigrationConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let mut config: MigrationConfig =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        for (i, step) in config.steps.iter_mut().enumerate() {
            step.order_index = i;
        }
        config.base_dir = PathBuf::from(".");
        config.validate()?;
        Ok(config)
    }

    /// Read `path`; relative paths in the file resolve against its directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&input)?;
        config.base_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(config)
    }

    /// `path` when given, else `relink.toml` in the working directory if it
    /// exists, else the built-in plan.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::load(default)
                } else {
                    log::info!("no {DEFAULT_CONFIG_FILE}; using the built-in plan");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps.is_empty() {
            return Err(ConfigError::Validation("at least one step is required".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Validation("batch_size must be at least 1".into()));
        }

        let mut names = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(ConfigError::Validation("step name must not be empty".into()));
            }
            if !names.insert(step.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
            if step.entity_type.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "step '{}': entity_type must not be empty",
                    step.name
                )));
            }
            if step.dump.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "step '{}': dump must not be empty",
                    step.name
                )));
            }
            if let Some(link) = &step.link {
                if link.entity_type.trim().is_empty()
                    || link.association.trim().is_empty()
                    || link.foreign_key.trim().is_empty()
                    || link.dump.as_os_str().is_empty()
                {
                    return Err(ConfigError::Validation(format!(
                        "step '{}': link needs entity_type, dump, association and foreign_key",
                        step.name
                    )));
                }
            }
        }

        for step in &self.steps {
            for dep in &step.depends_on {
                if !names.contains(dep.as_str()) {
                    return Err(ConfigError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        self.plan()?;
        self.alias_table()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Derived views
    // -----------------------------------------------------------------------

    /// Steps in dependency order; ties broken by position in the file.
    pub fn plan(&self) -> Result<Vec<MigrationStep>, ConfigError> {
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&MigrationStep>> = BTreeMap::new();
        for step in &self.steps {
            in_degree.insert(step.name.as_str(), step.depends_on.len());
            for dep in &step.depends_on {
                dependents.entry(dep.as_str()).or_default().push(step);
            }
        }

        let mut ready: BTreeSet<(usize, &str)> = self
            .steps
            .iter()
            .filter(|s| s.depends_on.is_empty())
            .map(|s| (s.order_index, s.name.as_str()))
            .collect();

        let mut order = Vec::with_capacity(self.steps.len());
        while let Some(next) = ready.pop_first() {
            let (_, name) = next;
            if let Some(step) = self.step(name) {
                order.push(step.clone());
            }
            for dependent in dependents.get(name).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(dependent.name.as_str()) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.insert((dependent.order_index, dependent.name.as_str()));
                    }
                }
            }
        }

        if order.len() < self.steps.len() {
            let stuck = self
                .steps
                .iter()
                .filter(|s| !order.iter().any(|o| o.name == s.name))
                .map(|s| s.name.clone())
                .collect();
            return Err(ConfigError::Cycle(stuck));
        }
        Ok(order)
    }

    pub fn step(&self, name: &str) -> Option<&MigrationStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Built-in aliases extended by the `[aliases]` tables.
    pub fn alias_table(&self) -> Result<AliasTable, ConfigError> {
        let mut table = AliasTable::builtin();
        for (entity_type, aliases) in &self.aliases {
            table.extend(entity_type, aliases)?;
        }
        Ok(table)
    }

    pub fn free_domains(&self) -> FreeDomains {
        match &self.free_email_domains {
            Some(list) => FreeDomains::from_list(list),
            None => FreeDomains::default(),
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }

    pub fn dump_path(&self, dump: &Path) -> PathBuf {
        self.resolve(&self.dump_dir).join(dump)
    }

    pub fn mapping_db_path(&self) -> PathBuf {
        self.resolve(&self.mapping_db)
    }

    pub fn target_db_path(&self) -> PathBuf {
        self.resolve(&self.target_db)
    }

    pub fn unmatched_report_path(&self) -> PathBuf {
        self.resolve(&self.unmatched_report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const CRM: &str = r#"
name = "legacy crm"
dump_dir = "dumps"
batch_size = 100
free_email_domains = ["gmail.com", "example.org"]

[aliases.user]
Mail = "email"

[[steps]]
name = "users"
entity_type = "user"
dump = "users.sql"
depends_on = ["companies"]

[steps.link]
entity_type = "company"
dump = "companies.sql"
association = "company"

[[steps]]
name = "companies"
entity_type = "company"
dump = "companies.sql"
"#;

    #[test]
    fn parse_valid() {
        let config = MigrationConfig::from_toml(CRM).unwrap();
        assert_eq!(config.name, "legacy crm");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.steps.len(), 2);
        assert_eq!(config.unmatched_report, PathBuf::from("unmatched_records.csv"));
        let link = config.steps[0].link.as_ref().unwrap();
        assert_eq!(link.foreign_key, "company_id");
        assert_eq!(config.steps[0].on_existing, OnExisting::Skip);
        assert!(config.free_domains().contains("example.org"));
        assert!(!config.free_domains().contains("yahoo.com"));
        assert_eq!(config.alias_table().unwrap().resolve("user", "Mail"), "email");
    }

    #[test]
    fn plan_follows_dependencies() {
        let config = MigrationConfig::from_toml(CRM).unwrap();
        let names: Vec<_> = config.plan().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["companies", "users"]);
    }

    #[test]
    fn default_plan() {
        let config = MigrationConfig::default();
        config.validate().unwrap();
        let names: Vec<_> = config.plan().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["companies", "users"]);
        // one linked step per link, so a rerun reports each row once
        assert!(config.steps.iter().all(|s| s.on_existing == OnExisting::Skip));
        assert_eq!(config.steps.iter().filter(|s| s.link.is_some()).count(), 1);
    }

    #[test]
    fn empty_file_uses_default_steps() {
        let config = MigrationConfig::from_toml("").unwrap();
        assert_eq!(config.steps.len(), 2);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn reject_unknown_dependency() {
        let input = r#"
[[steps]]
name = "users"
entity_type = "user"
dump = "users.sql"
depends_on = ["orgs"]
"#;
        let err = MigrationConfig::from_toml(input).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDependency { .. }));
    }

    #[test]
    fn reject_cycle() {
        let input = r#"
[[steps]]
name = "a"
entity_type = "user"
dump = "a.sql"
depends_on = ["b"]

[[steps]]
name = "b"
entity_type = "company"
dump = "b.sql"
depends_on = ["a"]
"#;
        let err = MigrationConfig::from_toml(input).unwrap_err();
        match err {
            ConfigError::Cycle(steps) => assert_eq!(steps, vec!["a", "b"]),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn reject_duplicate_step_and_zero_batch() {
        let dup = r#"
[[steps]]
name = "a"
entity_type = "user"
dump = "a.sql"

[[steps]]
name = "a"
entity_type = "user"
dump = "b.sql"
"#;
        assert!(matches!(
            MigrationConfig::from_toml(dup),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            MigrationConfig::from_toml("batch_size = 0"),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn reject_bad_on_existing() {
        let input = r#"
[[steps]]
name = "a"
entity_type = "user"
dump = "a.sql"
on_existing = "overwrite"
"#;
        assert!(matches!(
            MigrationConfig::from_toml(input),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relink.toml");
        std::fs::write(&path, CRM).unwrap();
        let config = MigrationConfig::load(&path).unwrap();
        assert_eq!(
            config.dump_path(Path::new("users.sql")),
            dir.path().join("dumps").join("users.sql")
        );
        assert_eq!(config.mapping_db_path(), dir.path().join("relink.db"));
    }
}
