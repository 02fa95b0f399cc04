//! `relink steps` and `relink status`.

use std::collections::BTreeMap;
use std::path::Path;

use relink_engine::MigrationConfig;
use relink_io::MappingStore;

use crate::CliError;

pub fn cmd_steps(config_path: Option<&Path>) -> Result<(), CliError> {
    let config = MigrationConfig::discover(config_path).map_err(CliError::config)?;
    let plan = config.plan().map_err(CliError::config)?;

    for (i, step) in plan.iter().enumerate() {
        let mut line = format!(
            "{:>2}. {:<16} {:<10} {}",
            i + 1,
            step.name,
            step.entity_type,
            step.dump.display()
        );
        if let Some(link) = &step.link {
            line.push_str(&format!(
                "  link {}.{} via {}",
                link.entity_type, link.association, link.foreign_key
            ));
        }
        if !step.depends_on.is_empty() {
            line.push_str(&format!("  after {}", step.depends_on.join(", ")));
        }
        line.push_str(&format!("  on_existing={}", step.on_existing));
        println!("{line}");
    }
    Ok(())
}

pub fn cmd_status(config_path: Option<&Path>, json: bool) -> Result<(), CliError> {
    let config = MigrationConfig::discover(config_path).map_err(CliError::config)?;
    let path = config.mapping_db_path();

    let counts = if path.exists() {
        MappingStore::open(&path)
            .and_then(|store| store.counts())
            .map_err(CliError::mapping)?
    } else {
        BTreeMap::new()
    };

    if json {
        let json = serde_json::to_string_pretty(&counts)
            .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))?;
        println!("{json}");
        return Ok(());
    }

    if counts.is_empty() {
        println!("no mappings yet ({} not found or empty)", path.display());
        return Ok(());
    }
    for (entity_type, n) in &counts {
        println!("{entity_type:<16} {n}");
    }
    Ok(())
}
