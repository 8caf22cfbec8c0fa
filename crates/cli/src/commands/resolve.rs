//! `chiefops resolve`: merge per-source person records.

use std::path::Path;

use chiefops_core::person::RawPersonRecord;
use chiefops_people::{EntityResolver, ResolverSettings};

use super::{CmdResult, load_config};

pub async fn run(input: &Path, output: Option<&Path>) -> CmdResult {
    let config = load_config()?;

    let raw = std::fs::read_to_string(input)
        .map_err(|e| format!("Failed to read {}: {e}", input.display()))?;
    let records: Vec<RawPersonRecord> = serde_json::from_str(&raw)
        .map_err(|e| format!("{} is not a JSON array of person records: {e}", input.display()))?;
    let record_count = records.len();

    let resolver = EntityResolver::new(ResolverSettings {
        fuzzy_threshold: config.people.fuzzy_threshold,
    });
    let persons = resolver.resolve(records);
    tracing::info!(records = record_count, persons = persons.len(), "Resolved identities");

    let json = serde_json::to_string_pretty(&persons)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            eprintln!(
                "✅ {record_count} records → {} people, written to {}",
                persons.len(),
                path.display()
            );
        }
        None => println!("{json}"),
    }

    Ok(())
}
