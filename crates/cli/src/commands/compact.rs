//! `chiefops compact`: summarize older turns.

use chiefops_core::generation::OfflineGenerator;

use super::{CmdResult, coordinator, load_config};

pub async fn run(project: &str, force: bool) -> CmdResult {
    let config = load_config()?;
    let coordinator = coordinator(&config).await?;
    let compactor = coordinator.compactor();

    // Without a model configured the summary is extractive.
    let summary = if force {
        compactor.compact(project, &OfflineGenerator).await?
    } else {
        compactor.compact_if_due(project, &OfflineGenerator).await?
    };

    match summary {
        Some(summary) => {
            println!(
                "✅ Compacted {project}: turns 1-{} summarized ({} turns)",
                summary.last_compacted_turn, summary.turns_compacted
            );
        }
        None => {
            let state = compactor.state(project).await?;
            println!("Nothing to compact for {project} (state: {state:?})");
        }
    }

    Ok(())
}
