//! `chiefops turn`: record a conversation turn.

use chiefops_core::conversation::Role;

use super::{CmdResult, coordinator, load_config};

pub async fn run(project: &str, role: Role, content: &str) -> CmdResult {
    let config = load_config()?;
    let coordinator = coordinator(&config).await?;

    let turn = coordinator.record_turn(project, role, content).await?;
    println!("Recorded turn {} ({}) in {project}", turn.turn_number, turn.role);

    let state = coordinator.compactor().state(project).await?;
    tracing::debug!(project, ?state, "Compaction state after recording");
    Ok(())
}
