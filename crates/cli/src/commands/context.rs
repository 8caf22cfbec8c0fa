//! `chiefops context`: print the assembled context for a query.

use chiefops_core::generation::OfflineGenerator;

use super::{CmdResult, coordinator, load_config};

pub async fn run(project: &str, query: &str, report: bool) -> CmdResult {
    let config = load_config()?;
    let coordinator = coordinator(&config).await?;

    let assembled = coordinator
        .get_context_with_report(project, query, &OfflineGenerator)
        .await?;

    if assembled.context.is_empty() {
        eprintln!("(no facts, summary, turns or documents for {project})");
    } else {
        println!("{}", assembled.context);
    }

    if report {
        eprintln!();
        eprintln!("  {:<14} {:>7} {:>7} {:>9}  truncated", "layer", "chars", "tokens", "items");
        for layer in &assembled.layers {
            eprintln!(
                "  {:<14} {:>7} {:>7} {:>4}/{:<4}  {}",
                layer.name,
                layer.chars,
                layer.estimated_tokens,
                layer.items_included,
                layer.items_total,
                if layer.truncated { "yes" } else { "no" }
            );
        }
    }

    Ok(())
}
