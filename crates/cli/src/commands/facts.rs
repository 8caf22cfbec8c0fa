//! `chiefops facts`: manage hard facts.

use chiefops_core::fact::{FactCategory, NewFact};

use super::{CmdResult, coordinator, load_config};

pub async fn add(
    content: &str,
    category: &str,
    project: Option<String>,
    source: &str,
    confidence: f32,
) -> CmdResult {
    let config = load_config()?;
    let coordinator = coordinator(&config).await?;

    let mut new = NewFact::new(content, FactCategory::parse_lossy(category))
        .with_source(source)
        .with_confidence(confidence);
    new.project_id = project;

    let fact = coordinator.facts().store_fact(new).await?;
    println!("✅ Stored {} [{}]", fact.fact_id, fact.category);
    Ok(())
}

pub async fn list(project: Option<&str>, json: bool) -> CmdResult {
    let config = load_config()?;
    let coordinator = coordinator(&config).await?;

    let facts = coordinator.facts().get_active_facts(project).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&facts)?);
        return Ok(());
    }

    if facts.is_empty() {
        println!("   No active facts.");
        return Ok(());
    }

    for fact in &facts {
        let scope = fact.project_id.as_deref().unwrap_or("global");
        println!(
            "  {}  [{}] {} ({scope}, {:.2})",
            fact.fact_id, fact.category, fact.content, fact.confidence
        );
    }
    Ok(())
}

pub async fn supersede(
    old_fact_id: &str,
    content: &str,
    category: &str,
    project: Option<String>,
) -> CmdResult {
    let config = load_config()?;
    let coordinator = coordinator(&config).await?;

    let mut new = NewFact::new(content, FactCategory::parse_lossy(category)).with_source("manual");
    new.project_id = project;

    let result = coordinator.facts().supersede_fact(old_fact_id, new).await?;
    match result.previous {
        Some(previous) => println!(
            "✅ {} replaces {} (\"{}\")",
            result.fact.fact_id, previous.fact_id, previous.content
        ),
        None => println!(
            "⚠️  {old_fact_id} not found; stored {} as a new fact",
            result.fact.fact_id
        ),
    }
    Ok(())
}
