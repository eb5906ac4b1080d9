use crate::output::print_json;
use std::path::Path;
use warden_core::config::Config;
use warden_core::store::StateStore;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root)?;
    let store = StateStore::open(root, &config)?;
    let doc = store.load();

    if json {
        #[derive(serde::Serialize)]
        struct ResearchEntry {
            category: String,
            satisfied: bool,
        }

        #[derive(serde::Serialize)]
        struct StatusOutput<'a> {
            breaker: &'a warden_core::state::CircuitBreakerState,
            research: Vec<ResearchEntry>,
            edits: &'a warden_core::state::EditState,
            enforcement: &'a warden_core::state::EnforcementState,
            work_loop: &'a warden_core::state::WorkLoopState,
            safe_mode: bool,
            recent_actions: &'a [warden_core::state::ActionEntry],
        }

        let research = config
            .research
            .category_names()
            .into_iter()
            .map(|name| ResearchEntry {
                satisfied: doc.research.satisfied(&name),
                category: name,
            })
            .collect();

        return print_json(&StatusOutput {
            breaker: &doc.breaker,
            research,
            edits: &doc.edits,
            enforcement: &doc.enforcement,
            work_loop: &doc.work_loop,
            safe_mode: doc.overrides.safe_mode,
            recent_actions: &doc.actions.entries,
        });
    }

    // -- Human-readable output ------------------------------------------------

    if doc.breaker.tripped {
        println!(
            "Circuit breaker: TRIPPED since {}",
            doc.breaker
                .tripped_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string())
        );
        if let Some(last) = &doc.breaker.last_error {
            println!("  last error: {last}");
        }
    } else {
        println!("Circuit breaker: ok ({} recent failures)", doc.breaker.failures);
    }
    if !doc.breaker.error_signatures.is_empty() {
        println!("  signatures:");
        for (signature, count) in &doc.breaker.error_signatures {
            println!("    {signature}: {count}");
        }
    }

    println!("\nResearch:");
    for name in config.research.category_names() {
        let mark = if doc.research.satisfied(&name) { "done" } else { "missing" };
        println!("  {name}: {mark}");
    }

    println!(
        "\nEdits: {} total, {} unique files",
        doc.edits.count,
        doc.edits.unique_files.len()
    );
    if let Some(last) = &doc.edits.last_file {
        println!("  last: {last}");
    }

    if doc.overrides.safe_mode {
        println!("\nSafe mode: ON");
    }
    if doc.enforcement.halted {
        println!("\nEnforcement: HALTED");
    }
    if !doc.enforcement.blocks.is_empty() {
        println!("\nRecent blocks:");
        for block in doc.enforcement.blocks.iter().rev().take(5) {
            println!("  [{}] {} — {}", block.rule, block.tool, block.message);
        }
    }

    if doc.work_loop.active {
        println!(
            "\nWork loop: '{}' iteration {}/{}",
            doc.work_loop.task.as_deref().unwrap_or(""),
            doc.work_loop.iteration,
            doc.work_loop.max_iterations
        );
    }

    Ok(())
}
