use crate::config::Config;
use crate::error::Result;
use crate::event::{EventContext, ToolClass};
use crate::failure::{classify_error, classify_response, ToolStatus};
use crate::state::{ActionEntry, StateDocument};
use crate::store::StateStore;
use chrono::Utc;

/// Post-event accounting. Runs after every tool execution regardless of the
/// pre-event decision — the gate only controlled whether the caller
/// proceeded, not whether the event gets counted.
pub fn track_post_event(
    store: &StateStore,
    config: &Config,
    ctx: &EventContext,
) -> Result<StateDocument> {
    store.update(|doc| apply(doc, config, ctx))
}

/// The pure mutation, applied under the store lock. Idempotent with respect
/// to a single event.
pub fn apply(doc: &mut StateDocument, config: &Config, ctx: &EventContext) {
    let tool = ctx.tool_name.clone().unwrap_or_default();
    let status = classify_response(&ctx.tool_response);

    let error_signature = match &status {
        ToolStatus::Failure(text) => {
            let signature = classify_error(text);
            doc.breaker
                .record_failure(signature, text, config.breaker.threshold);
            Some(signature.to_string())
        }
        ToolStatus::Success => {
            doc.breaker.record_success();
            match ctx.tool_class() {
                ToolClass::Edit => {
                    if let Some(path) = ctx.file_path() {
                        doc.edits.record_edit(path);
                    }
                }
                ToolClass::Task => mark_research(doc, config, ctx),
                _ => {}
            }
            None
        }
    };

    doc.actions.push(
        ActionEntry {
            tool,
            at: Utc::now(),
            success: matches!(status, ToolStatus::Success),
            error_signature,
        },
        config.logs.action_cap,
    );
}

/// Mark research categories satisfied by a completed delegated task. Only
/// Task completions reach here, so `via_task` holds by construction — direct
/// search or fetch calls never mark a category.
fn mark_research(doc: &mut StateDocument, config: &Config, ctx: &EventContext) {
    let haystack = task_text(ctx).to_lowercase();
    if haystack.is_empty() {
        return;
    }
    for category in &config.research.categories {
        let hit = category
            .matchers
            .iter()
            .any(|m| haystack.contains(&m.to_lowercase()))
            || haystack.contains(&category.name.to_lowercase());
        if hit {
            doc.research.mark_complete(&category.name);
        }
    }
}

fn task_text(ctx: &EventContext) -> String {
    let mut parts = Vec::new();
    for key in ["description", "prompt", "subagent_type"] {
        if let Some(text) = ctx.tool_input.get(key).and_then(|v| v.as_str()) {
            parts.push(text);
        }
    }
    parts.join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
