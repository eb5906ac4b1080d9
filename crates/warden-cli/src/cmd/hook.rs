use serde::Serialize;
use std::io::Read;
use std::path::Path;
use warden_core::config::Config;
use warden_core::coordinator::{Coordinator, EvalContext};
use warden_core::detectors::default_detectors;
use warden_core::event::{EventContext, HookEvent};
use warden_core::prompt::{self, PromptCommand};
use warden_core::state::{Section, StateDocument};
use warden_core::store::StateStore;
use warden_core::tracker;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run one hook invocation. The return value is the process exit code: 2
/// blocks the in-flight operation, 0 allows it. Nothing in here is allowed
/// to escape as an error or panic — any internal defect degrades to 0
/// (fail-open) so the enforcement layer can never stall the caller's work.
pub fn run(root: &Path, event_name: &str) -> i32 {
    let Some(event) = HookEvent::from_arg(event_name) else {
        tracing::warn!(event = event_name, "unknown hook event; allowing");
        return 0;
    };

    let mut stdin = String::new();
    if std::io::stdin().read_to_string(&mut stdin).is_err() {
        return 0;
    }

    dispatch(root, event, &stdin)
}

/// Testable core: everything after argument and stdin handling.
pub fn dispatch(root: &Path, event: HookEvent, stdin: &str) -> i32 {
    let config = match Config::load(root) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(err = %e, "config unreadable; using defaults");
            Config::default()
        }
    };
    let store = match StateStore::open(root, &config) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(err = %e, "state store unavailable; allowing");
            return 0;
        }
    };

    let ctx = EventContext::parse(event, stdin);

    match event {
        HookEvent::SessionStart => session_start(&store, &config),
        HookEvent::UserPromptSubmit => prompt_submit(&store, &config, ctx),
        HookEvent::PreToolUse => pre_tool_use(root, &store, &config, ctx),
        HookEvent::PostToolUse => post_tool_use(&store, &config, ctx),
        HookEvent::Stop => stop(&store),
    }
}

// ---------------------------------------------------------------------------
// Structured stdout envelope
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HookSpecificOutput {
    hook_event_name: &'static str,
    additional_context: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HookEnvelope {
    hook_specific_output: HookSpecificOutput,
}

fn emit_context(event: HookEvent, context: String) {
    let envelope = HookEnvelope {
        hook_specific_output: HookSpecificOutput {
            hook_event_name: event.as_str(),
            additional_context: context,
        },
    };
    if let Ok(json) = serde_json::to_string(&envelope) {
        println!("{json}");
    }
}

// ---------------------------------------------------------------------------
// Per-event handlers
// ---------------------------------------------------------------------------

/// Session start: clear transient sections, keep the circuit breaker (a new
/// session must not be an escape from a tripped breaker), and hand the
/// assistant a status line as additional context.
fn session_start(store: &StateStore, config: &Config) -> i32 {
    let previous = store.load();
    let mut context = String::new();
    if previous.work_loop.active {
        if let Some(task) = &previous.work_loop.task {
            context.push_str(&format!(
                "Previous work loop '{task}' was still active and has been archived.\n"
            ));
        }
    }

    match store.reset_except(&[Section::Breaker]) {
        Ok(doc) => {
            context.push_str(&status_summary(&doc, config));
            emit_context(HookEvent::SessionStart, context);
        }
        Err(e) => tracing::warn!(err = %e, "session-start reset failed"),
    }
    0
}

fn prompt_submit(store: &StateStore, config: &Config, ctx: Option<EventContext>) -> i32 {
    let Some(ctx) = ctx else { return 0 };
    let Some(text) = ctx.prompt.as_deref() else {
        return 0;
    };
    let Some(command) = prompt::parse(text) else {
        return 0;
    };

    let context = match command {
        PromptCommand::SafeMode(explicit) => {
            let result = store.update(|doc| {
                doc.overrides.safe_mode = explicit.unwrap_or(!doc.overrides.safe_mode);
            });
            match result {
                Ok(doc) if doc.overrides.safe_mode => {
                    "Safe mode enabled: research and size gates are relaxed. \
                     Path safety and the circuit breaker still apply."
                        .to_string()
                }
                Ok(_) => "Safe mode disabled: all gates active.".to_string(),
                Err(e) => {
                    tracing::warn!(err = %e, "safemode toggle failed");
                    return 0;
                }
            }
        }
        PromptCommand::ResetBreaker => match store.reset(Section::Breaker) {
            Ok(_) => "Circuit breaker reset.".to_string(),
            Err(e) => {
                tracing::warn!(err = %e, "breaker reset failed");
                return 0;
            }
        },
        PromptCommand::Status => status_summary(&store.load(), config),
        PromptCommand::LoopStart(task) => {
            let max = config.work_loop.max_iterations;
            match store.update(|doc| doc.work_loop.start(&task, max)) {
                Ok(_) => format!("Work loop started: '{task}' (max {max} iterations)."),
                Err(e) => {
                    tracing::warn!(err = %e, "work loop start failed");
                    return 0;
                }
            }
        }
        PromptCommand::LoopStop => match store.update(|doc| doc.work_loop.stop()) {
            Ok(_) => "Work loop stopped.".to_string(),
            Err(e) => {
                tracing::warn!(err = %e, "work loop stop failed");
                return 0;
            }
        },
    };

    emit_context(HookEvent::UserPromptSubmit, context);
    0
}

/// Pre-tool gate: run the detectors over a state snapshot, surface warnings,
/// and lower the decision to the exit-code contract. Every block is recorded
/// in the enforcement log (which is where the halt latch lives).
fn pre_tool_use(
    root: &Path,
    store: &StateStore,
    config: &Config,
    ctx: Option<EventContext>,
) -> i32 {
    let Some(ctx) = ctx else { return 0 };

    let snapshot = store.load();
    let eval = EvalContext {
        event: &ctx,
        state: &snapshot,
        config,
        root,
    };
    let outcome = Coordinator::new(default_detectors()).run(HookEvent::PreToolUse, &eval);

    for warning in &outcome.warnings {
        eprintln!("warden: warning: {warning}");
    }

    if let Some((rule, message)) = &outcome.block {
        let tool = ctx.tool_name.clone().unwrap_or_default();
        let result = store.update(|doc| {
            doc.enforcement.record_block(
                rule,
                message,
                &tool,
                config.logs.block_cap,
                config.logs.halt_run,
            );
        });
        if let Err(e) = result {
            tracing::warn!(err = %e, "failed to record block");
        }
        eprintln!("warden: blocked: {message}");
    }

    outcome.exit_code()
}

fn post_tool_use(store: &StateStore, config: &Config, ctx: Option<EventContext>) -> i32 {
    let Some(ctx) = ctx else { return 0 };
    if let Err(e) = tracker::track_post_event(store, config, &ctx) {
        tracing::warn!(err = %e, "post-event tracking failed");
    }
    0
}

fn stop(store: &StateStore) -> i32 {
    let result = store.update(|doc| {
        if doc.work_loop.active {
            doc.work_loop.tick();
        }
    });
    if let Err(e) = result {
        tracing::warn!(err = %e, "stop bookkeeping failed");
    }
    0
}

// ---------------------------------------------------------------------------
// Status summary
// ---------------------------------------------------------------------------

pub fn status_summary(doc: &StateDocument, config: &Config) -> String {
    let mut lines = Vec::new();

    if doc.breaker.tripped {
        lines.push(format!(
            "Circuit breaker: TRIPPED (last error: {}). Run 'warden breaker reset'.",
            doc.breaker.last_error.as_deref().unwrap_or("unknown")
        ));
    } else {
        lines.push(format!(
            "Circuit breaker: ok ({} recent failures)",
            doc.breaker.failures
        ));
    }

    let required = config.research.category_names();
    let missing = doc.research.missing(&required);
    if missing.is_empty() {
        lines.push("Research: complete".to_string());
    } else {
        lines.push(format!("Research: missing {}", missing.join(", ")));
    }

    lines.push(format!(
        "Edits: {} ({} unique files)",
        doc.edits.count,
        doc.edits.unique_files.len()
    ));

    if doc.overrides.safe_mode {
        lines.push("Safe mode: ON".to_string());
    }
    if doc.enforcement.halted {
        lines.push("Enforcement: HALTED (repeated identical blocks)".to_string());
    }
    if doc.work_loop.active {
        lines.push(format!(
            "Work loop: '{}' iteration {}/{}",
            doc.work_loop.task.as_deref().unwrap_or(""),
            doc.work_loop.iteration,
            doc.work_loop.max_iterations
        ));
    }

    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
