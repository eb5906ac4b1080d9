use crate::coordinator::{Decision, Detector, EvalContext};
use crate::event::{HookEvent, ToolClass};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

const PRE_TOOL: &[HookEvent] = &[HookEvent::PreToolUse];

// ---------------------------------------------------------------------------
// Default detector list (priority-ordered)
// ---------------------------------------------------------------------------

/// The registered detectors, ascending priority. The first Block wins;
/// safety and latched stops run ahead of the checklist gates so their
/// messages take precedence.
pub fn default_detectors() -> Vec<Detector> {
    vec![
        Detector {
            id: "path_safety",
            events: PRE_TOOL,
            eval: path_safety,
        },
        Detector {
            id: "enforcement_halt",
            events: PRE_TOOL,
            eval: enforcement_halt,
        },
        Detector {
            id: "circuit_breaker",
            events: PRE_TOOL,
            eval: circuit_breaker,
        },
        Detector {
            id: "research_gate",
            events: PRE_TOOL,
            eval: research_gate,
        },
        Detector {
            id: "size_limit",
            events: PRE_TOOL,
            eval: size_limit,
        },
        Detector {
            id: "shortcut_bypass",
            events: PRE_TOOL,
            eval: shortcut_bypass,
        },
    ]
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"))
}

fn expand_user(raw: &str) -> PathBuf {
    if raw == "~" {
        return home_dir();
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        return home_dir().join(rest);
    }
    PathBuf::from(raw)
}

/// Absolute, lexically normalized form of a tool-supplied path. `..`
/// components are resolved without touching the filesystem, so traversal
/// into a denied prefix can't hide behind relative segments.
fn normalize(raw: &str, root: &Path) -> PathBuf {
    let expanded = expand_user(raw);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        root.join(expanded)
    };
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// path_safety
// ---------------------------------------------------------------------------

/// Deny-list gate over filesystem prefixes, with a soft warning for paths
/// outside the project root.
fn path_safety(ctx: &EvalContext) -> Decision {
    let Some(raw) = ctx.event.file_path() else {
        return Decision::Allow;
    };
    let target = normalize(raw, ctx.root);

    for prefix in &ctx.config.safety.denied_prefixes {
        let denied = normalize(prefix, ctx.root);
        if target.starts_with(&denied) {
            return Decision::block(
                "path_safety",
                format!(
                    "access to {} is denied ({} is a protected location)",
                    target.display(),
                    denied.display()
                ),
            );
        }
    }

    let root = normalize(&ctx.root.to_string_lossy(), ctx.root);
    if !target.starts_with(&root) {
        return Decision::Warn(format!(
            "{} is outside the project root",
            target.display()
        ));
    }
    Decision::Allow
}

// ---------------------------------------------------------------------------
// enforcement_halt
// ---------------------------------------------------------------------------

/// Kill switch: once the same rule has blocked repeatedly, stop edit and
/// shell operations until the operator intervenes.
fn enforcement_halt(ctx: &EvalContext) -> Decision {
    if !matches!(ctx.event.tool_class(), ToolClass::Edit | ToolClass::Shell) {
        return Decision::Allow;
    }
    if !ctx.state.enforcement.halted {
        return Decision::Allow;
    }
    let rule = ctx
        .state
        .enforcement
        .blocks
        .last()
        .map(|b| b.rule.as_str())
        .unwrap_or("unknown");
    Decision::block(
        "enforcement_halt",
        format!(
            "enforcement halted: '{rule}' blocked {} consecutive operations. \
             Address the underlying issue, then start a new session or run \
             'warden breaker reset --all'.",
            ctx.config.logs.halt_run
        ),
    )
}

// ---------------------------------------------------------------------------
// circuit_breaker
// ---------------------------------------------------------------------------

/// Enforces the consequence of a previously tripped breaker. Tripping itself
/// happens post-event in the tracker.
fn circuit_breaker(ctx: &EvalContext) -> Decision {
    if !matches!(ctx.event.tool_class(), ToolClass::Edit | ToolClass::Shell) {
        return Decision::Allow;
    }
    if !ctx.state.breaker.tripped {
        return Decision::Allow;
    }
    let last = ctx
        .state
        .breaker
        .last_error
        .as_deref()
        .unwrap_or("unknown error");
    Decision::block(
        "circuit_breaker",
        format!(
            "circuit breaker is tripped after repeated failures (last: {last}). \
             Fix the root cause, then run 'warden breaker reset'."
        ),
    )
}

// ---------------------------------------------------------------------------
// research_gate
// ---------------------------------------------------------------------------

/// Edits require every configured research category to be satisfied first,
/// and only delegated task work counts.
fn research_gate(ctx: &EvalContext) -> Decision {
    if ctx.event.tool_class() != ToolClass::Edit {
        return Decision::Allow;
    }
    if ctx.state.overrides.safe_mode {
        return Decision::Allow;
    }
    let required = ctx.config.research.category_names();
    let missing = ctx.state.research.missing(&required);
    if missing.is_empty() {
        return Decision::Allow;
    }
    Decision::block(
        "research_gate",
        format!(
            "research incomplete before editing: missing {}. \
             Delegate each category through a Task subagent — direct lookups don't count.",
            missing.join(", ")
        ),
    )
}

// ---------------------------------------------------------------------------
// size_limit
// ---------------------------------------------------------------------------

/// Projected file size after the edit, against soft/hard thresholds.
/// Applies only to structured edits of files that already exist.
fn size_limit(ctx: &EvalContext) -> Decision {
    if ctx.event.tool_class() != ToolClass::Edit {
        return Decision::Allow;
    }
    if ctx.state.overrides.safe_mode {
        return Decision::Allow;
    }
    let Some(raw) = ctx.event.file_path() else {
        return Decision::Allow;
    };
    let target = normalize(raw, ctx.root);
    let Ok(current) = std::fs::read_to_string(&target) else {
        // New or unreadable file: nothing to project against.
        return Decision::Allow;
    };
    let current_lines = current.lines().count();

    let Some(projected) = projected_lines(ctx, &current, current_lines) else {
        return Decision::Allow;
    };

    let (warn, block) = ctx.config.size.thresholds_for(&target);
    if projected >= block {
        return Decision::block(
            "size_limit",
            format!(
                "{} would grow to {projected} lines (limit {block}). \
                 Split the file before continuing.",
                target.display()
            ),
        );
    }
    if projected > warn {
        return Decision::Warn(format!(
            "{} is getting large: {projected} lines projected (soft limit {warn})",
            target.display()
        ));
    }
    Decision::Allow
}

/// Projected post-edit line count, from the edit payload shape.
fn projected_lines(ctx: &EvalContext, current: &str, current_lines: usize) -> Option<usize> {
    let input = &ctx.event.tool_input;
    match ctx.event.tool_name.as_deref() {
        Some("Write") => {
            let content = input.get("content").and_then(|v| v.as_str())?;
            Some(content.lines().count())
        }
        Some("Edit") => {
            let old = input.get("old_string").and_then(|v| v.as_str())?;
            let new = input.get("new_string").and_then(|v| v.as_str())?;
            let occurrences = if input
                .get("replace_all")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
            {
                current.matches(old).count().max(1)
            } else {
                1
            };
            Some(apply_delta(
                current_lines,
                old.lines().count() * occurrences,
                new.lines().count() * occurrences,
            ))
        }
        Some("MultiEdit") => {
            let edits = input.get("edits").and_then(|v| v.as_array())?;
            let mut lines = current_lines;
            for edit in edits {
                let old = edit.get("old_string").and_then(|v| v.as_str())?;
                let new = edit.get("new_string").and_then(|v| v.as_str())?;
                lines = apply_delta(lines, old.lines().count(), new.lines().count());
            }
            Some(lines)
        }
        _ => None,
    }
}

fn apply_delta(lines: usize, removed: usize, added: usize) -> usize {
    lines.saturating_sub(removed) + added
}

// ---------------------------------------------------------------------------
// shortcut_bypass
// ---------------------------------------------------------------------------

static WRITE_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn write_patterns() -> &'static [Regex] {
    WRITE_PATTERNS.get_or_init(|| {
        [
            // Redirection into a file (not fd duplication like 2>&1).
            r">{1,2}\s*[^&\s>]",
            r"\btee\b",
            r"\bsed\b[^;|&]*\s-i\b",
            r"\bdd\b[^;|&]*\bof=",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

/// Heuristic for routing around the structured-edit gates with raw shell
/// writes. Only fires while a genuinely blocking condition is active
/// elsewhere in state — it is not a blanket ban on shell redirection.
fn shortcut_bypass(ctx: &EvalContext) -> Decision {
    if ctx.event.tool_class() != ToolClass::Shell {
        return Decision::Allow;
    }
    if ctx.state.overrides.safe_mode {
        return Decision::Allow;
    }
    let Some(command) = ctx.event.command() else {
        return Decision::Allow;
    };

    let active_condition = if ctx.state.breaker.tripped {
        Some("the circuit breaker is tripped")
    } else if ctx.state.enforcement.halted {
        Some("enforcement is halted")
    } else if !ctx
        .state
        .research
        .missing(&ctx.config.research.category_names())
        .is_empty()
    {
        Some("the research gate is unsatisfied")
    } else {
        None
    };
    let Some(condition) = active_condition else {
        return Decision::Allow;
    };

    if write_patterns().iter().any(|re| re.is_match(command)) {
        return Decision::block(
            "shortcut_bypass",
            format!(
                "shell write detected while {condition}; use the structured edit \
                 tools once the gate is satisfied instead of routing around it"
            ),
        );
    }
    Decision::Allow
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::coordinator::Coordinator;
    use crate::event::EventContext;
    use crate::state::StateDocument;
    use tempfile::TempDir;

    fn pre_tool(json: &str) -> EventContext {
        EventContext::parse(HookEvent::PreToolUse, json).unwrap()
    }

    fn run(event: &EventContext, state: &StateDocument, root: &Path) -> crate::coordinator::Outcome {
        let config = Config::default();
        let ctx = EvalContext {
            event,
            state,
            config: &config,
            root,
        };
        Coordinator::new(default_detectors()).run(HookEvent::PreToolUse, &ctx)
    }

    fn satisfied_research(state: &mut StateDocument) {
        for name in ["docs", "web", "github", "local"] {
            state.research.mark_complete(name);
        }
    }

    // -- path_safety --------------------------------------------------------

    #[test]
    fn denied_prefix_blocks() {
        let dir = TempDir::new().unwrap();
        let event = pre_tool(r#"{"tool_name":"Read","tool_input":{"file_path":"/etc/passwd"}}"#);
        let outcome = run(&event, &StateDocument::default(), dir.path());
        assert_eq!(outcome.block.as_ref().unwrap().0, "path_safety");
    }

    #[test]
    fn traversal_into_denied_prefix_blocks() {
        let dir = TempDir::new().unwrap();
        let json = format!(
            r#"{{"tool_name":"Read","tool_input":{{"file_path":"{}/src/../../../../../../etc/shadow"}}}}"#,
            dir.path().display()
        );
        let event = pre_tool(&json);
        let outcome = run(&event, &StateDocument::default(), dir.path());
        assert_eq!(outcome.block.as_ref().unwrap().0, "path_safety");
    }

    #[test]
    fn outside_root_warns_but_allows() {
        let dir = TempDir::new().unwrap();
        let event = pre_tool(r#"{"tool_name":"Read","tool_input":{"file_path":"/tmp/elsewhere.txt"}}"#);
        let outcome = run(&event, &StateDocument::default(), dir.path());
        assert!(outcome.block.is_none());
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("outside the project root"));
    }

    #[test]
    fn project_file_passes_clean() {
        let dir = TempDir::new().unwrap();
        let json = format!(
            r#"{{"tool_name":"Read","tool_input":{{"file_path":"{}/src/main.rs"}}}}"#,
            dir.path().display()
        );
        let event = pre_tool(&json);
        let outcome = run(&event, &StateDocument::default(), dir.path());
        assert!(outcome.block.is_none());
        assert!(outcome.warnings.is_empty());
    }

    // -- circuit_breaker ----------------------------------------------------

    #[test]
    fn tripped_breaker_blocks_edits() {
        let dir = TempDir::new().unwrap();
        let mut state = StateDocument::default();
        satisfied_research(&mut state);
        for _ in 0..3 {
            state.breaker.record_failure("UNKNOWN", "boom", 3);
        }

        let json = format!(
            r#"{{"tool_name":"Edit","tool_input":{{"file_path":"{}/src/a.rs","old_string":"x","new_string":"y"}}}}"#,
            dir.path().display()
        );
        let outcome = run(&pre_tool(&json), &state, dir.path());
        assert_eq!(outcome.block.as_ref().unwrap().0, "circuit_breaker");
    }

    #[test]
    fn breaker_does_not_gate_reads() {
        let dir = TempDir::new().unwrap();
        let mut state = StateDocument::default();
        for _ in 0..3 {
            state.breaker.record_failure("UNKNOWN", "boom", 3);
        }
        let json = format!(
            r#"{{"tool_name":"Read","tool_input":{{"file_path":"{}/src/a.rs"}}}}"#,
            dir.path().display()
        );
        let outcome = run(&pre_tool(&json), &state, dir.path());
        assert!(outcome.block.is_none());
    }

    // -- research_gate ------------------------------------------------------

    #[test]
    fn unresearched_edit_blocks_listing_all_missing() {
        let dir = TempDir::new().unwrap();
        let json = format!(
            r#"{{"tool_name":"Write","tool_input":{{"file_path":"{}/new.rs","content":"fn main() {{}}"}}}}"#,
            dir.path().display()
        );
        let outcome = run(&pre_tool(&json), &StateDocument::default(), dir.path());
        let (rule, message) = outcome.block.unwrap();
        assert_eq!(rule, "research_gate");
        for category in ["docs", "web", "github", "local"] {
            assert!(message.contains(category), "missing {category} in: {message}");
        }
    }

    #[test]
    fn satisfied_research_allows_the_identical_edit() {
        let dir = TempDir::new().unwrap();
        let mut state = StateDocument::default();
        satisfied_research(&mut state);
        let json = format!(
            r#"{{"tool_name":"Write","tool_input":{{"file_path":"{}/new.rs","content":"fn main() {{}}"}}}}"#,
            dir.path().display()
        );
        let outcome = run(&pre_tool(&json), &state, dir.path());
        assert!(outcome.block.is_none());
    }

    #[test]
    fn partially_satisfied_lists_only_the_rest() {
        let dir = TempDir::new().unwrap();
        let mut state = StateDocument::default();
        state.research.mark_complete("docs");
        state.research.mark_complete("web");
        let json = format!(
            r#"{{"tool_name":"Write","tool_input":{{"file_path":"{}/new.rs","content":"x"}}}}"#,
            dir.path().display()
        );
        let outcome = run(&pre_tool(&json), &state, dir.path());
        let (_, message) = outcome.block.unwrap();
        assert!(message.contains("github"));
        assert!(message.contains("local"));
        assert!(!message.contains("docs,"));
    }

    #[test]
    fn safe_mode_bypasses_research_gate() {
        let dir = TempDir::new().unwrap();
        let mut state = StateDocument::default();
        state.overrides.safe_mode = true;
        let json = format!(
            r#"{{"tool_name":"Write","tool_input":{{"file_path":"{}/new.rs","content":"x"}}}}"#,
            dir.path().display()
        );
        let outcome = run(&pre_tool(&json), &state, dir.path());
        assert!(outcome.block.is_none());
    }

    // -- size_limit ---------------------------------------------------------

    fn write_event(root: &Path, file: &str, lines: usize) -> EventContext {
        let content = vec!["line"; lines].join("\\n");
        let json = format!(
            r#"{{"tool_name":"Write","tool_input":{{"file_path":"{}/{}","content":"{}"}}}}"#,
            root.display(),
            file,
            content
        );
        pre_tool(&json)
    }

    fn size_state() -> StateDocument {
        let mut state = StateDocument::default();
        satisfied_research(&mut state);
        state
    }

    #[test]
    fn projected_at_hard_threshold_blocks() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("big.rs"), "fn old() {}\n").unwrap();
        let outcome = run(&write_event(dir.path(), "big.rs", 800), &size_state(), dir.path());
        assert_eq!(outcome.block.as_ref().unwrap().0, "size_limit");
    }

    #[test]
    fn projected_one_under_hard_threshold_warns() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("big.rs"), "fn old() {}\n").unwrap();
        let outcome = run(&write_event(dir.path(), "big.rs", 799), &size_state(), dir.path());
        assert!(outcome.block.is_none());
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn projected_at_soft_threshold_allows() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("big.rs"), "fn old() {}\n").unwrap();
        let outcome = run(&write_event(dir.path(), "big.rs", 500), &size_state(), dir.path());
        assert!(outcome.block.is_none());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn new_files_are_not_size_limited() {
        let dir = TempDir::new().unwrap();
        let outcome = run(
            &write_event(dir.path(), "brand_new.rs", 2000),
            &size_state(),
            dir.path(),
        );
        assert!(outcome.block.is_none());
    }

    #[test]
    fn docs_get_longer_thresholds() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.md"), "# notes\n").unwrap();
        // 1200 lines blocks a code file but only warns for docs.
        let outcome = run(&write_event(dir.path(), "notes.md", 1200), &size_state(), dir.path());
        assert!(outcome.block.is_none());
        assert_eq!(outcome.warnings.len(), 1);

        let outcome = run(&write_event(dir.path(), "notes.md", 1500), &size_state(), dir.path());
        assert_eq!(outcome.block.as_ref().unwrap().0, "size_limit");
    }

    #[test]
    fn edit_delta_projects_from_current_content() {
        let dir = TempDir::new().unwrap();
        // 798 existing lines + an edit that adds 2 → projected 800 → block.
        let body = vec!["existing line"; 798].join("\n");
        std::fs::write(dir.path().join("grown.rs"), body).unwrap();
        let json = format!(
            r#"{{"tool_name":"Edit","tool_input":{{"file_path":"{}/grown.rs","old_string":"existing line","new_string":"kept line\\nnew line\\nnew line"}}}}"#,
            dir.path().display()
        );
        let outcome = run(&pre_tool(&json), &size_state(), dir.path());
        assert_eq!(outcome.block.as_ref().unwrap().0, "size_limit");
    }

    // -- shortcut_bypass ----------------------------------------------------

    fn bash_event(command: &str) -> EventContext {
        pre_tool(&format!(
            r#"{{"tool_name":"Bash","tool_input":{{"command":"{command}"}}}}"#
        ))
    }

    #[test]
    fn shell_write_blocked_while_research_incomplete() {
        let dir = TempDir::new().unwrap();
        let outcome = run(
            &bash_event("echo 'fn main() {}' > src/main.rs"),
            &StateDocument::default(),
            dir.path(),
        );
        assert_eq!(outcome.block.as_ref().unwrap().0, "shortcut_bypass");
    }

    #[test]
    fn shell_write_allowed_when_no_condition_is_active() {
        let dir = TempDir::new().unwrap();
        let mut state = StateDocument::default();
        satisfied_research(&mut state);
        let outcome = run(&bash_event("echo done > out.log"), &state, dir.path());
        assert!(outcome.block.is_none());
    }

    #[test]
    fn readonly_shell_allowed_even_while_gated() {
        let dir = TempDir::new().unwrap();
        let outcome = run(&bash_event("git status"), &StateDocument::default(), dir.path());
        assert!(outcome.block.is_none());
    }

    #[test]
    fn fd_duplication_is_not_a_write() {
        let dir = TempDir::new().unwrap();
        let outcome = run(
            &bash_event("cargo build 2>&1"),
            &StateDocument::default(),
            dir.path(),
        );
        assert!(outcome.block.is_none());
    }

    #[test]
    fn sed_in_place_blocked_while_breaker_tripped() {
        let dir = TempDir::new().unwrap();
        let mut state = StateDocument::default();
        satisfied_research(&mut state);
        for _ in 0..3 {
            state.breaker.record_failure("UNKNOWN", "boom", 3);
        }
        // circuit_breaker fires first for shell tools — order check.
        let outcome = run(&bash_event("sed -i s/a/b/ src/main.rs"), &state, dir.path());
        assert_eq!(outcome.block.as_ref().unwrap().0, "circuit_breaker");
    }

    // -- enforcement_halt ---------------------------------------------------

    #[test]
    fn halted_state_blocks_before_other_gates() {
        let dir = TempDir::new().unwrap();
        let mut state = StateDocument::default();
        satisfied_research(&mut state);
        for _ in 0..3 {
            state
                .enforcement
                .record_block("size_limit", "too big", "Edit", 50, 3);
        }
        assert!(state.enforcement.halted);

        let json = format!(
            r#"{{"tool_name":"Write","tool_input":{{"file_path":"{}/a.rs","content":"x"}}}}"#,
            dir.path().display()
        );
        let outcome = run(&pre_tool(&json), &state, dir.path());
        assert_eq!(outcome.block.as_ref().unwrap().0, "enforcement_halt");
    }
}
