use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// CircuitBreakerState
// ---------------------------------------------------------------------------

/// Latch over repeated tool failures. Once tripped it stays tripped across
/// any number of successes — and across session restarts — until an explicit
/// reset command clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    #[serde(default)]
    pub failures: u32,
    #[serde(default)]
    pub tripped: bool,
    #[serde(default)]
    pub tripped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub error_signatures: BTreeMap<String, u32>,
}

impl CircuitBreakerState {
    /// Record one failure. Trips when the consecutive-failure counter or any
    /// single signature counter reaches `threshold`. Signature counters are
    /// never reset by successes, so a recurring error pattern trips the
    /// breaker even with transient successes in between.
    pub fn record_failure(&mut self, signature: &str, error: &str, threshold: u32) {
        self.failures += 1;
        let count = self
            .error_signatures
            .entry(signature.to_string())
            .or_insert(0);
        *count += 1;
        self.last_error = Some(truncate(error, 500));

        let signature_tripped = *count >= threshold;
        if !self.tripped && (self.failures >= threshold || signature_tripped) {
            self.tripped = true;
            self.tripped_at = Some(Utc::now());
        }
    }

    /// A success clears only the consecutive-failure counter. Per-signature
    /// counters and an existing trip are untouched.
    pub fn record_success(&mut self) {
        self.failures = 0;
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

// ---------------------------------------------------------------------------
// ResearchState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchCategoryState {
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub via_task: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchState {
    #[serde(default)]
    pub categories: BTreeMap<String, ResearchCategoryState>,
}

impl ResearchState {
    /// A category counts only when completed AND delegated through a task.
    /// Direct tool calls never satisfy the gate.
    pub fn satisfied(&self, name: &str) -> bool {
        self.categories
            .get(name)
            .map(|c| c.completed_at.is_some() && c.via_task)
            .unwrap_or(false)
    }

    /// Required categories not yet satisfied, in the required order.
    pub fn missing(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.satisfied(name))
            .cloned()
            .collect()
    }

    pub fn mark_complete(&mut self, name: &str) {
        let entry = self.categories.entry(name.to_string()).or_default();
        entry.completed_at = Some(Utc::now());
        entry.via_task = true;
    }
}

// ---------------------------------------------------------------------------
// EditState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditState {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub unique_files: BTreeSet<String>,
    #[serde(default)]
    pub last_file: Option<String>,
}

impl EditState {
    pub fn record_edit(&mut self, path: &str) {
        self.count += 1;
        self.unique_files.insert(path.to_string());
        self.last_file = Some(path.to_string());
    }
}

// ---------------------------------------------------------------------------
// EnforcementState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub rule: String,
    pub message: String,
    pub tool: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnforcementState {
    #[serde(default)]
    pub blocks: Vec<BlockRecord>,
    /// Kill switch: latched when the most recent blocks are all the same
    /// rule firing over and over. Cleared only by session start or an
    /// explicit full reset.
    #[serde(default)]
    pub halted: bool,
}

impl EnforcementState {
    pub fn record_block(&mut self, rule: &str, message: &str, tool: &str, cap: usize, halt_run: usize) {
        self.blocks.push(BlockRecord {
            rule: rule.to_string(),
            message: message.to_string(),
            tool: tool.to_string(),
            at: Utc::now(),
        });
        if self.blocks.len() > cap {
            let excess = self.blocks.len() - cap;
            self.blocks.drain(..excess);
        }
        if halt_run > 0 && self.blocks.len() >= halt_run {
            let tail = &self.blocks[self.blocks.len() - halt_run..];
            if tail.iter().all(|b| b.rule == tail[0].rule) {
                self.halted = true;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ActionLogState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub tool: String,
    pub at: DateTime<Utc>,
    pub success: bool,
    #[serde(default)]
    pub error_signature: Option<String>,
}

/// Fixed-size ring of recent tool events, used only for lightweight pattern
/// correlation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionLogState {
    #[serde(default)]
    pub entries: Vec<ActionEntry>,
}

impl ActionLogState {
    pub fn push(&mut self, entry: ActionEntry, cap: usize) {
        self.entries.push(entry);
        if self.entries.len() > cap {
            let excess = self.entries.len() - cap;
            self.entries.drain(..excess);
        }
    }
}

// ---------------------------------------------------------------------------
// WorkLoopState
// ---------------------------------------------------------------------------

/// Optional bounded iterative work session. Never persists across a session
/// boundary — archived and cleared at session start if still active.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkLoopState {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub iteration: u32,
    #[serde(default)]
    pub max_iterations: u32,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl WorkLoopState {
    pub fn start(&mut self, task: &str, max_iterations: u32) {
        self.active = true;
        self.task = Some(task.to_string());
        self.iteration = 0;
        self.max_iterations = max_iterations;
        self.started_at = Some(Utc::now());
    }

    pub fn stop(&mut self) {
        *self = Self::default();
    }

    /// Advance one iteration; deactivates when the bound is reached.
    /// Returns true while the loop remains active.
    pub fn tick(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.iteration += 1;
        if self.iteration >= self.max_iterations {
            self.active = false;
        }
        self.active
    }
}

// ---------------------------------------------------------------------------
// OverrideState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideState {
    /// Manual override toggled by the `safemode` prompt command. Relaxes the
    /// process-discipline gates; never bypasses path safety or a tripped
    /// breaker.
    #[serde(default)]
    pub safe_mode: bool,
}

// ---------------------------------------------------------------------------
// Section
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Breaker,
    Research,
    Edits,
    Enforcement,
    Actions,
    WorkLoop,
    Overrides,
}

impl Section {
    pub fn all() -> &'static [Section] {
        &[
            Section::Breaker,
            Section::Research,
            Section::Edits,
            Section::Enforcement,
            Section::Actions,
            Section::WorkLoop,
            Section::Overrides,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Section::Breaker => "breaker",
            Section::Research => "research",
            Section::Edits => "edits",
            Section::Enforcement => "enforcement",
            Section::Actions => "actions",
            Section::WorkLoop => "work_loop",
            Section::Overrides => "overrides",
        }
    }
}

// ---------------------------------------------------------------------------
// StateDocument
// ---------------------------------------------------------------------------

/// The single persisted aggregate. Every section carries `#[serde(default)]`,
/// so a document loaded from disk is always fully populated — a section
/// absent on load is synthesized from schema defaults, never left null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub breaker: CircuitBreakerState,
    #[serde(default)]
    pub research: ResearchState,
    #[serde(default)]
    pub edits: EditState,
    #[serde(default)]
    pub enforcement: EnforcementState,
    #[serde(default)]
    pub actions: ActionLogState,
    #[serde(default)]
    pub work_loop: WorkLoopState,
    #[serde(default)]
    pub overrides: OverrideState,
}

fn default_version() -> u32 {
    1
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            version: default_version(),
            breaker: CircuitBreakerState::default(),
            research: ResearchState::default(),
            edits: EditState::default(),
            enforcement: EnforcementState::default(),
            actions: ActionLogState::default(),
            work_loop: WorkLoopState::default(),
            overrides: OverrideState::default(),
        }
    }
}

impl StateDocument {
    /// Restore one section to schema defaults, leaving all others untouched.
    pub fn reset_section(&mut self, section: Section) {
        match section {
            Section::Breaker => self.breaker = CircuitBreakerState::default(),
            Section::Research => self.research = ResearchState::default(),
            Section::Edits => self.edits = EditState::default(),
            Section::Enforcement => self.enforcement = EnforcementState::default(),
            Section::Actions => self.actions = ActionLogState::default(),
            Section::WorkLoop => self.work_loop = WorkLoopState::default(),
            Section::Overrides => self.overrides = OverrideState::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
