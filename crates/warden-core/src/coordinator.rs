use crate::config::Config;
use crate::event::{EventContext, HookEvent};
use crate::state::StateDocument;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allow,
    Warn(String),
    Block { rule: &'static str, message: String },
}

impl Decision {
    pub fn block(rule: &'static str, message: impl Into<String>) -> Decision {
        Decision::Block {
            rule,
            message: message.into(),
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Decision::Block { .. })
    }
}

// ---------------------------------------------------------------------------
// EvalContext
// ---------------------------------------------------------------------------

/// Everything a detector may look at: the event plus an immutable snapshot
/// of state. Detectors never mutate — all mutation happens post-event in the
/// trackers.
pub struct EvalContext<'a> {
    pub event: &'a EventContext,
    pub state: &'a StateDocument,
    pub config: &'a Config,
    pub root: &'a Path,
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// A fn-pointer rule — one concern per detector, evaluated in list order.
/// Detectors are an explicit static list (no self-registration), so the
/// priority order is visible in one place.
pub struct Detector {
    pub id: &'static str,
    pub events: &'static [HookEvent],
    pub eval: fn(&EvalContext) -> Decision,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Aggregate result for one event: at most one block (bail-early) plus any
/// number of warnings gathered before it.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub block: Option<(&'static str, String)>,
    pub warnings: Vec<String>,
}

impl Outcome {
    pub fn allow() -> Outcome {
        Outcome {
            block: None,
            warnings: Vec::new(),
        }
    }

    /// The entire control surface seen by the external caller: 2 blocks the
    /// in-flight operation, everything else is 0.
    pub fn exit_code(&self) -> i32 {
        if self.block.is_some() {
            2
        } else {
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct Coordinator {
    detectors: Vec<Detector>,
}

impl Coordinator {
    pub fn new(detectors: Vec<Detector>) -> Self {
        Self { detectors }
    }

    /// Run the detectors registered for `event` in list order, stopping at
    /// the first Block so the user sees a single unambiguous message rather
    /// than a flood of overlapping complaints. Warn results accumulate.
    ///
    /// A panicking detector converts to Allow: a defect in the enforcement
    /// logic must never stall or crash the caller's actual work.
    pub fn run(&self, event: HookEvent, ctx: &EvalContext) -> Outcome {
        let mut warnings = Vec::new();
        for detector in self.detectors.iter().filter(|d| d.events.contains(&event)) {
            let decision = catch_unwind(AssertUnwindSafe(|| (detector.eval)(ctx)))
                .unwrap_or_else(|_| {
                    tracing::warn!(detector = detector.id, "detector panicked; failing open");
                    Decision::Allow
                });
            match decision {
                Decision::Allow => {}
                Decision::Warn(message) => warnings.push(message),
                Decision::Block { rule, message } => {
                    return Outcome {
                        block: Some((rule, message)),
                        warnings,
                    }
                }
            }
        }
        Outcome {
            block: None,
            warnings,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
