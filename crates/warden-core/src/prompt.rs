// ---------------------------------------------------------------------------
// PromptCommand
// ---------------------------------------------------------------------------

/// Short operator tokens recognized in prompt text. Matched against the
/// whole trimmed prompt; anything else flows through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptCommand {
    /// Toggle safe mode, or force it with an explicit on/off.
    SafeMode(Option<bool>),
    ResetBreaker,
    Status,
    LoopStart(String),
    LoopStop,
}

pub fn parse(prompt: &str) -> Option<PromptCommand> {
    let trimmed = prompt.trim();
    let lower = trimmed.to_lowercase();
    match lower.as_str() {
        "safemode" => return Some(PromptCommand::SafeMode(None)),
        "safemode on" => return Some(PromptCommand::SafeMode(Some(true))),
        "safemode off" => return Some(PromptCommand::SafeMode(Some(false))),
        "reset breaker" | "breaker reset" => return Some(PromptCommand::ResetBreaker),
        "status" | "warden status" => return Some(PromptCommand::Status),
        "loop stop" => return Some(PromptCommand::LoopStop),
        _ => {}
    }
    if lower.starts_with("loop ") {
        let task = trimmed["loop ".len()..].trim();
        if !task.is_empty() {
            return Some(PromptCommand::LoopStart(task.to_string()));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
