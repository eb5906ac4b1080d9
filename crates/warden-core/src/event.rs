use serde_json::Value;

// ---------------------------------------------------------------------------
// HookEvent
// ---------------------------------------------------------------------------

/// Hook points the external assistant invokes, one short-lived process each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    SessionStart,
    UserPromptSubmit,
    PreToolUse,
    PostToolUse,
    Stop,
}

impl HookEvent {
    /// Parse an event name from a CLI argument (case- and separator-insensitive).
    pub fn from_arg(s: &str) -> Option<HookEvent> {
        match s.to_lowercase().as_str() {
            "sessionstart" | "session-start" | "session_start" => Some(HookEvent::SessionStart),
            "userpromptsubmit" | "user-prompt-submit" | "user_prompt_submit" => {
                Some(HookEvent::UserPromptSubmit)
            }
            "pretooluse" | "pre-tool-use" | "pre_tool_use" => Some(HookEvent::PreToolUse),
            "posttooluse" | "post-tool-use" | "post_tool_use" => Some(HookEvent::PostToolUse),
            "stop" => Some(HookEvent::Stop),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HookEvent::SessionStart => "SessionStart",
            HookEvent::UserPromptSubmit => "UserPromptSubmit",
            HookEvent::PreToolUse => "PreToolUse",
            HookEvent::PostToolUse => "PostToolUse",
            HookEvent::Stop => "Stop",
        }
    }
}

// ---------------------------------------------------------------------------
// ToolClass
// ---------------------------------------------------------------------------

/// Coarse classing of tools for policy purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolClass {
    /// Structured file mutation: Write, Edit, MultiEdit, NotebookEdit.
    Edit,
    /// Raw shell execution.
    Shell,
    /// Delegated subagent work.
    Task,
    Other,
}

// ---------------------------------------------------------------------------
// EventContext
// ---------------------------------------------------------------------------

/// Normalized representation of one incoming hook event.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub event: HookEvent,
    pub tool_name: Option<String>,
    pub tool_input: Value,
    pub tool_response: Value,
    pub prompt: Option<String>,
}

impl EventContext {
    /// Build from raw stdin. Malformed or empty JSON yields `None`; callers
    /// treat that as allow/no-op — a broken payload must never crash a hook.
    pub fn parse(event: HookEvent, stdin: &str) -> Option<EventContext> {
        let data: Value = serde_json::from_str(stdin).ok()?;
        if !data.is_object() {
            return None;
        }
        Some(EventContext {
            event,
            tool_name: data
                .get("tool_name")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            tool_input: data.get("tool_input").cloned().unwrap_or(Value::Null),
            tool_response: data.get("tool_response").cloned().unwrap_or(Value::Null),
            prompt: data
                .get("prompt")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        })
    }

    pub fn tool_class(&self) -> ToolClass {
        match self.tool_name.as_deref() {
            Some("Write") | Some("Edit") | Some("MultiEdit") | Some("NotebookEdit") => {
                ToolClass::Edit
            }
            Some("Bash") => ToolClass::Shell,
            Some("Task") => ToolClass::Task,
            _ => ToolClass::Other,
        }
    }

    /// Target file path, for tools that carry one.
    pub fn file_path(&self) -> Option<&str> {
        for key in ["file_path", "path", "notebook_path"] {
            if let Some(p) = self.tool_input.get(key).and_then(|v| v.as_str()) {
                return Some(p);
            }
        }
        None
    }

    /// Shell command, for Bash-class tools.
    pub fn command(&self) -> Option<&str> {
        self.tool_input.get("command").and_then(|v| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_arg_all_spellings() {
        assert_eq!(
            HookEvent::from_arg("SessionStart"),
            Some(HookEvent::SessionStart)
        );
        assert_eq!(
            HookEvent::from_arg("pre-tool-use"),
            Some(HookEvent::PreToolUse)
        );
        assert_eq!(
            HookEvent::from_arg("post_tool_use"),
            Some(HookEvent::PostToolUse)
        );
        assert_eq!(
            HookEvent::from_arg("user-prompt-submit"),
            Some(HookEvent::UserPromptSubmit)
        );
        assert_eq!(HookEvent::from_arg("stop"), Some(HookEvent::Stop));
        assert_eq!(HookEvent::from_arg("bogus"), None);
        assert_eq!(HookEvent::from_arg(""), None);
    }

    #[test]
    fn parse_tool_event() {
        let ctx = EventContext::parse(
            HookEvent::PreToolUse,
            r#"{"tool_name":"Edit","tool_input":{"file_path":"src/main.rs","old_string":"a","new_string":"b"}}"#,
        )
        .unwrap();
        assert_eq!(ctx.tool_name.as_deref(), Some("Edit"));
        assert_eq!(ctx.tool_class(), ToolClass::Edit);
        assert_eq!(ctx.file_path(), Some("src/main.rs"));
        assert!(ctx.command().is_none());
    }

    #[test]
    fn parse_prompt_event() {
        let ctx =
            EventContext::parse(HookEvent::UserPromptSubmit, r#"{"prompt":"fix the bug"}"#).unwrap();
        assert_eq!(ctx.prompt.as_deref(), Some("fix the bug"));
        assert_eq!(ctx.tool_class(), ToolClass::Other);
    }

    #[test]
    fn malformed_stdin_is_none() {
        assert!(EventContext::parse(HookEvent::PreToolUse, "not json").is_none());
        assert!(EventContext::parse(HookEvent::PreToolUse, "").is_none());
        assert!(EventContext::parse(HookEvent::PreToolUse, "[1,2]").is_none());
    }

    #[test]
    fn tool_classes() {
        for (tool, class) in [
            ("Write", ToolClass::Edit),
            ("MultiEdit", ToolClass::Edit),
            ("NotebookEdit", ToolClass::Edit),
            ("Bash", ToolClass::Shell),
            ("Task", ToolClass::Task),
            ("Read", ToolClass::Other),
        ] {
            let ctx = EventContext::parse(
                HookEvent::PreToolUse,
                &format!(r#"{{"tool_name":"{tool}"}}"#),
            )
            .unwrap();
            assert_eq!(ctx.tool_class(), class, "tool {tool}");
        }
    }

    #[test]
    fn file_path_fallback_keys() {
        let ctx = EventContext::parse(
            HookEvent::PreToolUse,
            r#"{"tool_name":"NotebookEdit","tool_input":{"notebook_path":"nb.ipynb"}}"#,
        )
        .unwrap();
        assert_eq!(ctx.file_path(), Some("nb.ipynb"));
    }
}
