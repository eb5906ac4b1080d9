use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

pub const UNKNOWN_SIGNATURE: &str = "UNKNOWN";

static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();

fn patterns() -> &'static [(&'static str, Regex)] {
    PATTERNS.get_or_init(|| {
        let p = |name, re: &str| (name, Regex::new(re).unwrap());
        // Ordered: first match wins.
        vec![
            p(
                "COMMAND_NOT_FOUND",
                r"(?i)command not found|no such command|is not recognized as",
            ),
            p(
                "PERMISSION_DENIED",
                r"(?i)permission denied|operation not permitted|EACCES|EPERM",
            ),
            p(
                "FILE_NOT_FOUND",
                r"(?i)no such file or directory|file not found|ENOENT",
            ),
            p(
                "BUILD_FAILED",
                r"(?i)build failed|compilation failed|compile error|linker command failed|could not compile",
            ),
            p(
                "SYNTAX_ERROR",
                r"(?i)syntax error|parse error|unexpected token|unexpected end of",
            ),
            p(
                "TYPE_ERROR",
                r"(?i)type error|mismatched types|type mismatch|cannot be applied to type",
            ),
            p(
                "NETWORK_ERROR",
                r"(?i)connection (refused|reset|timed out)|could not resolve host|network is unreachable|ECONNREFUSED|ETIMEDOUT",
            ),
            p(
                "MEMORY_ERROR",
                r"(?i)out of memory|cannot allocate memory|memory allocation .* failed|OOM[ -]?kill",
            ),
        ]
    })
}

/// Normalize raw error text into a fixed signature. Ordered pattern match,
/// first hit wins, generic fallback otherwise.
pub fn classify_error(text: &str) -> &'static str {
    for (name, re) in patterns() {
        if re.is_match(text) {
            return name;
        }
    }
    UNKNOWN_SIGNATURE
}

// ---------------------------------------------------------------------------
// Structural outcome classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ToolStatus {
    Success,
    Failure(String),
}

/// Decide whether a completed tool event was a failure.
///
/// Keyed strictly off structural fields — an explicit error field, an
/// `is_error` flag, a nonzero exit status, stderr output — never substring
/// matching across arbitrary output, so a successful read of a file that
/// merely *contains* the word "error" is not misclassified.
pub fn classify_response(response: &Value) -> ToolStatus {
    if response.is_null() {
        return ToolStatus::Success;
    }

    if let Some(err) = response.get("error").and_then(|v| v.as_str()) {
        if !err.is_empty() {
            return ToolStatus::Failure(err.to_string());
        }
    }

    if response.get("is_error").and_then(|v| v.as_bool()) == Some(true) {
        let text = response
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("tool reported an error");
        return ToolStatus::Failure(text.to_string());
    }

    if let Some(code) = response.get("exit_code").and_then(|v| v.as_i64()) {
        return classify_exit(code, response);
    }
    if let Some(code) = response.get("exitCode").and_then(|v| v.as_i64()) {
        return classify_exit(code, response);
    }

    ToolStatus::Success
}

fn classify_exit(code: i64, response: &Value) -> ToolStatus {
    if code == 0 {
        return ToolStatus::Success;
    }
    let stderr = response
        .get("stderr")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty());
    ToolStatus::Failure(match stderr {
        Some(text) => text.to_string(),
        None => format!("exit code {code}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signature_first_match_wins() {
        assert_eq!(
            classify_error("zsh: command not found: cargoo"),
            "COMMAND_NOT_FOUND"
        );
        assert_eq!(classify_error("EACCES: permission denied"), "PERMISSION_DENIED");
        assert_eq!(
            classify_error("cat: /tmp/x: No such file or directory"),
            "FILE_NOT_FOUND"
        );
        assert_eq!(
            classify_error("error: could not compile `warden-core`"),
            "BUILD_FAILED"
        );
        assert_eq!(classify_error("SyntaxError: unexpected token"), "SYNTAX_ERROR");
        assert_eq!(classify_error("mismatched types"), "TYPE_ERROR");
        assert_eq!(classify_error("connection refused"), "NETWORK_ERROR");
        assert_eq!(classify_error("fork: Cannot allocate memory"), "MEMORY_ERROR");
        assert_eq!(classify_error("something exploded"), UNKNOWN_SIGNATURE);
    }

    #[test]
    fn explicit_error_field_is_failure() {
        let status = classify_response(&json!({"error": "boom"}));
        assert_eq!(status, ToolStatus::Failure("boom".to_string()));
    }

    #[test]
    fn is_error_flag_is_failure() {
        let status = classify_response(&json!({"is_error": true, "content": "bad input"}));
        assert_eq!(status, ToolStatus::Failure("bad input".to_string()));
    }

    #[test]
    fn nonzero_exit_is_failure() {
        let status = classify_response(&json!({"exit_code": 127, "stderr": "sh: foo: command not found"}));
        match status {
            ToolStatus::Failure(text) => assert_eq!(classify_error(&text), "COMMAND_NOT_FOUND"),
            ToolStatus::Success => panic!("expected failure"),
        }
    }

    #[test]
    fn zero_exit_is_success_despite_stderr_noise() {
        let status = classify_response(&json!({"exit_code": 0, "stderr": "warning: deprecated"}));
        assert_eq!(status, ToolStatus::Success);
    }

    #[test]
    fn error_like_content_is_not_a_failure() {
        // Reading a file whose text contains "error" is still a success —
        // classification is structural, not substring-based.
        let status = classify_response(&json!({"content": "log: error: all systems nominal"}));
        assert_eq!(status, ToolStatus::Success);
    }

    #[test]
    fn null_response_is_success() {
        assert_eq!(classify_response(&Value::Null), ToolStatus::Success);
    }
}
