use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// BreakerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Failure count (global or per-signature) at which the breaker trips.
    #[serde(default = "default_breaker_threshold")]
    pub threshold: u32,
}

fn default_breaker_threshold() -> u32 {
    3
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: default_breaker_threshold(),
        }
    }
}

// ---------------------------------------------------------------------------
// ResearchConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchCategory {
    pub name: String,
    /// Substrings matched against a delegated task's description/prompt.
    #[serde(default)]
    pub matchers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Required categories. The list length is the required count — never a
    /// hardcoded number elsewhere.
    #[serde(default = "default_research_categories")]
    pub categories: Vec<ResearchCategory>,
}

fn default_research_categories() -> Vec<ResearchCategory> {
    let cat = |name: &str, matchers: &[&str]| ResearchCategory {
        name: name.to_string(),
        matchers: matchers.iter().map(|m| m.to_string()).collect(),
    };
    vec![
        cat("docs", &["docs", "documentation", "api reference"]),
        cat("web", &["web", "search the web", "websearch"]),
        cat("github", &["github", "repository", "open source"]),
        cat("local", &["local", "codebase", "existing code"]),
    ]
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            categories: default_research_categories(),
        }
    }
}

impl ResearchConfig {
    pub fn category_names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// SizeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeConfig {
    /// Projected line count above which an edit draws a warning (code files).
    #[serde(default = "default_code_warn")]
    pub code_warn: usize,
    /// Projected line count at or above which an edit is blocked (code files).
    #[serde(default = "default_code_block")]
    pub code_block: usize,
    /// Documentation files are allowed to run longer before warning.
    #[serde(default = "default_docs_warn")]
    pub docs_warn: usize,
    #[serde(default = "default_docs_block")]
    pub docs_block: usize,
    /// Extensions treated as documentation for threshold purposes.
    #[serde(default = "default_docs_extensions")]
    pub docs_extensions: Vec<String>,
}

fn default_code_warn() -> usize {
    500
}

fn default_code_block() -> usize {
    800
}

fn default_docs_warn() -> usize {
    1000
}

fn default_docs_block() -> usize {
    1500
}

fn default_docs_extensions() -> Vec<String> {
    ["md", "rst", "txt", "adoc"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for SizeConfig {
    fn default() -> Self {
        Self {
            code_warn: default_code_warn(),
            code_block: default_code_block(),
            docs_warn: default_docs_warn(),
            docs_block: default_docs_block(),
            docs_extensions: default_docs_extensions(),
        }
    }
}

impl SizeConfig {
    /// Thresholds (warn, block) for a given file path.
    pub fn thresholds_for(&self, path: &Path) -> (usize, usize) {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if self.docs_extensions.iter().any(|d| *d == ext) {
            (self.docs_warn, self.docs_block)
        } else {
            (self.code_warn, self.code_block)
        }
    }
}

// ---------------------------------------------------------------------------
// SafetyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Filesystem prefixes no tool may touch. `~` expands to $HOME.
    #[serde(default = "default_denied_prefixes")]
    pub denied_prefixes: Vec<String>,
}

fn default_denied_prefixes() -> Vec<String> {
    [
        "/etc",
        "/usr",
        "/bin",
        "/sbin",
        "/boot",
        "/sys",
        "/proc",
        "/dev",
        "~/.ssh",
        "~/.aws",
        "~/.gnupg",
        "~/.config/gcloud",
        "~/.kube",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            denied_prefixes: default_denied_prefixes(),
        }
    }
}

// ---------------------------------------------------------------------------
// LogConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Ring buffer size for the action log.
    #[serde(default = "default_action_cap")]
    pub action_cap: usize,
    /// Most recent block records retained in the enforcement log.
    #[serde(default = "default_block_cap")]
    pub block_cap: usize,
    /// Consecutive identical blocks that latch the halt kill switch.
    #[serde(default = "default_halt_run")]
    pub halt_run: usize,
}

fn default_action_cap() -> usize {
    20
}

fn default_block_cap() -> usize {
    50
}

fn default_halt_run() -> usize {
    3
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            action_cap: default_action_cap(),
            block_cap: default_block_cap(),
            halt_run: default_halt_run(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkLoopConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkLoopConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_iterations() -> u32 {
    5
}

impl Default for WorkLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

// ---------------------------------------------------------------------------
// LockConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Bounded wait before a stale lock is forcibly taken over. Must stay
    /// well under the caller's hook timeout.
    #[serde(default = "default_lock_wait_ms")]
    pub wait_ms: u64,
    #[serde(default = "default_lock_poll_ms")]
    pub poll_ms: u64,
}

fn default_lock_wait_ms() -> u64 {
    2000
}

fn default_lock_poll_ms() -> u64 {
    10
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_ms: default_lock_wait_ms(),
            poll_ms: default_lock_poll_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Process-wide configuration, constructed once per hook invocation and
/// passed by reference to every component.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub research: ResearchConfig,
    #[serde(default)]
    pub size: SizeConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub logs: LogConfig,
    #[serde(default)]
    pub work_loop: WorkLoopConfig,
    #[serde(default)]
    pub lock: LockConfig,
}

impl Config {
    /// Load `.warden/config.yaml`, falling back to defaults when the file is
    /// absent. A malformed file is an error — a half-read config silently
    /// changing thresholds is worse than failing loudly at the CLI boundary.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let config: Config = serde_yaml::from_str(&data)?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
