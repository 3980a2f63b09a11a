//! Known failure classes and their remediation commands

use serde::{Deserialize, Serialize};

/// A keyword-triggered remediation recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPattern {
    pub name: String,

    /// Case-insensitive substrings; any one of them triggers the pattern
    pub keywords: Vec<String>,

    /// Commands run in order when the pattern matches
    pub fix_commands: Vec<String>,

    #[serde(default)]
    pub description: String,
}

impl ErrorPattern {
    pub fn new<K, F>(name: impl Into<String>, keywords: K, fix_commands: F) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            name: name.into(),
            keywords: keywords.into_iter().map(Into::into).collect(),
            fix_commands: fix_commands.into_iter().map(Into::into).collect(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check whether any keyword occurs in `text`, ignoring case
    pub fn matches(&self, text: &str) -> bool {
        let haystack = text.to_lowercase();
        self.keywords
            .iter()
            .any(|keyword| haystack.contains(&keyword.to_lowercase()))
    }
}

/// Ordered registry of error patterns; the first match wins
#[derive(Debug, Clone, Default)]
pub struct ErrorPatternRegistry {
    patterns: Vec<ErrorPattern>,
}

impl ErrorPatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in patterns
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for pattern in default_patterns() {
            registry.register(pattern);
        }
        registry
    }

    pub fn register(&mut self, pattern: ErrorPattern) {
        self.patterns.push(pattern);
    }

    /// First pattern, in registration order, matching `error_message`
    pub fn find_match(&self, error_message: &str) -> Option<&ErrorPattern> {
        self.patterns.iter().find(|p| p.matches(error_message))
    }

    pub fn patterns(&self) -> &[ErrorPattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Built-in failure classes
pub fn default_patterns() -> Vec<ErrorPattern> {
    vec![
        ErrorPattern::new(
            "import_error",
            ["No module named", "ModuleNotFoundError", "ImportError"],
            ["pip install -r requirements.txt"],
        )
        .with_description("Missing Python dependency"),
        ErrorPattern::new(
            "node_module_missing",
            ["Cannot find module", "npm ERR! missing"],
            ["npm ci"],
        )
        .with_description("Missing Node.js dependency"),
        ErrorPattern::new(
            "permission_denied",
            ["Permission denied", "EACCES"],
            ["chmod -R u+rwX ."],
        )
        .with_description("Workspace permission problem"),
        ErrorPattern::new(
            "disk_space",
            ["No space left on device", "ENOSPC"],
            ["docker system prune -af", "rm -rf /tmp/pipeline-cache"],
        )
        .with_description("Build host out of disk"),
        ErrorPattern::new(
            "port_in_use",
            ["Address already in use", "EADDRINUSE"],
            ["pkill -f 'test-server' || true"],
        )
        .with_description("Stale test server holding a port"),
        ErrorPattern::new(
            "network_timeout",
            ["Connection timed out", "Temporary failure in name resolution", "ETIMEDOUT"],
            ["sleep 5"],
        )
        .with_description("Transient network failure"),
    ]
}
