//! Fatal log signatures

use regex::Regex;

use crate::models::health::LogAnomaly;

/// Signature reported for a process that keeps restarting
pub const CRASH_LOOP: &str = "crash-loop";

/// Known fatal signatures, in priority order. The first match wins, so the
/// generic exception and log-level markers come after the specific causes.
const SIGNATURES: &[(&str, &str)] = &[
    (
        "out-of-memory",
        r"(?i)\bmemoryerror\b|out of memory|cannot allocate memory|oom-kill|killed process \d+",
    ),
    (
        CRASH_LOOP,
        r"(?i)too many unstable restarts|errored state|restart loop",
    ),
    (
        "missing-module",
        r"(?i)modulenotfounderror|no module named|importerror",
    ),
    (
        "disk-full",
        r"(?i)no space left on device|disk full|filesystem full",
    ),
    ("database-locked", r"(?i)database is locked|database disk image is malformed"),
    (
        "permission-denied",
        r"(?i)permission denied|permissionerror|\beacces\b",
    ),
    (
        "unhandled-exception",
        r"(?i)traceback \(most recent call last\)|uncaught exception|unhandled (promise )?rejection|panicked at",
    ),
    ("critical", r"\bCRITICAL\b"),
];

/// Ordered classifier for recent log output
pub struct SignatureSet {
    signatures: Vec<(String, Regex)>,
}

impl SignatureSet {
    /// The built-in signature list
    pub fn builtin() -> Self {
        let signatures = SIGNATURES
            .iter()
            .filter_map(|(name, pattern)| {
                Regex::new(pattern)
                    .ok()
                    .map(|regex| (name.to_string(), regex))
            })
            .collect();
        Self { signatures }
    }

    /// Built-in signatures followed by extra `(name, pattern)` pairs
    pub fn with_extra(extra: &[(String, String)]) -> Result<Self, regex::Error> {
        let mut set = Self::builtin();
        for (name, pattern) in extra {
            set.signatures.push((name.clone(), Regex::new(pattern)?));
        }
        Ok(set)
    }

    pub fn names(&self) -> Vec<&str> {
        self.signatures.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Classify a block of log text.
    ///
    /// Signatures are tried in order against the whole window; for the first
    /// signature that matches anywhere, the latest matching line is reported.
    pub fn classify(&self, logs: &str) -> Option<LogAnomaly> {
        for (name, regex) in &self.signatures {
            if let Some(line) = logs.lines().rev().find(|line| regex.is_match(line)) {
                return Some(LogAnomaly {
                    signature: name.clone(),
                    line: line.trim().to_string(),
                });
            }
        }
        None
    }
}

impl Default for SignatureSet {
    fn default() -> Self {
        Self::builtin()
    }
}
