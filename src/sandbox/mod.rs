//! Static sandbox policy over generated expressions
//!
//! Rules are a deployment-configurable list of case-insensitive patterns.
//! A violation is data attached to the compile result, never a hard failure;
//! whether an unsafe document may be persisted is the caller's decision.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One rejection rule: a name, a regex pattern and the message reported
/// when it matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxRule {
    pub name: String,
    pub pattern: String,
    pub message: String,
}

impl SandboxRule {
    fn new(name: &str, pattern: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            message: message.to_string(),
        }
    }
}

/// Configurable rule set, serializable so deployments can ship their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxPolicy {
    pub rules: Vec<SandboxRule>,
}

impl SandboxPolicy {
    /// No rules at all; everything passes.
    pub fn permissive() -> Self {
        Self { rules: Vec::new() }
    }
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            rules: vec![
                SandboxRule::new(
                    "system-namespace",
                    r"\bSystem\s*\.",
                    "expression reaches into the System namespace",
                ),
                SandboxRule::new(
                    "vb-interaction",
                    r"Microsoft\.VisualBasic\.Interaction",
                    "expression uses the VisualBasic Interaction module",
                ),
                SandboxRule::new(
                    "create-object",
                    r"\bCreateObject\s*\(",
                    "expression instantiates COM objects",
                ),
                SandboxRule::new(
                    "get-type",
                    r"\bGetType\b",
                    "expression performs reflection",
                ),
                SandboxRule::new("shell", r"\bShell\s*\(", "expression spawns a process"),
                SandboxRule::new(
                    "environ",
                    r"\bEnviron\b",
                    "expression reads process environment",
                ),
                SandboxRule::new(
                    "custom-code",
                    r"\bCode\s*\.",
                    "expression calls into a custom code assembly",
                ),
                SandboxRule::new(
                    "cmd-exec",
                    r"\bCmdExec\b",
                    "expression invokes command execution",
                ),
            ],
        }
    }
}

/// A rule that matched, with the offending fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxViolation {
    pub rule: String,
    pub message: String,
    pub fragment: String,
}

/// Outcome of checking one expression against the policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxReport {
    pub ok: bool,
    pub violations: Vec<SandboxViolation>,
}

/// Compiled form of a [`SandboxPolicy`], built once per compiler instance.
#[derive(Debug)]
pub struct Sandbox {
    rules: Vec<(SandboxRule, Regex)>,
}

impl Sandbox {
    /// Compile the policy's patterns. Unparsable patterns are skipped with a
    /// diagnostic rather than poisoning the whole rule set.
    pub fn new(policy: &SandboxPolicy) -> Self {
        let mut rules = Vec::with_capacity(policy.rules.len());
        for rule in &policy.rules {
            match Regex::new(&format!("(?i){}", rule.pattern)) {
                Ok(regex) => rules.push((rule.clone(), regex)),
                Err(err) => {
                    warn!(rule = %rule.name, %err, "skipping unparsable sandbox rule")
                }
            }
        }
        Self { rules }
    }

    pub fn check(&self, expression: &str) -> SandboxReport {
        let mut violations = Vec::new();
        for (rule, regex) in &self.rules {
            if let Some(found) = regex.find(expression) {
                violations.push(SandboxViolation {
                    rule: rule.name.clone(),
                    message: rule.message.clone(),
                    fragment: found.as_str().to_string(),
                });
            }
        }
        SandboxReport {
            ok: violations.is_empty(),
            violations,
        }
    }
}
