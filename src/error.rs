//! Error types for the field-code compiler
//!
//! Typed errors per failure family using thiserror. Parse failures abort the
//! item they belong to; schema findings are collected into an aggregate list
//! and surfaced as a single failure at the end of a validation pass.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::FieldCategory;

/// Main error type for compile and synthesis operations
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("syntax error: {message} in `{expression}`")]
    Syntax {
        message: String,
        expression: String,
        offset: Option<usize>,
    },

    #[error("unsupported {category} field code: `{raw}`")]
    Unsupported { category: FieldCategory, raw: String },

    #[error("conditional nesting exceeds the maximum depth of {max}")]
    DepthExceeded { max: usize },

    #[error("schema validation failed: {0}")]
    Schema(#[from] SchemaViolations),

    // quick-xml's event writer surfaces errors via its own error type
    #[error("xml serialization failed: {0}")]
    Xml(#[from] quick_xml::Error),
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Severity level for schema findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warn => write!(f, "warn"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single finding from the schema validation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    pub severity: Severity,
    pub message: String,
    /// Element path the finding refers to, e.g. `Report/DataSets/DataSet`
    pub location: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} at {}", self.severity, self.message, self.location)
    }
}

/// Aggregate of all findings from one validation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaViolations(pub Vec<SchemaViolation>);

impl SchemaViolations {
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|v| v.severity == Severity::Error)
    }
}

impl fmt::Display for SchemaViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} finding(s)", self.0.len())?;
        for violation in &self.0 {
            write!(f, "; {violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaViolations {}
