//! Expression tree for parsed field codes
//!
//! The tree is a closed variant: per-kind arity is fixed by the shape of each
//! variant (a binary node always owns exactly two operands, a conditional two
//! or three), so downstream stages never see a malformed node. Trees are
//! built once and read-only afterwards.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Scalar literal payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDate),
    Null,
}

/// A parsed field-code expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    /// Reference to a data-set field, rendered `Fields!name.Value`
    FieldRef(String),
    /// Reference to a report parameter, rendered `Parameters!name.Value`
    ParamRef(String),
    /// Reference to a report global, rendered `Globals!name`
    GlobalRef(String),
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `op` of `None` means negation
    Unary {
        op: Option<String>,
        operand: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        when_true: Box<Expr>,
        when_false: Option<Box<Expr>>,
    },
    Aggregate {
        function: String,
        target: Box<Expr>,
        scope: Option<String>,
    },
}

impl Expr {
    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn number(value: f64) -> Self {
        Expr::Literal(Literal::Number(value))
    }

    pub fn boolean(value: bool) -> Self {
        Expr::Literal(Literal::Boolean(value))
    }

    pub fn null() -> Self {
        Expr::Literal(Literal::Null)
    }

    pub fn field(name: impl Into<String>) -> Self {
        Expr::FieldRef(name.into())
    }

    pub fn binary(op: impl Into<String>, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op: op.into(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn negate(operand: Expr) -> Self {
        Expr::Unary {
            op: None,
            operand: Box::new(operand),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn conditional(condition: Expr, when_true: Expr, when_false: Option<Expr>) -> Self {
        Expr::Conditional {
            condition: Box::new(condition),
            when_true: Box::new(when_true),
            when_false: when_false.map(Box::new),
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, Expr::Conditional { .. })
    }

    pub fn as_field_name(&self) -> Option<&str> {
        match self {
            Expr::FieldRef(name) => Some(name),
            _ => None,
        }
    }
}

/// Category assigned to a field code by the upstream extraction stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldCategory {
    MergeField,
    If,
    PageNumber,
    Date,
    Unsupported,
}

impl fmt::Display for FieldCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldCategory::MergeField => write!(f, "merge-field"),
            FieldCategory::If => write!(f, "if"),
            FieldCategory::PageNumber => write!(f, "page-number"),
            FieldCategory::Date => write!(f, "date"),
            FieldCategory::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// A placeholder directive lifted out of a source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCode {
    /// Stable locator assigned by the extraction stage
    pub id: String,
    pub category: FieldCategory,
    /// Raw directive text, e.g. `MERGEFIELD Customer`
    pub raw: String,
}

impl FieldCode {
    pub fn new(id: impl Into<String>, category: FieldCategory, raw: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category,
            raw: raw.into(),
        }
    }
}
