//! Conditional analysis over parsed field codes
//!
//! Extraction is best effort over a batch: an `if` code whose parse fails or
//! whose root is not a conditional is skipped with a diagnostic, never a hard
//! failure. Flattening nested conditionals walks an explicit stack instead of
//! recursing, so adversarial nesting hits a typed depth error rather than the
//! call stack.

use tracing::{debug, warn};

use crate::ast::{Expr, FieldCategory, FieldCode};
use crate::error::{CompileError, CompileResult};
use crate::parser::parse_field_code;

/// One extracted conditional: condition, value trees and a back-reference to
/// the field code it came from. Recomputed per analysis pass, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub id: String,
    pub condition: Expr,
    pub when_true: Expr,
    pub when_false: Option<Expr>,
    /// Id of the originating field code
    pub source_id: String,
}

/// An `if` field code the extraction pass could not turn into a branch.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFieldCode {
    pub id: String,
    pub reason: String,
}

/// Result of one extraction pass over a batch of field codes.
#[derive(Debug, Clone, Default)]
pub struct BranchExtraction {
    pub branches: Vec<Branch>,
    pub skipped: Vec<SkippedFieldCode>,
}

/// Extract one branch per `if` field code whose parsed root is a conditional.
///
/// Ids are `cond_1`, `cond_2`, ... strictly in the order the codes are
/// supplied; codes of other categories are not candidates and are ignored.
pub fn extract_branches(codes: &[FieldCode]) -> BranchExtraction {
    let mut result = BranchExtraction::default();
    for code in codes {
        if code.category != FieldCategory::If {
            continue;
        }
        match parse_field_code(code) {
            Ok(Expr::Conditional {
                condition,
                when_true,
                when_false,
            }) => {
                let id = format!("cond_{}", result.branches.len() + 1);
                debug!(%id, source = %code.id, "extracted conditional branch");
                result.branches.push(Branch {
                    id,
                    condition: *condition,
                    when_true: *when_true,
                    when_false: when_false.map(|b| *b),
                    source_id: code.id.clone(),
                });
            }
            Ok(other) => {
                let reason = format!("parsed to a non-conditional {other:?}");
                warn!(source = %code.id, %reason, "skipping if field code");
                result.skipped.push(SkippedFieldCode {
                    id: code.id.clone(),
                    reason,
                });
            }
            Err(err) => {
                let reason = err.to_string();
                warn!(source = %code.id, %reason, "skipping if field code");
                result.skipped.push(SkippedFieldCode {
                    id: code.id.clone(),
                    reason,
                });
            }
        }
    }
    result
}

/// Flatten a branch and its nested conditionals in pre-order: the branch
/// itself, then the true-value subtree, then the false-value subtree.
///
/// The sequence is lazy and finite but not restartable. Nesting beyond
/// `max_depth` yields one [`CompileError::DepthExceeded`] and ends the
/// iteration.
pub fn flatten_nested(branch: &Branch, max_depth: usize) -> FlattenNested {
    FlattenNested {
        stack: vec![(branch.clone(), 0)],
        max_depth,
        exhausted: false,
    }
}

/// Iterator returned by [`flatten_nested`].
#[derive(Debug)]
pub struct FlattenNested {
    stack: Vec<(Branch, usize)>,
    max_depth: usize,
    exhausted: bool,
}

impl Iterator for FlattenNested {
    type Item = CompileResult<Branch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let (branch, depth) = self.stack.pop()?;
        if depth > self.max_depth {
            self.exhausted = true;
            return Some(Err(CompileError::DepthExceeded {
                max: self.max_depth,
            }));
        }
        // push false first so the true side is emitted next
        if let Some(nested) = branch
            .when_false
            .as_ref()
            .and_then(|expr| nested_branch(&branch, expr, "nested_false"))
        {
            self.stack.push((nested, depth + 1));
        }
        if let Some(nested) = nested_branch(&branch, &branch.when_true, "nested_true") {
            self.stack.push((nested, depth + 1));
        }
        Some(Ok(branch))
    }
}

/// Derive a child branch when the value subtree is itself a conditional.
fn nested_branch(parent: &Branch, expr: &Expr, side: &str) -> Option<Branch> {
    match expr {
        Expr::Conditional {
            condition,
            when_true,
            when_false,
        } => Some(Branch {
            id: format!("{}_{}", parent.id, side),
            condition: (**condition).clone(),
            when_true: (**when_true).clone(),
            when_false: when_false.as_deref().cloned(),
            source_id: parent.source_id.clone(),
        }),
        _ => None,
    }
}

/// A group of branches converts to a switch only when every condition tests
/// the same field: the first condition must be a binary comparison whose left
/// operand is a field reference, and all other conditions must compare that
/// exact field. Any other condition shape disqualifies the group.
pub fn can_convert_to_switch(branches: &[Branch]) -> bool {
    if branches.len() < 2 {
        return false;
    }
    let Some(tested) = tested_field(&branches[0].condition) else {
        return false;
    };
    branches[1..]
        .iter()
        .all(|branch| tested_field(&branch.condition) == Some(tested))
}

fn tested_field(condition: &Expr) -> Option<&str> {
    match condition {
        Expr::Binary { left, .. } => left.as_field_name(),
        _ => None,
    }
}
