//! Field-code front end
//!
//! Dispatches on the category assigned by the extraction stage and hands the
//! expression-shaped payloads to the nom grammar in [`expression`]. A failure
//! aborts only the field code it belongs to; batch callers collect per-item
//! results.

pub mod expression;

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::multispace1,
    combinator::{map, opt},
    sequence::preceded,
    Finish,
};
use tracing::debug;

use crate::ast::{Expr, FieldCategory, FieldCode, Literal};
use crate::error::{CompileError, CompileResult};
use expression::{
    bare_reference, chevron_reference, comparison_operator, identifier, number_literal,
    string_literal, syntax_error, ws, PResult,
};

pub use expression::parse_expression;

/// Parse one field code into an expression tree.
///
/// Recognized categories with an unrecognizable shape fail with a syntax
/// error; an `Unsupported` category fails with the distinct
/// unsupported-construct error carrying category and raw text.
pub fn parse_field_code(code: &FieldCode) -> CompileResult<Expr> {
    debug!(id = %code.id, category = %code.category, "parsing field code");
    match code.category {
        FieldCategory::MergeField => parse_merge_field(code),
        FieldCategory::If => parse_if_field(code),
        FieldCategory::PageNumber => Ok(Expr::GlobalRef("PageNumber".to_string())),
        FieldCategory::Date => Ok(Expr::Call {
            name: "Today".to_string(),
            args: Vec::new(),
        }),
        FieldCategory::Unsupported => Err(CompileError::Unsupported {
            category: code.category,
            raw: code.raw.clone(),
        }),
    }
}

/// `MERGEFIELD <name> [\* switches]`; switches are ignored.
fn parse_merge_field(code: &FieldCode) -> CompileResult<Expr> {
    let input = code.raw.trim();
    let parsed = preceded(
        tag_no_case("MERGEFIELD"),
        preceded(multispace1, alt((string_literal, merge_name))),
    )(input)
    .finish();
    match parsed {
        Ok((_, name)) => Ok(Expr::FieldRef(name)),
        Err(err) => Err(syntax_error(&code.raw, input, err)),
    }
}

/// Merge-field name token: everything up to whitespace or a switch.
fn merge_name(input: &str) -> PResult<'_, String> {
    map(
        take_while1(|c: char| !c.is_whitespace() && c != '\\'),
        str::to_string,
    )(input)
}

/// `IF <lhs> <op> <rhs> <true-value> [<false-value>] [\* switches]`.
fn parse_if_field(code: &FieldCode) -> CompileResult<Expr> {
    let input = code.raw.trim();
    match if_directive(input).finish() {
        Ok((rest, expr)) => {
            let rest = rest.trim_start();
            // trailing formatting switches are tolerated, anything else is not
            if rest.is_empty() || rest.starts_with('\\') {
                Ok(expr)
            } else {
                Err(CompileError::Syntax {
                    message: format!("unexpected trailing input `{rest}` in IF directive"),
                    expression: code.raw.clone(),
                    offset: Some(input.len().saturating_sub(rest.len())),
                })
            }
        }
        Err(err) => Err(syntax_error(&code.raw, input, err)),
    }
}

fn if_directive(input: &str) -> PResult<'_, Expr> {
    let (rest, _) = tag_no_case("IF")(input)?;
    let (rest, lhs) = preceded(multispace1, condition_operand)(rest)?;
    let (rest, op) = map(ws(comparison_operator), str::to_string)(rest)?;
    let (rest, rhs) = ws(condition_operand)(rest)?;
    let (rest, when_true) = ws(value_operand)(rest)?;
    let (rest, when_false) = opt(ws(value_operand))(rest)?;
    Ok((
        rest,
        Expr::Conditional {
            condition: Box::new(Expr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            }),
            when_true: Box::new(when_true),
            when_false: when_false.map(Box::new),
        },
    ))
}

/// Condition operands: merge references, quoted strings, numbers or bare
/// identifiers (which name fields).
fn condition_operand(input: &str) -> PResult<'_, Expr> {
    alt((
        chevron_reference,
        map(string_literal, |s| Expr::Literal(Literal::String(s))),
        map(number_literal, |n| Expr::Literal(Literal::Number(n))),
        bare_reference,
    ))(input)
}

/// Value operands: like condition operands, but a bare word is literal text.
fn value_operand(input: &str) -> PResult<'_, Expr> {
    alt((
        chevron_reference,
        map(string_literal, |s| Expr::Literal(Literal::String(s))),
        map(number_literal, |n| Expr::Literal(Literal::Number(n))),
        map(identifier, |s| Expr::Literal(Literal::String(s))),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(category: FieldCategory, raw: &str) -> FieldCode {
        FieldCode::new("fc-test", category, raw)
    }

    #[test]
    fn test_merge_field() {
        let expr = parse_field_code(&code(FieldCategory::MergeField, "MERGEFIELD Customer"))
            .unwrap();
        assert_eq!(expr, Expr::FieldRef("Customer".to_string()));
    }

    #[test]
    fn test_merge_field_quoted_name_and_switches() {
        let expr = parse_field_code(&code(
            FieldCategory::MergeField,
            "MERGEFIELD \"Customer Name\" \\* MERGEFORMAT",
        ))
        .unwrap();
        assert_eq!(expr, Expr::FieldRef("Customer Name".to_string()));
    }

    #[test]
    fn test_merge_field_without_name_is_syntax_error() {
        let err =
            parse_field_code(&code(FieldCategory::MergeField, "MERGEFIELD")).unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }));
    }

    #[test]
    fn test_if_field() {
        let expr = parse_field_code(&code(
            FieldCategory::If,
            "IF «Status» = \"Active\" \"Yes\" \"No\"",
        ))
        .unwrap();
        assert_eq!(
            expr,
            Expr::conditional(
                Expr::binary("=", Expr::field("Status"), Expr::string("Active")),
                Expr::string("Yes"),
                Some(Expr::string("No")),
            )
        );
    }

    #[test]
    fn test_if_field_numeric_comparison_without_false_value() {
        let expr =
            parse_field_code(&code(FieldCategory::If, "IF «Qty» > 100 Bulk")).unwrap();
        assert_eq!(
            expr,
            Expr::conditional(
                Expr::binary(">", Expr::field("Qty"), Expr::number(100.0)),
                Expr::string("Bulk"),
                None,
            )
        );
    }

    #[test]
    fn test_page_number_and_date() {
        assert_eq!(
            parse_field_code(&code(FieldCategory::PageNumber, "PAGE")).unwrap(),
            Expr::GlobalRef("PageNumber".to_string())
        );
        assert_eq!(
            parse_field_code(&code(FieldCategory::Date, "DATE")).unwrap(),
            Expr::call("Today", vec![])
        );
    }

    #[test]
    fn test_unsupported_is_not_a_syntax_error() {
        let err = parse_field_code(&code(FieldCategory::Unsupported, "XE \"entry\""))
            .unwrap_err();
        match err {
            CompileError::Unsupported { category, raw } => {
                assert_eq!(category, FieldCategory::Unsupported);
                assert_eq!(raw, "XE \"entry\"");
            }
            other => panic!("expected unsupported-construct error, got {other:?}"),
        }
    }
}
