//! Expression generation
//!
//! Renders an expression tree into VB report-expression text. Generation is
//! pure and total: every node kind renders deterministically, and the
//! top-level entry point guarantees the `=` expression marker.

pub mod optimizer;

use crate::ast::{Expr, Literal};

/// Marker prefixing every top-level report expression
pub const EXPRESSION_MARKER: char = '=';

/// Rendering of a null literal and of a missing false branch
pub const NULL_SENTINEL: &str = "Nothing";

/// Operator spellings normalized at emission; anything absent passes through.
const OPERATOR_TABLE: &[(&str, &str)] = &[
    ("and", "And"),
    ("or", "Or"),
    ("not", "Not"),
    ("%", "Mod"),
    ("mod", "Mod"),
];

/// Portable function vocabulary mapped to target built-ins; unknown names
/// pass through verbatim.
const FUNCTION_TABLE: &[(&str, &str)] = &[
    ("isnull", "IsNothing"),
    ("coalesce", "Coalesce"),
    ("concat", "Concat"),
    ("length", "Len"),
    ("len", "Len"),
    ("substring", "Mid"),
    ("substr", "Mid"),
    ("upper", "UCase"),
    ("lower", "LCase"),
    ("trim", "Trim"),
    ("now", "Now"),
    ("getdate", "Now"),
    ("today", "Today"),
    ("year", "Year"),
    ("month", "Month"),
    ("day", "Day"),
    ("format", "Format"),
];

/// Render a full top-level expression, prefixing the marker if absent.
pub fn generate_expression(expr: &Expr) -> String {
    let body = generate(expr);
    if body.starts_with(EXPRESSION_MARKER) {
        body
    } else {
        format!("{EXPRESSION_MARKER}{body}")
    }
}

/// Render one tree node (and its subtree) without the marker.
pub fn generate(expr: &Expr) -> String {
    match expr {
        Expr::Literal(lit) => generate_literal(lit),
        Expr::FieldRef(name) => format!("Fields!{}.Value", name_or_unknown(name)),
        Expr::ParamRef(name) => format!("Parameters!{}.Value", name_or_unknown(name)),
        Expr::GlobalRef(name) => format!("Globals!{}", name_or_unknown(name)),
        Expr::Binary { op, left, right } => format!(
            "({} {} {})",
            generate(left),
            map_operator(op),
            generate(right)
        ),
        Expr::Unary { op, operand } => {
            let op = op
                .as_deref()
                .map(map_operator)
                .unwrap_or_else(|| "Not".to_string());
            format!("{} {}", op, generate(operand))
        }
        Expr::Call { name, args } => {
            let rendered: Vec<String> = args.iter().map(generate).collect();
            format!("{}({})", map_function(name), rendered.join(", "))
        }
        Expr::Conditional {
            condition,
            when_true,
            when_false,
        } => {
            let when_false = when_false
                .as_deref()
                .map(generate)
                .unwrap_or_else(|| NULL_SENTINEL.to_string());
            format!(
                "IIf({}, {}, {})",
                generate(condition),
                generate(when_true),
                when_false
            )
        }
        Expr::Aggregate {
            function,
            target,
            scope,
        } => match scope {
            Some(scope) => format!("{}({}, {})", function, generate(target), quote_string(scope)),
            None => format!("{}({})", function, generate(target)),
        },
    }
}

fn generate_literal(literal: &Literal) -> String {
    match literal {
        Literal::Null => NULL_SENTINEL.to_string(),
        Literal::String(s) => quote_string(s),
        Literal::Boolean(true) => "True".to_string(),
        Literal::Boolean(false) => "False".to_string(),
        Literal::Date(date) => format!("#{}#", date.format("%Y-%m-%d")),
        Literal::Number(n) => format_number(*n),
    }
}

/// A missing reference name renders as `Unknown` rather than failing.
fn name_or_unknown(name: &str) -> &str {
    if name.is_empty() {
        "Unknown"
    } else {
        name
    }
}

fn quote_string(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn map_operator(op: &str) -> String {
    OPERATOR_TABLE
        .iter()
        .find(|(from, _)| from.eq_ignore_ascii_case(op))
        .map(|(_, to)| (*to).to_string())
        .unwrap_or_else(|| op.to_string())
}

fn map_function(name: &str) -> String {
    FUNCTION_TABLE
        .iter()
        .find(|(from, _)| from.eq_ignore_ascii_case(name))
        .map(|(_, to)| (*to).to_string())
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_string_quote_doubling() {
        assert_eq!(generate(&Expr::string("O'Brien")), "\"O'Brien\"");
        assert_eq!(generate(&Expr::string("He said \"hi\"")), "\"He said \"\"hi\"\"\"");
    }

    #[test]
    fn test_literal_tokens() {
        assert_eq!(generate(&Expr::boolean(true)), "True");
        assert_eq!(generate(&Expr::boolean(false)), "False");
        assert_eq!(generate(&Expr::null()), "Nothing");
        assert_eq!(generate(&Expr::number(42.0)), "42");
        assert_eq!(generate(&Expr::number(1.5)), "1.5");
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(generate(&Expr::Literal(Literal::Date(date))), "#2024-01-15#");
    }

    #[test]
    fn test_references() {
        assert_eq!(generate(&Expr::field("Customer")), "Fields!Customer.Value");
        assert_eq!(
            generate(&Expr::ParamRef("Region".to_string())),
            "Parameters!Region.Value"
        );
        assert_eq!(
            generate(&Expr::GlobalRef("PageNumber".to_string())),
            "Globals!PageNumber"
        );
        // a missing name renders as Unknown rather than failing
        assert_eq!(generate(&Expr::field("")), "Fields!Unknown.Value");
        assert_eq!(generate(&Expr::GlobalRef(String::new())), "Globals!Unknown");
    }

    #[test]
    fn test_operator_mapping() {
        assert_eq!(
            generate(&Expr::binary("and", Expr::field("A"), Expr::field("B"))),
            "(Fields!A.Value And Fields!B.Value)"
        );
        assert_eq!(
            generate(&Expr::binary("%", Expr::field("A"), Expr::number(2.0))),
            "(Fields!A.Value Mod 2)"
        );
        assert_eq!(
            generate(&Expr::binary("=", Expr::field("A"), Expr::number(1.0))),
            "(Fields!A.Value = 1)"
        );
    }

    #[test]
    fn test_unary_defaults_to_negation() {
        assert_eq!(generate(&Expr::negate(Expr::field("Active"))), "Not Fields!Active.Value");
    }

    #[test]
    fn test_function_translation() {
        assert_eq!(
            generate(&Expr::call("UPPER", vec![Expr::field("Name")])),
            "UCase(Fields!Name.Value)"
        );
        assert_eq!(
            generate(&Expr::call("getdate", vec![])),
            "Now()"
        );
        // unknown names pass through verbatim
        assert_eq!(
            generate(&Expr::call("MyHelper", vec![Expr::number(1.0)])),
            "MyHelper(1)"
        );
    }

    #[test]
    fn test_conditional_renders_sentinel_for_missing_branch() {
        let expr = Expr::conditional(
            Expr::binary("=", Expr::field("A"), Expr::number(1.0)),
            Expr::string("yes"),
            None,
        );
        assert_eq!(
            generate(&expr),
            "IIf((Fields!A.Value = 1), \"yes\", Nothing)"
        );
    }

    #[test]
    fn test_aggregate_scope_is_quoted() {
        let expr = Expr::Aggregate {
            function: "Sum".to_string(),
            target: Box::new(Expr::field("Amount")),
            scope: Some("Orders".to_string()),
        };
        assert_eq!(generate(&expr), "Sum(Fields!Amount.Value, \"Orders\")");
    }

    #[test]
    fn test_marker_postcondition() {
        assert_eq!(
            generate_expression(&Expr::field("Customer")),
            "=Fields!Customer.Value"
        );
    }

    #[test]
    fn test_generation_is_deterministic() {
        let expr = Expr::conditional(
            Expr::binary("And", Expr::field("A"), Expr::field("B")),
            Expr::call("Len", vec![Expr::field("Name")]),
            Some(Expr::null()),
        );
        assert_eq!(generate(&expr), generate(&expr.clone()));
    }
}
