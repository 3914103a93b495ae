//! nom grammar for field-code expressions
//!
//! Covers literals, the three reference kinds, binary operators with
//! conventional precedence, unary negation, function calls, conditionals and
//! aggregate calls. The grammar also accepts generator output (scoped
//! references, `IIf`, `#date#` literals), so generating and re-parsing an
//! expression round-trips.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{alpha1, alphanumeric1, anychar, char, digit1, multispace0, none_of, one_of},
    combinator::{map, not, opt, recognize, value, verify},
    error::{ErrorKind, ParseError, VerboseError},
    multi::{fold_many0, many0, many1, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
    Finish, IResult,
};

use chrono::NaiveDate;

use crate::ast::{Expr, Literal};
use crate::error::{CompileError, CompileResult};

pub(crate) type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Aggregate keywords recognized as `Aggregate` nodes rather than plain calls
const AGGREGATE_FUNCTIONS: &[&str] = &["Sum", "Avg", "Count", "Min", "Max", "First", "Last"];

/// Reserved names that resolve to globals when used bare
const GLOBAL_NAMES: &[&str] = &["PageNumber", "TotalPages", "ExecutionTime", "ReportName"];

/// Parse a complete expression, rejecting trailing input.
///
/// A leading `=` expression marker is accepted and skipped.
pub fn parse_expression(source: &str) -> CompileResult<Expr> {
    let trimmed = source.trim_start();
    let body = trimmed.strip_prefix('=').unwrap_or(trimmed);
    match or_expr(body).finish() {
        Ok((rest, expr)) if rest.trim().is_empty() => Ok(expr),
        Ok((rest, _)) => Err(CompileError::Syntax {
            message: format!("unexpected trailing input `{}`", rest.trim()),
            expression: source.to_string(),
            offset: Some(body.len().saturating_sub(rest.len())),
        }),
        Err(err) => Err(syntax_error(source, body, err)),
    }
}

/// Convert a nom failure into the caller-facing syntax error.
pub(crate) fn syntax_error(expression: &str, body: &str, err: VerboseError<&str>) -> CompileError {
    let (offset, near) = match err.errors.first() {
        Some((remaining, _)) => (
            Some(body.len().saturating_sub(remaining.len())),
            remaining.chars().take(20).collect::<String>(),
        ),
        None => (None, String::new()),
    };
    CompileError::Syntax {
        message: format!("invalid syntax near `{near}`"),
        expression: expression.to_string(),
        offset,
    }
}

/// Skip leading whitespace before the wrapped parser.
pub(crate) fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> PResult<'a, O>
where
    F: FnMut(&'a str) -> PResult<'a, O>,
{
    preceded(multispace0, inner)
}

/// Case-insensitive keyword with a word boundary after it.
pub(crate) fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    terminated(
        tag_no_case(kw),
        not(verify(anychar, |c: &char| c.is_alphanumeric() || *c == '_')),
    )
}

/// Left-associative binary level: `operand (operator operand)*`.
fn binary_level<'a>(
    mut operand: impl FnMut(&'a str) -> PResult<'a, Expr>,
    mut operator: impl FnMut(&'a str) -> PResult<'a, String>,
) -> impl FnMut(&'a str) -> PResult<'a, Expr> {
    move |input| {
        let (mut rest, mut acc) = operand(input)?;
        loop {
            match operator(rest) {
                Ok((after_op, op)) => {
                    let (after_rhs, rhs) = operand(after_op)?;
                    acc = Expr::Binary {
                        op,
                        left: Box::new(acc),
                        right: Box::new(rhs),
                    };
                    rest = after_rhs;
                }
                Err(nom::Err::Error(_)) => return Ok((rest, acc)),
                Err(err) => return Err(err),
            }
        }
    }
}

fn or_expr(input: &str) -> PResult<'_, Expr> {
    binary_level(and_expr, map(ws(keyword("Or")), str::to_string))(input)
}

fn and_expr(input: &str) -> PResult<'_, Expr> {
    binary_level(cmp_expr, map(ws(keyword("And")), str::to_string))(input)
}

fn cmp_expr(input: &str) -> PResult<'_, Expr> {
    binary_level(add_expr, map(ws(comparison_operator), str::to_string))(input)
}

pub(crate) fn comparison_operator(input: &str) -> PResult<'_, &str> {
    alt((tag("<="), tag(">="), tag("<>"), tag("="), tag("<"), tag(">")))(input)
}

fn add_expr(input: &str) -> PResult<'_, Expr> {
    binary_level(mul_expr, map(ws(recognize(one_of("+-&"))), str::to_string))(input)
}

fn mul_expr(input: &str) -> PResult<'_, Expr> {
    binary_level(
        unary_expr,
        alt((
            map(ws(recognize(one_of("*/%"))), str::to_string),
            map(ws(keyword("Mod")), str::to_string),
        )),
    )(input)
}

fn unary_expr(input: &str) -> PResult<'_, Expr> {
    ws(alt((
        map(preceded(keyword("Not"), unary_expr), |operand| Expr::Unary {
            op: None,
            operand: Box::new(operand),
        }),
        // a signed number is a literal, not a negation of one
        map(number_literal, |n| Expr::Literal(Literal::Number(n))),
        map(preceded(char('-'), unary_expr), |operand| Expr::Unary {
            op: Some("-".to_string()),
            operand: Box::new(operand),
        }),
        primary,
    )))(input)
}

fn primary(input: &str) -> PResult<'_, Expr> {
    ws(alt((
        paren_expr,
        map(date_literal, |d| Expr::Literal(Literal::Date(d))),
        map(string_literal, |s| Expr::Literal(Literal::String(s))),
        boolean_literal,
        null_literal,
        scoped_reference,
        chevron_reference,
        call_expr,
        bare_reference,
    )))(input)
}

fn paren_expr(input: &str) -> PResult<'_, Expr> {
    delimited(ws(char('(')), or_expr, ws(char(')')))(input)
}

fn boolean_literal(input: &str) -> PResult<'_, Expr> {
    alt((
        value(Expr::Literal(Literal::Boolean(true)), keyword("True")),
        value(Expr::Literal(Literal::Boolean(false)), keyword("False")),
    ))(input)
}

fn null_literal(input: &str) -> PResult<'_, Expr> {
    value(Expr::Literal(Literal::Null), keyword("Nothing"))(input)
}

/// Quoted string with doubled-quote escaping: `"O""Brien"` reads `O"Brien`.
pub(crate) fn string_literal(input: &str) -> PResult<'_, String> {
    delimited(
        char('"'),
        fold_many0(
            alt((value('"', tag("\"\"")), none_of("\""))),
            String::new,
            |mut acc, c| {
                acc.push(c);
                acc
            },
        ),
        char('"'),
    )(input)
}

pub(crate) fn number_literal(input: &str) -> PResult<'_, f64> {
    let (rest, text) = recognize(|i| {
        let (i, _) = opt(char('-'))(i)?;
        let (i, _) = digit1(i)?;
        let (i, _) = opt(preceded(char('.'), digit1))(i)?;
        Ok((i, ()))
    })(input)?;
    match text.parse::<f64>() {
        Ok(n) => Ok((rest, n)),
        Err(_) => Err(nom::Err::Error(VerboseError::from_error_kind(
            input,
            ErrorKind::Float,
        ))),
    }
}

/// Date-only literal wrapped in `#` delimiters: `#2024-01-15#`.
fn date_literal(input: &str) -> PResult<'_, NaiveDate> {
    let (rest, text) = delimited(char('#'), recognize(many1(none_of("#"))), char('#'))(input)?;
    match NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d") {
        Ok(date) => Ok((rest, date)),
        Err(_) => Err(nom::Err::Error(VerboseError::from_error_kind(
            input,
            ErrorKind::Verify,
        ))),
    }
}

pub(crate) fn identifier(input: &str) -> PResult<'_, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        str::to_string,
    )(input)
}

/// Scope-qualified references as the generator emits them.
fn scoped_reference(input: &str) -> PResult<'_, Expr> {
    alt((
        map(
            delimited(tag("Fields!"), identifier, tag(".Value")),
            Expr::FieldRef,
        ),
        map(
            delimited(tag("Parameters!"), identifier, tag(".Value")),
            Expr::ParamRef,
        ),
        map(preceded(tag("Globals!"), identifier), Expr::GlobalRef),
    ))(input)
}

/// Chevron-wrapped merge reference: `«Customer»`.
pub(crate) fn chevron_reference(input: &str) -> PResult<'_, Expr> {
    map(delimited(char('«'), identifier, char('»')), Expr::FieldRef)(input)
}

/// Bare identifier: a reserved global name resolves to a global reference,
/// anything else is a field reference.
pub(crate) fn bare_reference(input: &str) -> PResult<'_, Expr> {
    map(identifier, |name| {
        if GLOBAL_NAMES.iter().any(|g| g.eq_ignore_ascii_case(&name)) {
            Expr::GlobalRef(name)
        } else {
            Expr::FieldRef(name)
        }
    })(input)
}

fn is_aggregate_name(name: &str) -> bool {
    AGGREGATE_FUNCTIONS.iter().any(|f| f.eq_ignore_ascii_case(name))
}

/// `Name(args...)`, classified into conditional, aggregate or plain call.
fn call_expr(input: &str) -> PResult<'_, Expr> {
    let (rest, name) = identifier(input)?;
    let (rest, args) = delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), or_expr),
        ws(char(')')),
    )(rest)?;

    if name.eq_ignore_ascii_case("iif") || name.eq_ignore_ascii_case("if") {
        let mut it = args.into_iter();
        return match (it.next(), it.next(), it.next(), it.next()) {
            (Some(condition), Some(when_true), when_false, None) => Ok((
                rest,
                Expr::Conditional {
                    condition: Box::new(condition),
                    when_true: Box::new(when_true),
                    when_false: when_false.map(Box::new),
                },
            )),
            _ => Err(nom::Err::Failure(VerboseError::from_error_kind(
                input,
                ErrorKind::Verify,
            ))),
        };
    }

    if is_aggregate_name(&name) {
        let mut it = args.into_iter();
        return match (it.next(), it.next(), it.next()) {
            (Some(target), None, None) => Ok((
                rest,
                Expr::Aggregate {
                    function: name,
                    target: Box::new(target),
                    scope: None,
                },
            )),
            (Some(target), Some(Expr::Literal(Literal::String(scope))), None) => Ok((
                rest,
                Expr::Aggregate {
                    function: name,
                    target: Box::new(target),
                    scope: Some(scope),
                },
            )),
            (first, second, third) => {
                // unusual arity for an aggregate, keep it as a plain call
                let args = [first, second, third]
                    .into_iter()
                    .flatten()
                    .chain(it)
                    .collect();
                Ok((rest, Expr::Call { name, args }))
            }
        };
    }

    Ok((rest, Expr::Call { name, args }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_literal_doubled_quotes() {
        assert_eq!(
            string_literal("\"O\"\"Brien\"").unwrap(),
            ("", "O\"Brien".to_string())
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_expression("42").unwrap(), Expr::number(42.0));
        assert_eq!(parse_expression("-1.5").unwrap(), Expr::number(-1.5));
        assert_eq!(parse_expression("True").unwrap(), Expr::boolean(true));
        assert_eq!(parse_expression("false").unwrap(), Expr::boolean(false));
        assert_eq!(parse_expression("Nothing").unwrap(), Expr::null());
        assert_eq!(
            parse_expression("#2024-01-15#").unwrap(),
            Expr::Literal(Literal::Date(
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
            ))
        );
    }

    #[test]
    fn test_reference_kinds() {
        assert_eq!(
            parse_expression("Fields!Customer.Value").unwrap(),
            Expr::FieldRef("Customer".to_string())
        );
        assert_eq!(
            parse_expression("Parameters!Region.Value").unwrap(),
            Expr::ParamRef("Region".to_string())
        );
        assert_eq!(
            parse_expression("Globals!PageNumber").unwrap(),
            Expr::GlobalRef("PageNumber".to_string())
        );
        assert_eq!(
            parse_expression("«Customer»").unwrap(),
            Expr::FieldRef("Customer".to_string())
        );
        // bare reserved name resolves to a global, anything else to a field
        assert_eq!(
            parse_expression("TotalPages").unwrap(),
            Expr::GlobalRef("TotalPages".to_string())
        );
        assert_eq!(
            parse_expression("Total").unwrap(),
            Expr::FieldRef("Total".to_string())
        );
    }

    #[test]
    fn test_precedence_and_associativity() {
        // a + b * c parses the multiplication first
        let expr = parse_expression("A + B * C").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                "+",
                Expr::field("A"),
                Expr::binary("*", Expr::field("B"), Expr::field("C")),
            )
        );
        // comparisons bind tighter than And/Or
        let expr = parse_expression("A = 1 Or B = 2").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                "Or",
                Expr::binary("=", Expr::field("A"), Expr::number(1.0)),
                Expr::binary("=", Expr::field("B"), Expr::number(2.0)),
            )
        );
        // left associativity
        let expr = parse_expression("A - B - C").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                "-",
                Expr::binary("-", Expr::field("A"), Expr::field("B")),
                Expr::field("C"),
            )
        );
    }

    #[test]
    fn test_keyword_operators_respect_word_boundaries() {
        // "Orders" is one identifier, not `Or` + `ders`
        assert_eq!(
            parse_expression("Orders").unwrap(),
            Expr::FieldRef("Orders".to_string())
        );
        assert!(parse_expression("A Orbit").is_err());
    }

    #[test]
    fn test_unary() {
        assert_eq!(
            parse_expression("Not Active").unwrap(),
            Expr::negate(Expr::field("Active"))
        );
        assert_eq!(
            parse_expression("- Fields!Total.Value").unwrap(),
            Expr::Unary {
                op: Some("-".to_string()),
                operand: Box::new(Expr::FieldRef("Total".to_string())),
            }
        );
    }

    #[test]
    fn test_calls_and_conditionals() {
        assert_eq!(
            parse_expression("Len(Fields!Name.Value)").unwrap(),
            Expr::call("Len", vec![Expr::FieldRef("Name".to_string())])
        );
        assert_eq!(parse_expression("Now()").unwrap(), Expr::call("Now", vec![]));
        assert_eq!(
            parse_expression("IIf(A = 1, \"yes\", \"no\")").unwrap(),
            Expr::conditional(
                Expr::binary("=", Expr::field("A"), Expr::number(1.0)),
                Expr::string("yes"),
                Some(Expr::string("no")),
            )
        );
        // a conditional needs two or three arguments
        assert!(parse_expression("IIf(A)").is_err());
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(
            parse_expression("Sum(Fields!Amount.Value)").unwrap(),
            Expr::Aggregate {
                function: "Sum".to_string(),
                target: Box::new(Expr::FieldRef("Amount".to_string())),
                scope: None,
            }
        );
        assert_eq!(
            parse_expression("Sum(Fields!Amount.Value, \"Orders\")").unwrap(),
            Expr::Aggregate {
                function: "Sum".to_string(),
                target: Box::new(Expr::FieldRef("Amount".to_string())),
                scope: Some("Orders".to_string()),
            }
        );
    }

    #[test]
    fn test_marker_is_skipped() {
        assert_eq!(
            parse_expression("=Fields!Customer.Value").unwrap(),
            Expr::FieldRef("Customer".to_string())
        );
    }

    #[test]
    fn test_trailing_input_is_an_error_with_offset() {
        let err = parse_expression("1 + 2 !!").unwrap_err();
        match err {
            CompileError::Syntax { offset, .. } => assert_eq!(offset, Some(5)),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_failure_never_yields_partial_tree() {
        assert!(parse_expression("1 +").is_err());
        assert!(parse_expression("(A = 1").is_err());
        assert!(parse_expression("\"unterminated").is_err());
    }
}
