//! Text-level rewrite passes over generated expressions
//!
//! Passes run in a fixed order, repeated until the text stabilizes, and
//! never change semantics. Structural guarantees live in the tree; these
//! rewrites are a defensive secondary layer over the emitted text.

use std::sync::OnceLock;

use regex::Regex;

use super::NULL_SENTINEL;

fn redundant_parens() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(\(([^()]*)\)\)").expect("hard-coded pattern"))
}

fn double_negation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bNot\s+Not\b\s*").expect("hard-coded pattern"))
}

/// Apply all rewrite passes, iterating the pipeline to a fixed point so a
/// rewrite that uncovers further rewrites (a fold surfacing a nested
/// constant conditional) is picked up by the next round. Every pass only
/// ever shrinks the text, so the loop terminates. The `=` marker, if
/// present, is preserved.
pub fn optimize(expression: &str) -> String {
    let (marker, body) = match expression.strip_prefix('=') {
        Some(rest) => ("=", rest),
        None => ("", expression),
    };
    let mut current = body.to_string();
    loop {
        let collapsed = collapse_redundant_parens(&current);
        let negated = collapse_double_negation(&collapsed);
        let folded = fold_constant_conditions(&negated);
        let simplified = simplify_null_checks(&folded);
        if simplified == current {
            break;
        }
        current = simplified;
    }
    format!("{marker}{current}")
}

/// `((X))` becomes `(X)`, iterated to a fixed point. Each iteration strictly
/// shrinks the text, so termination is guaranteed.
fn collapse_redundant_parens(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = redundant_parens().replace_all(&current, "($1)").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// `Not Not X` becomes `X` in a single case-insensitive pass. Longer
/// negation chains are not rewritten recursively.
fn collapse_double_negation(input: &str) -> String {
    double_negation().replace_all(input, "").into_owned()
}

/// Collapse `IIf(True, a, b)` to `a` and `IIf(False, a, b)` to `b`.
///
/// One scan per call: a branch substituted by a fold is not re-scanned in
/// place, it is picked up by the next pipeline round. The inside of a kept
/// (non-constant) conditional is scanned within the same call. Argument
/// splitting respects nested parentheses and quoted strings.
fn fold_constant_conditions(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = find_ternary(rest) {
        out.push_str(&rest[..pos]);
        let call = &rest[pos..];
        match split_call_args(call) {
            Some((args, consumed)) if args.len() >= 2 => {
                let cond = args[0].trim();
                if cond.eq_ignore_ascii_case("true") {
                    out.push_str(args[1].trim());
                    rest = &call[consumed..];
                } else if cond.eq_ignore_ascii_case("false") {
                    out.push_str(args.get(2).map(|a| a.trim()).unwrap_or(NULL_SENTINEL));
                    rest = &call[consumed..];
                } else {
                    // keep the call head and keep scanning inside it
                    out.push_str(&call[..4]);
                    rest = &call[4..];
                }
            }
            _ => {
                out.push_str(&call[..4]);
                rest = &call[4..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Reserved pass for null-check simplification.
fn simplify_null_checks(input: &str) -> String {
    input.to_string()
}

/// Position of the next `IIf(` occurrence not preceded by a word character.
fn find_ternary(text: &str) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    let mut from = 0;
    while let Some(rel) = lower[from..].find("iif(") {
        let pos = from + rel;
        let preceded_by_word = pos > 0 && {
            let b = lower.as_bytes()[pos - 1];
            b.is_ascii_alphanumeric() || b == b'_'
        };
        if !preceded_by_word {
            return Some(pos);
        }
        from = pos + 4;
    }
    None
}

/// Split `Name(a, b, c)…` into top-level argument slices and the byte length
/// of the whole call. Returns `None` when the parentheses never balance.
fn split_call_args(call: &str) -> Option<(Vec<&str>, usize)> {
    let open = call.find('(')?;
    let bytes = call.as_bytes();
    let mut depth = 1usize;
    let mut in_string = false;
    let mut args = Vec::new();
    let mut arg_start = open + 1;
    let mut i = open + 1;
    while i < call.len() {
        match bytes[i] {
            b'"' => in_string = !in_string,
            b'(' if !in_string => depth += 1,
            b')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    args.push(&call[arg_start..i]);
                    return Some((args, i + 1));
                }
            }
            b',' if !in_string && depth == 1 => {
                args.push(&call[arg_start..i]);
                arg_start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redundant_parens_collapse_to_single() {
        assert_eq!(optimize("(((X)))"), "(X)");
        assert_eq!(optimize("((X))"), "(X)");
        assert_eq!(optimize("(X)"), "(X)");
    }

    #[test]
    fn test_meaningful_parens_survive() {
        assert_eq!(optimize("((A) + (B))"), "((A) + (B))");
    }

    #[test]
    fn test_double_negation() {
        assert_eq!(optimize("Not Not Active"), "Active");
        assert_eq!(optimize("not NOT Active"), "Active");
        // an odd chain leaves one negation, stable across further rounds
        assert_eq!(optimize("Not Not Not Active"), "Not Active");
    }

    #[test]
    fn test_negation_of_nothing_is_untouched() {
        assert_eq!(optimize("Not Nothing"), "Not Nothing");
    }

    #[test]
    fn test_constant_condition_folding() {
        assert_eq!(optimize("IIf(True, A, B)"), "A");
        assert_eq!(optimize("IIf(False, A, B)"), "B");
        assert_eq!(optimize("iif(TRUE, A, B)"), "A");
        // a missing false branch folds to the null sentinel
        assert_eq!(optimize("IIf(False, A)"), "Nothing");
        // non-constant conditions are kept
        assert_eq!(optimize("IIf(X, A, B)"), "IIf(X, A, B)");
    }

    #[test]
    fn test_folding_respects_quotes_and_nesting() {
        assert_eq!(
            optimize("IIf(True, \"a, b\", C)"),
            "\"a, b\""
        );
        // a fold surfacing another constant conditional is picked up by the
        // next pipeline round
        assert_eq!(optimize("IIf(False, A, IIf(True, B, C))"), "B");
        // inside a kept conditional, constants still fold
        assert_eq!(
            optimize("IIf(X, IIf(True, A, B), C)"),
            "IIf(X, A, C)"
        );
    }

    #[test]
    fn test_marker_is_preserved() {
        assert_eq!(optimize("=Not Not Active"), "=Active");
    }

    #[test]
    fn test_idempotence() {
        for source in [
            "(((X)))",
            "Not Not Active",
            "Not Not Not Active",
            "IIf(X, A, B)",
            "IIf(False, A, IIf(True, B, C))",
            "IIf(True, Not Not A, B)",
            "=Fields!Customer.Value",
            "((A) + (B))",
            "Sum(Fields!Amount.Value, \"Orders\")",
        ] {
            let once = optimize(source);
            assert_eq!(optimize(&once), once, "not idempotent for {source}");
        }
    }
}
