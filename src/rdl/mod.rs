//! RDL 2008/01 document model and synthesis
//!
//! Namespace identifiers and formatting helpers are stateless pure functions;
//! the element tree and the report builder live in the submodules.

pub mod document;
pub mod synthesizer;

/// Primary report-definition namespace (RDL 2008/01)
pub const NS_REPORTDEFINITION: &str =
    "http://schemas.microsoft.com/sqlserver/reporting/2008/01/reportdefinition";

/// Auxiliary report-designer namespace, conventionally prefixed `rd`
pub const NS_DESIGNER: &str =
    "http://schemas.microsoft.com/SQLServer/reporting/reportdesigner";

/// Render a physical size as a fixed-point inch value, e.g. `6.50in`.
pub fn format_size(inches: f64) -> String {
    format!("{inches:.2}in")
}

/// Strip code points the report schema does not allow in text content.
///
/// Legal ranges: tab, LF, CR, 0x20-0xD7FF and 0xE000-0xFFFD. Applied to every
/// free-text value before it enters the document, never after.
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .filter(|&c| {
            matches!(c, '\t' | '\n' | '\r')
                || ('\u{20}'..='\u{D7FF}').contains(&c)
                || ('\u{E000}'..='\u{FFFD}').contains(&c)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_is_fixed_point_inches() {
        assert_eq!(format_size(6.5), "6.50in");
        assert_eq!(format_size(0.25), "0.25in");
        assert_eq!(format_size(11.0), "11.00in");
    }

    #[test]
    fn test_sanitize_strips_form_feed_only() {
        let input = "Quarterly\u{0C} Report";
        assert_eq!(sanitize_text(input), "Quarterly Report");
    }

    #[test]
    fn test_sanitize_keeps_legal_whitespace_and_text() {
        let input = "line one\n\tline two\r\n";
        assert_eq!(sanitize_text(input), input);
    }

    #[test]
    fn test_sanitize_strips_control_and_noncharacter_points() {
        assert_eq!(sanitize_text("a\u{0}b\u{1F}c"), "abc");
        assert_eq!(sanitize_text("ok\u{FFFE}"), "ok");
        // supplementary-plane points are outside the legal ranges
        assert_eq!(sanitize_text("x\u{10000}y"), "xy");
    }
}
