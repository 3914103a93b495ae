//! Pipeline orchestration
//!
//! One compiler instance owns the compiled sandbox rules and the page
//! configuration. Per item: parse, generate, sandbox-check, optimize. A batch
//! isolates failures per item; synthesis assembles the final document and is
//! gated by schema validation.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::{extract_branches, flatten_nested, Branch, BranchExtraction};
use crate::ast::FieldCode;
use crate::codegen::optimizer::optimize;
use crate::codegen::generate_expression;
use crate::error::CompileResult;
use crate::parser::parse_field_code;
use crate::rdl::synthesizer::{PageSetup, Rect, ReportBuilder, DEFAULT_FIELD_TYPE};
use crate::sandbox::{Sandbox, SandboxPolicy, SandboxReport};

/// Height of one generated expression row in the body, in inches.
const ROW_HEIGHT: f64 = 0.25;

/// Height of the synthesized title textbox, in inches.
const TITLE_HEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Bound on nested-conditional flattening depth
    pub max_nesting_depth: usize,
    pub page: PageSetup,
    pub sandbox: SandboxPolicy,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: 16,
            page: PageSetup::default(),
            sandbox: SandboxPolicy::default(),
        }
    }
}

/// Final expression for one field code, with its sandbox verdict attached.
///
/// A failed sandbox check does not abort compilation; whether an unsafe
/// document may be persisted is the caller's decision.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    pub source_id: String,
    pub expression: String,
    pub sandbox: SandboxReport,
}

/// Perceived document structure handed over by the external decomposition
/// stages: a title, an optional data-set name and the fields it carries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentStructure {
    pub title: String,
    pub dataset: Option<String>,
    pub fields: Vec<String>,
}

pub struct FieldCodeCompiler {
    config: CompilerConfig,
    sandbox: Sandbox,
}

impl FieldCodeCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        let sandbox = Sandbox::new(&config.sandbox);
        Self { config, sandbox }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile one field code: parse, generate, sandbox-check, optimize.
    pub fn compile(&self, code: &FieldCode) -> CompileResult<CompiledExpression> {
        let tree = parse_field_code(code)?;
        let generated = generate_expression(&tree);
        let sandbox = self.sandbox.check(&generated);
        if !sandbox.ok {
            warn!(
                id = %code.id,
                violations = sandbox.violations.len(),
                "expression violates the sandbox policy"
            );
        }
        let expression = optimize(&generated);
        debug!(id = %code.id, %expression, "compiled field code");
        Ok(CompiledExpression {
            source_id: code.id.clone(),
            expression,
            sandbox,
        })
    }

    /// Compile a batch; a failure aborts only the item it belongs to.
    pub fn compile_batch(
        &self,
        codes: &[FieldCode],
    ) -> Vec<(String, CompileResult<CompiledExpression>)> {
        codes
            .iter()
            .map(|code| (code.id.clone(), self.compile(code)))
            .collect()
    }

    /// Extract conditional branches from a batch and flatten their nesting
    /// under the configured depth bound.
    pub fn analyze_conditionals(&self, codes: &[FieldCode]) -> CompileResult<Vec<Branch>> {
        let BranchExtraction { branches, skipped } = extract_branches(codes);
        if !skipped.is_empty() {
            debug!(skipped = skipped.len(), "conditional extraction skipped codes");
        }
        let mut flattened = Vec::new();
        for branch in &branches {
            for item in flatten_nested(branch, self.config.max_nesting_depth) {
                flattened.push(item?);
            }
        }
        Ok(flattened)
    }

    /// Assemble the output document: title, data set and one textbox per
    /// compiled expression, then validate and serialize.
    pub fn synthesize(
        &self,
        structure: &DocumentStructure,
        compiled: &[CompiledExpression],
    ) -> CompileResult<String> {
        let page = self.config.page;
        let body_width = page.width - page.margin_left - page.margin_right;
        let mut builder = ReportBuilder::new(page);

        let mut top = 0.0;
        if !structure.title.is_empty() {
            builder.add_textbox(
                "ReportTitle",
                &structure.title,
                Rect {
                    left: 0.0,
                    top,
                    width: body_width,
                    height: TITLE_HEIGHT,
                },
            );
            top += TITLE_HEIGHT;
        }

        if let Some(dataset) = &structure.dataset {
            builder.add_dataset(dataset);
            for field in &structure.fields {
                builder.add_field(dataset, field, DEFAULT_FIELD_TYPE);
            }
        }

        for (index, item) in compiled.iter().enumerate() {
            builder.add_textbox(
                &format!("Expression{}", index + 1),
                &item.expression,
                Rect {
                    left: 0.0,
                    top,
                    width: body_width,
                    height: ROW_HEIGHT,
                },
            );
            top += ROW_HEIGHT;
        }

        builder.update_body_height(top.max(1.0));
        builder.to_xml()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FieldCategory;
    use crate::error::CompileError;

    fn compiler() -> FieldCodeCompiler {
        FieldCodeCompiler::new(CompilerConfig::default())
    }

    #[test]
    fn test_compile_merge_field_end_to_end() {
        let code = FieldCode::new("fc-1", FieldCategory::MergeField, "MERGEFIELD Customer");
        let compiled = compiler().compile(&code).unwrap();
        assert_eq!(compiled.expression, "=Fields!Customer.Value");
        assert!(compiled.sandbox.ok);
    }

    #[test]
    fn test_compile_if_directive_to_ternary() {
        let code = FieldCode::new("fc-1", FieldCategory::If, "IF 1 = 1 Always Never");
        let compiled = compiler().compile(&code).unwrap();
        assert_eq!(compiled.expression, "=IIf((1 = 1), \"Always\", \"Never\")");
    }

    #[test]
    fn test_batch_isolates_failures() {
        let codes = vec![
            FieldCode::new("fc-1", FieldCategory::MergeField, "MERGEFIELD Customer"),
            FieldCode::new("fc-2", FieldCategory::Unsupported, "XE \"entry\""),
            FieldCode::new("fc-3", FieldCategory::PageNumber, "PAGE"),
        ];
        let results = compiler().compile_batch(&codes);
        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(CompileError::Unsupported { .. })));
        assert_eq!(
            results[2].1.as_ref().unwrap().expression,
            "=Globals!PageNumber"
        );
    }

    #[test]
    fn test_analyze_conditionals_respects_depth_bound() {
        let config = CompilerConfig {
            max_nesting_depth: 16,
            ..CompilerConfig::default()
        };
        let codes = vec![FieldCode::new(
            "fc-1",
            FieldCategory::If,
            "IF «Status» = \"Active\" \"Yes\" \"No\"",
        )];
        let branches = FieldCodeCompiler::new(config).analyze_conditionals(&codes).unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].id, "cond_1");
    }

    #[test]
    fn test_synthesize_without_dataset_omits_data_elements() {
        let structure = DocumentStructure {
            title: "Summary".to_string(),
            dataset: None,
            fields: Vec::new(),
        };
        let xml = compiler().synthesize(&structure, &[]).unwrap();
        assert!(!xml.contains("<DataSources>"));
        assert!(!xml.contains("<DataSets>"));
        assert!(xml.contains("Summary"));
    }

    #[test]
    fn test_synthesize_embeds_compiled_expressions() {
        let c = compiler();
        let code = FieldCode::new("fc-1", FieldCategory::MergeField, "MERGEFIELD Customer");
        let compiled = vec![c.compile(&code).unwrap()];
        let structure = DocumentStructure {
            title: "Orders Report".to_string(),
            dataset: Some("Orders".to_string()),
            fields: vec!["Customer".to_string()],
        };
        let xml = c.synthesize(&structure, &compiled).unwrap();
        assert!(xml.contains("<DataSet Name=\"Orders\">"));
        assert!(xml.contains("<Field Name=\"Customer\">"));
        assert!(xml.contains("=Fields!Customer.Value"));
    }

    #[test]
    fn test_config_round_trips_through_serde() {
        let config = CompilerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: CompilerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_nesting_depth, config.max_nesting_depth);
        assert_eq!(back.sandbox, config.sandbox);
    }
}
