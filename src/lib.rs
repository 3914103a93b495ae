//! rdl-forge - Field-code compiler and RDL synthesizer
//!
//! Converts placeholder directives ("field codes") lifted out of source
//! documents into VB-style report expressions and assembles a schema-valid
//! RDL 2008/01 report definition embedding them.
//!
//! ## Pipeline
//! Field-code text -> Parser -> Expr tree -> (Conditional Analyzer) ->
//! Generator -> Sandbox Validator -> Optimizer -> Schema Synthesizer
//!
//! ## Quick Start
//!
//! ```rust
//! use rdl_forge::ast::{FieldCategory, FieldCode};
//! use rdl_forge::compiler::{CompilerConfig, DocumentStructure, FieldCodeCompiler};
//!
//! let compiler = FieldCodeCompiler::new(CompilerConfig::default());
//! let code = FieldCode::new("fc-1", FieldCategory::MergeField, "MERGEFIELD Customer");
//! let compiled = compiler.compile(&code).unwrap();
//! assert_eq!(compiled.expression, "=Fields!Customer.Value");
//!
//! let structure = DocumentStructure {
//!     title: "Orders".to_string(),
//!     dataset: Some("Orders".to_string()),
//!     fields: vec!["Customer".to_string()],
//! };
//! let xml = compiler.synthesize(&structure, &[compiled]).unwrap();
//! assert!(xml.starts_with("<?xml"));
//! ```

// Core error handling
pub mod error;

// Expression tree and field-code records
pub mod ast;

// Field-code front end and expression grammar
pub mod parser;

// Conditional branch extraction and flattening
pub mod analysis;

// Tree-to-text generation and text-level rewrite passes
pub mod codegen;

// Static policy check over generated expressions
pub mod sandbox;

// Document model and report synthesis
pub mod rdl;

// Pipeline orchestration - the single compile path
pub mod compiler;

pub use analysis::{can_convert_to_switch, extract_branches, flatten_nested, Branch};
pub use ast::{Expr, FieldCategory, FieldCode, Literal};
pub use codegen::optimizer::optimize;
pub use codegen::{generate, generate_expression};
pub use compiler::{CompiledExpression, CompilerConfig, DocumentStructure, FieldCodeCompiler};
pub use error::{CompileError, CompileResult, SchemaViolation, SchemaViolations, Severity};
pub use parser::{parse_expression, parse_field_code};
pub use rdl::synthesizer::{PageSetup, Rect, ReportBuilder};
pub use sandbox::{Sandbox, SandboxPolicy, SandboxReport};
