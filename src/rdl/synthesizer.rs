//! Report builder enforcing the structural schema
//!
//! One builder mutates one document per call chain; it is not safe to share a
//! document across concurrent mutators. Mutations locate their anchors by
//! namespace-qualified path and degrade to a diagnosed no-op when an anchor
//! is missing; completeness is judged by [`ReportBuilder::validate`], which
//! gates serialization.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::document::XmlElement;
use super::format_size;
use crate::error::{CompileResult, SchemaViolation, SchemaViolations, Severity};

/// Physical page geometry in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSetup {
    pub width: f64,
    pub height: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
}

impl Default for PageSetup {
    /// US Letter with one-inch margins.
    fn default() -> Self {
        Self {
            width: 8.5,
            height: 11.0,
            margin_left: 1.0,
            margin_right: 1.0,
            margin_top: 1.0,
            margin_bottom: 1.0,
        }
    }
}

/// Placement of a report item within the body, in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Name given to the synthesized field when a data set has no known fields.
const PLACEHOLDER_FIELD: &str = "Placeholder";

/// Default CLR type for synthesized text fields.
pub const DEFAULT_FIELD_TYPE: &str = "System.String";

const DATA_SOURCE_NAME: &str = "ReportData";

#[derive(Debug)]
pub struct ReportBuilder {
    root: XmlElement,
    /// Data sets still carrying only the synthesized placeholder field
    placeholder_datasets: Vec<String>,
    /// Warnings recorded by mutations that found no anchor
    diagnostics: Vec<SchemaViolation>,
}

impl ReportBuilder {
    /// Build the document skeleton: body, width and page geometry.
    ///
    /// The body width is the page width minus both horizontal margins, never
    /// the raw page width, so content cannot force an extra page.
    pub fn new(page: PageSetup) -> Self {
        let mut root = XmlElement::new("Report");

        let body = root.add_element(XmlElement::new("Body"));
        body.add_element(XmlElement::new("Height").with_text(&format_size(1.0)));

        let body_width = page.width - page.margin_left - page.margin_right;
        root.add_element(XmlElement::new("Width").with_text(&format_size(body_width)));

        let page_element = root.add_element(XmlElement::new("Page"));
        page_element.add_element(XmlElement::new("PageHeight").with_text(&format_size(page.height)));
        page_element.add_element(XmlElement::new("PageWidth").with_text(&format_size(page.width)));
        page_element
            .add_element(XmlElement::new("LeftMargin").with_text(&format_size(page.margin_left)));
        page_element
            .add_element(XmlElement::new("RightMargin").with_text(&format_size(page.margin_right)));
        page_element
            .add_element(XmlElement::new("TopMargin").with_text(&format_size(page.margin_top)));
        page_element.add_element(
            XmlElement::new("BottomMargin").with_text(&format_size(page.margin_bottom)),
        );

        root.add_element(XmlElement::designer("ReportUnitType").with_text("Inch"));

        Self {
            root,
            placeholder_datasets: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Request a named data set, emitting the data-source and data-set
    /// elements on first use. A data set starts with one placeholder field so
    /// its field collection is never empty; the first real field replaces it.
    ///
    /// Without this call the document carries no data-source elements at all.
    pub fn add_dataset(&mut self, name: &str) {
        if self.find_dataset(name).is_some() {
            return;
        }
        if self.root.find("DataSources").is_none() {
            let sources = self.root.insert_element(0, XmlElement::new("DataSources"));
            let source =
                sources.add_element(XmlElement::new("DataSource").with_attr("Name", DATA_SOURCE_NAME));
            let connection = source.add_element(XmlElement::new("ConnectionProperties"));
            connection.add_element(XmlElement::new("DataProvider").with_text("SQL"));
            connection.add_element(XmlElement::new("ConnectString"));
            self.root.insert_element(1, XmlElement::new("DataSets"));
        }
        // DataSets exists whenever DataSources does
        let Some(datasets) = self.root.find_mut("DataSets") else {
            return;
        };
        let dataset = datasets.add_element(XmlElement::new("DataSet").with_attr("Name", name));
        let fields = dataset.add_element(XmlElement::new("Fields"));
        fields.add_element(placeholder_field());
        let query = dataset.add_element(XmlElement::new("Query"));
        query.add_element(XmlElement::new("DataSourceName").with_text(DATA_SOURCE_NAME));
        query.add_element(XmlElement::new("CommandText"));
        self.placeholder_datasets.push(name.to_string());
    }

    /// Append a field to a data set's field collection. The first real field
    /// evicts the synthesized placeholder.
    pub fn add_field(&mut self, dataset: &str, name: &str, type_name: &str) {
        let had_placeholder = self.placeholder_datasets.iter().any(|d| d == dataset);
        let Some(fields) = self
            .root
            .find_mut("DataSets")
            .and_then(|d| d.find_where_mut("DataSet", "Name", dataset))
            .and_then(|d| d.find_mut("Fields"))
        else {
            self.note_missing_anchor(
                format!("add_field `{name}` found no data set `{dataset}`"),
                "Report/DataSets/DataSet/Fields",
            );
            return;
        };
        if had_placeholder {
            fields.children.clear();
            self.placeholder_datasets.retain(|d| d != dataset);
        }
        let field = fields.add_element(XmlElement::new("Field").with_attr("Name", name));
        field.add_element(XmlElement::new("DataField").with_text(name));
        field.add_element(XmlElement::designer("TypeName").with_text(type_name));
    }

    /// Place a textbox carrying a generated expression into the body.
    pub fn add_textbox(&mut self, name: &str, expression: &str, rect: Rect) {
        let Some(body) = self.root.find_mut("Body") else {
            self.note_missing_anchor(
                format!("add_textbox `{name}` found no body"),
                "Report/Body",
            );
            return;
        };
        // ReportItems may not be empty, so it only exists once an item does
        if body.find("ReportItems").is_none() {
            body.insert_element(0, XmlElement::new("ReportItems"));
        }
        let items = match body.find_mut("ReportItems") {
            Some(items) => items,
            None => unreachable!("just ensured"),
        };
        let textbox = items.add_element(XmlElement::new("Textbox").with_attr("Name", name));
        let paragraphs = textbox.add_element(XmlElement::new("Paragraphs"));
        let paragraph = paragraphs.add_element(XmlElement::new("Paragraph"));
        let runs = paragraph.add_element(XmlElement::new("TextRuns"));
        let run = runs.add_element(XmlElement::new("TextRun"));
        run.add_element(XmlElement::new("Value").with_text(expression));
        textbox.add_element(XmlElement::new("Top").with_text(&format_size(rect.top)));
        textbox.add_element(XmlElement::new("Left").with_text(&format_size(rect.left)));
        textbox.add_element(XmlElement::new("Height").with_text(&format_size(rect.height)));
        textbox.add_element(XmlElement::new("Width").with_text(&format_size(rect.width)));
    }

    /// Append a page header block. Each call appends a fresh block; callers
    /// wanting a single header must call this once.
    pub fn set_page_header(&mut self, height: f64, text: &str) {
        self.append_page_band("PageHeader", height, text);
    }

    /// Append a page footer block; same append-per-call contract as
    /// [`Self::set_page_header`].
    pub fn set_page_footer(&mut self, height: f64, text: &str) {
        self.append_page_band("PageFooter", height, text);
    }

    fn append_page_band(&mut self, kind: &str, height: f64, text: &str) {
        if height <= 0.0 {
            self.note_missing_anchor(
                format!("{kind} with non-positive height {height}"),
                "Report/Page",
            );
            return;
        }
        let Some(page) = self.root.find_mut("Page") else {
            self.note_missing_anchor(format!("{kind} found no page"), "Report/Page");
            return;
        };
        // headers first, then footers, then the geometry elements
        let headers = page.child_elements().filter(|e| e.name == "PageHeader").count();
        let footers = page.child_elements().filter(|e| e.name == "PageFooter").count();
        let index = if kind == "PageHeader" {
            headers
        } else {
            headers + footers
        };
        let ordinal = 1 + if kind == "PageHeader" { headers } else { footers };
        let band = page.insert_element(index, XmlElement::new(kind));
        band.add_element(XmlElement::new("Height").with_text(&format_size(height)));
        band.add_element(XmlElement::new("PrintOnFirstPage").with_text("true"));
        band.add_element(XmlElement::new("PrintOnLastPage").with_text("true"));
        if !text.is_empty() {
            let items = band.add_element(XmlElement::new("ReportItems"));
            let textbox = items.add_element(
                XmlElement::new("Textbox").with_attr("Name", format!("{kind}Text{ordinal}")),
            );
            let paragraphs = textbox.add_element(XmlElement::new("Paragraphs"));
            let paragraph = paragraphs.add_element(XmlElement::new("Paragraph"));
            let runs = paragraph.add_element(XmlElement::new("TextRuns"));
            let run = runs.add_element(XmlElement::new("TextRun"));
            run.add_element(XmlElement::new("Value").with_text(text));
            textbox.add_element(XmlElement::new("Height").with_text(&format_size(height)));
        }
    }

    pub fn update_body_height(&mut self, height: f64) {
        let Some(element) = self.root.find_path_mut(&["Body", "Height"]) else {
            self.note_missing_anchor(
                format!("update_body_height({height}) found no body height"),
                "Report/Body/Height",
            );
            return;
        };
        element.set_text(&format_size(height));
    }

    fn note_missing_anchor(&mut self, message: String, location: &str) {
        warn!(%message, %location, "mutation skipped");
        self.diagnostics.push(SchemaViolation {
            severity: Severity::Warn,
            message,
            location: location.to_string(),
        });
    }

    fn find_dataset(&self, name: &str) -> Option<&XmlElement> {
        self.root
            .find("DataSets")?
            .find_where("DataSet", "Name", name)
    }

    /// The document tree as built so far.
    pub fn document(&self) -> &XmlElement {
        &self.root
    }

    /// Warnings recorded by mutations that degraded to no-ops.
    pub fn diagnostics(&self) -> &[SchemaViolation] {
        &self.diagnostics
    }

    /// Check every document-level invariant, returning all findings at once.
    ///
    /// No-op diagnostics ride along as warnings; only error-severity findings
    /// make the pass fail.
    pub fn validate(&self) -> Result<(), SchemaViolations> {
        let mut findings = self.diagnostics.clone();
        let error = |message: String, location: &str| SchemaViolation {
            severity: Severity::Error,
            message,
            location: location.to_string(),
        };

        if let Some(sources) = self.root.find("DataSources") {
            if sources.child_elements().next().is_none() {
                findings.push(error(
                    "an empty DataSources container violates the schema".to_string(),
                    "Report/DataSources",
                ));
            }
            match self.root.find("DataSets") {
                Some(datasets) => {
                    for dataset in datasets.child_elements() {
                        let name = dataset.attr("Name").unwrap_or("?");
                        let has_field = dataset
                            .find("Fields")
                            .is_some_and(|f| f.child_elements().next().is_some());
                        if !has_field {
                            findings.push(error(
                                format!("data set `{name}` has an empty field collection"),
                                "Report/DataSets/DataSet/Fields",
                            ));
                        }
                    }
                    if datasets.child_elements().next().is_none() {
                        findings.push(error(
                            "data sources are present but no data set is defined".to_string(),
                            "Report/DataSets",
                        ));
                    }
                }
                None => findings.push(error(
                    "data sources are present but no data set is defined".to_string(),
                    "Report/DataSets",
                )),
            }
        }

        match self.root.find("Body") {
            Some(body) => {
                if body.find("Height").is_none() {
                    findings.push(error("body has no height".to_string(), "Report/Body/Height"));
                }
                if let Some(items) = body.find("ReportItems") {
                    if items.child_elements().next().is_none() {
                        findings.push(error(
                            "an empty ReportItems container violates the schema".to_string(),
                            "Report/Body/ReportItems",
                        ));
                    }
                }
            }
            None => findings.push(error("document has no body".to_string(), "Report/Body")),
        }
        if self.root.find("Width").is_none() {
            findings.push(error("document has no width".to_string(), "Report/Width"));
        }

        if let Some(page) = self.root.find("Page") {
            for band in page
                .child_elements()
                .filter(|e| e.name == "PageHeader" || e.name == "PageFooter")
            {
                let location = format!("Report/Page/{}", band.name);
                let positive_height = band
                    .find("Height")
                    .and_then(|h| h.text().strip_suffix("in").and_then(|v| v.parse::<f64>().ok()))
                    .is_some_and(|h| h > 0.0);
                if !positive_height {
                    findings.push(error(
                        format!("{} must carry a positive height", band.name),
                        &location,
                    ));
                }
                for flag in ["PrintOnFirstPage", "PrintOnLastPage"] {
                    if band.find(flag).is_none() {
                        findings.push(error(
                            format!("{} must carry an explicit {flag} flag", band.name),
                            &location,
                        ));
                    }
                }
            }
        } else {
            findings.push(error("document has no page".to_string(), "Report/Page"));
        }

        let violations = SchemaViolations(findings);
        if violations.has_errors() {
            Err(violations)
        } else {
            Ok(())
        }
    }

    /// Validate, then serialize. A document with error-severity findings is
    /// never shipped.
    pub fn to_xml(&self) -> CompileResult<String> {
        self.validate()?;
        self.root.to_xml()
    }
}

fn placeholder_field() -> XmlElement {
    let mut field = XmlElement::new("Field").with_attr("Name", PLACEHOLDER_FIELD);
    field.add_element(XmlElement::new("DataField").with_text(PLACEHOLDER_FIELD));
    field.add_element(XmlElement::designer("TypeName").with_text(DEFAULT_FIELD_TYPE));
    field
}
