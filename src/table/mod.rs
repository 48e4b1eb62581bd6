pub mod classifier;
pub mod detector;
pub mod engine;
pub mod formatter;
pub mod parser;
pub mod quality;

pub use classifier::{StructureIssue, TableClassifier};
pub use detector::{LineType, RowDetector, Separator, TableRegion};
pub use engine::TableEngine;
pub use formatter::{ColumnAlignment, TableFormatter};
pub use parser::GridParser;

use crate::model::ExtractionMethod;

/// Where a grid's header row comes from
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderSource {
    /// Score the first row and keep it as header only if it reads like one
    Infer,
    /// The first row is the header
    FirstRow,
    /// Headers found outside the grid, e.g. `<th>` cells
    Given(Vec<String>),
    Absent,
}

/// Cell grid located by an extractor, before typing and scoring
#[derive(Debug, Clone)]
pub struct RawTable {
    pub rows: Vec<Vec<String>>,
    pub headers: HeaderSource,
    pub method: ExtractionMethod,
    pub confidence: Option<f64>,
    pub page: Option<u32>,
    pub title: Option<String>,
    pub context_before: Option<String>,
    pub context_after: Option<String>,
}

impl RawTable {
    pub fn new(rows: Vec<Vec<String>>, method: ExtractionMethod) -> Self {
        Self {
            rows,
            headers: HeaderSource::Infer,
            method,
            confidence: None,
            page: None,
            title: None,
            context_before: None,
            context_after: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderSource) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn on_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_context(mut self, before: Option<String>, after: Option<String>) -> Self {
        self.context_before = before.filter(|t| !t.trim().is_empty());
        self.context_after = after.filter(|t| !t.trim().is_empty());
        self
    }
}
