use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SnyfterError, SnyfterResult};
use crate::table::formatter::TableFormatter;

pub const TRUNCATION_REASON: &str = "Large table truncated to prevent browser crashes";

/// Inferred data type of a table column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Currency,
    Percentage,
    Date,
    Numeric,
    Text,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Currency => "currency",
            ColumnType::Percentage => "percentage",
            ColumnType::Date => "date",
            ColumnType::Numeric => "numeric",
            ColumnType::Text => "text",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic label derived from the header keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableType {
    Financial,
    Contact,
    Statistics,
    Schedule,
    Inventory,
    Performance,
    Data,
}

impl TableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableType::Financial => "financial",
            TableType::Contact => "contact",
            TableType::Statistics => "statistics",
            TableType::Schedule => "schedule",
            TableType::Inventory => "inventory",
            TableType::Performance => "performance",
            TableType::Data => "data",
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy that produced a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    PymupdfTables,
    DocxNativeTables,
    HtmlParser,
    TextPattern,
    OcrPatternDetection,
    CsvParser,
    TsvParser,
    ExcelParser,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::PymupdfTables => "pymupdf_tables",
            ExtractionMethod::DocxNativeTables => "docx_native_tables",
            ExtractionMethod::HtmlParser => "html_parser",
            ExtractionMethod::TextPattern => "text_pattern",
            ExtractionMethod::OcrPatternDetection => "ocr_pattern_detection",
            ExtractionMethod::CsvParser => "csv_parser",
            ExtractionMethod::TsvParser => "tsv_parser",
            ExtractionMethod::ExcelParser => "excel_parser",
        }
    }

    /// Prior reliability of the method. Not a calibrated accuracy.
    pub fn default_confidence(&self) -> f64 {
        match self {
            ExtractionMethod::PymupdfTables => 0.95,
            ExtractionMethod::DocxNativeTables => 0.98,
            ExtractionMethod::HtmlParser => 0.95,
            ExtractionMethod::TextPattern => 0.8,
            ExtractionMethod::OcrPatternDetection => 0.7,
            ExtractionMethod::CsvParser
            | ExtractionMethod::TsvParser
            | ExtractionMethod::ExcelParser => 1.0,
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the document text was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMethod {
    TextExtraction,
    Ocr,
    Hybrid,
    HybridWithOcr,
    HtmlExtraction,
    TabularExtraction,
    Error,
}

impl ProcessingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMethod::TextExtraction => "text_extraction",
            ProcessingMethod::Ocr => "ocr",
            ProcessingMethod::Hybrid => "hybrid",
            ProcessingMethod::HybridWithOcr => "hybrid_with_ocr",
            ProcessingMethod::HtmlExtraction => "html_extraction",
            ProcessingMethod::TabularExtraction => "tabular_extraction",
            ProcessingMethod::Error => "error",
        }
    }
}

impl fmt::Display for ProcessingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingMethod {
    type Err = SnyfterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text_extraction" => Ok(ProcessingMethod::TextExtraction),
            "ocr" => Ok(ProcessingMethod::Ocr),
            "hybrid" => Ok(ProcessingMethod::Hybrid),
            "hybrid_with_ocr" => Ok(ProcessingMethod::HybridWithOcr),
            "html_extraction" => Ok(ProcessingMethod::HtmlExtraction),
            "tabular_extraction" => Ok(ProcessingMethod::TabularExtraction),
            "error" => Ok(ProcessingMethod::Error),
            other => Err(SnyfterError::invalid_format("processing method", other)),
        }
    }
}

/// Precomputed serializations of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TableExports {
    pub csv: String,
    pub html: String,
    pub markdown: String,
    pub text: String,
}

/// Canonical extracted table.
///
/// Built once by [`crate::table::TableEngine`]; the only derived copy is
/// [`Table::truncated`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    index: usize,
    page: Option<u32>,
    title: Option<String>,
    context_before: Option<String>,
    context_after: Option<String>,
    headers: Option<Vec<String>>,
    rows: Vec<Vec<String>>,
    row_count: usize,
    column_count: usize,
    column_types: Vec<ColumnType>,
    table_type: TableType,
    confidence_score: f64,
    quality_score: f64,
    extraction_method: ExtractionMethod,
    exports: TableExports,
    is_truncated: bool,
    original_row_count: usize,
    stored_row_count: usize,
    truncation_reason: Option<String>,
}

/// Everything the engine decided about a grid
pub(crate) struct TableParts {
    pub index: usize,
    pub page: Option<u32>,
    pub title: Option<String>,
    pub context_before: Option<String>,
    pub context_after: Option<String>,
    pub headers: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
    pub column_count: usize,
    pub column_types: Vec<ColumnType>,
    pub table_type: TableType,
    pub confidence_score: f64,
    pub quality_score: f64,
    pub extraction_method: ExtractionMethod,
}

impl Table {
    pub(crate) fn from_parts(parts: TableParts) -> Self {
        let exports = TableFormatter::new().exports(parts.headers.as_deref(), &parts.rows);
        let row_count = parts.rows.len();

        Self {
            index: parts.index,
            page: parts.page,
            title: parts.title,
            context_before: parts.context_before,
            context_after: parts.context_after,
            headers: parts.headers,
            rows: parts.rows,
            row_count,
            column_count: parts.column_count,
            column_types: parts.column_types,
            table_type: parts.table_type,
            confidence_score: parts.confidence_score.clamp(0.0, 1.0),
            quality_score: parts.quality_score.clamp(0.0, 1.0),
            extraction_method: parts.extraction_method,
            exports,
            is_truncated: false,
            original_row_count: row_count,
            stored_row_count: row_count,
            truncation_reason: None,
        }
    }

    /// Copy of this table holding at most `ceiling` rows
    pub fn truncated(&self, ceiling: usize) -> Table {
        if self.rows.len() <= ceiling {
            return self.clone();
        }

        let rows: Vec<Vec<String>> = self.rows[..ceiling].to_vec();
        let exports = TableFormatter::new().exports(self.headers.as_deref(), &rows);

        Table {
            index: self.index,
            page: self.page,
            title: self.title.clone(),
            context_before: self.context_before.clone(),
            context_after: self.context_after.clone(),
            headers: self.headers.clone(),
            rows,
            row_count: ceiling,
            column_count: self.column_count,
            column_types: self.column_types.clone(),
            table_type: self.table_type,
            confidence_score: self.confidence_score,
            quality_score: self.quality_score,
            extraction_method: self.extraction_method,
            exports,
            is_truncated: true,
            original_row_count: self.original_row_count,
            stored_row_count: ceiling,
            truncation_reason: Some(TRUNCATION_REASON.to_string()),
        }
    }

    pub fn index(&self) -> usize { self.index }
    pub fn page(&self) -> Option<u32> { self.page }
    pub fn title(&self) -> Option<&str> { self.title.as_deref() }
    pub fn context_before(&self) -> Option<&str> { self.context_before.as_deref() }
    pub fn context_after(&self) -> Option<&str> { self.context_after.as_deref() }
    pub fn headers(&self) -> Option<&[String]> { self.headers.as_deref() }
    pub fn rows(&self) -> &[Vec<String>] { &self.rows }
    pub fn row_count(&self) -> usize { self.row_count }
    pub fn column_count(&self) -> usize { self.column_count }
    pub fn column_types(&self) -> &[ColumnType] { &self.column_types }
    pub fn table_type(&self) -> TableType { self.table_type }
    pub fn confidence_score(&self) -> f64 { self.confidence_score }
    pub fn quality_score(&self) -> f64 { self.quality_score }
    pub fn extraction_method(&self) -> ExtractionMethod { self.extraction_method }
    pub fn exports(&self) -> &TableExports { &self.exports }
    pub fn is_truncated(&self) -> bool { self.is_truncated }
    pub fn original_row_count(&self) -> usize { self.original_row_count }
    pub fn stored_row_count(&self) -> usize { self.stored_row_count }
    pub fn truncation_reason(&self) -> Option<&str> { self.truncation_reason.as_deref() }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0 || self.column_count == 0
    }
}

/// Document-level extraction output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub full_text: String,
    pub page_count: usize,
    pub has_ocr_content: bool,
    pub processing_method: ProcessingMethod,
    pub tables: Vec<Table>,
    pub table_count: usize,
}

impl ExtractionResult {
    pub fn new(
        full_text: String,
        page_count: usize,
        has_ocr_content: bool,
        processing_method: ProcessingMethod,
        tables: Vec<Table>,
    ) -> Self {
        let table_count = tables.len();
        Self {
            full_text,
            page_count,
            has_ocr_content,
            processing_method,
            tables,
            table_count,
        }
    }

    /// Result recorded when a document could not be processed
    pub fn degraded(error: &dyn fmt::Display) -> Self {
        Self::new(
            format!("Error processing document: {}", error),
            1,
            false,
            ProcessingMethod::Error,
            Vec::new(),
        )
    }

    pub fn word_count(&self) -> usize {
        self.full_text.split_whitespace().count()
    }

    pub fn is_error(&self) -> bool {
        self.processing_method == ProcessingMethod::Error
    }
}

/// A file handed to the pipeline
#[derive(Debug, Clone)]
pub struct Document {
    pub filename: String,
    pub content: Vec<u8>,
    /// Extension hint that overrides the filename, e.g. from an upload's content type
    pub declared_type: Option<String>,
}

impl Document {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content,
            declared_type: None,
        }
    }

    pub fn with_declared_type(mut self, declared_type: impl Into<String>) -> Self {
        self.declared_type = Some(declared_type.into());
        self
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> SnyfterResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read(path)
            .map_err(|e| SnyfterError::file_io(path.display().to_string(), e))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self::new(filename, content))
    }

    /// Lower-cased extension, preferring the declared type
    pub fn extension(&self) -> Option<String> {
        if let Some(declared) = &self.declared_type {
            return Some(declared.trim_start_matches('.').to_lowercase());
        }
        Path::new(&self.filename)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }

    pub fn file_size(&self) -> u64 {
        self.content.len() as u64
    }

    /// blake3 hex digest of the raw bytes
    pub fn content_hash(&self) -> String {
        blake3::hash(&self.content).to_hex().to_string()
    }
}
