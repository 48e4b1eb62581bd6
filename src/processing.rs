//! Extraction orchestrator: picks an extractor per file, applies the
//! storage limits and turns any failure into a degraded result.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, info};

use crate::config::SnyfterConfig;
use crate::error::{SnyfterError, SnyfterResult};
use crate::extractors::pdf::PdfTableFinder;
use crate::extractors::tabular::dataset_table;
use crate::extractors::{
    CsvExcelLoader, DocumentExtractor, DocxExtractor, FileKind, HtmlExtractor, PdfExtractor, TabularKind,
    TabularLoader, TextExtractor,
};
use crate::logging::PerformanceTimer;
use crate::model::{Document, ExtractionResult, ProcessingMethod, Table};
use crate::ocr::{OcrGate, PageRasterizer};
use crate::table::TableEngine;
use crate::{log_error, log_processing_start};

const TRUNCATION_MARKER: &str = "\n[Text truncated]";

/// Stateless document pipeline; one instance can serve any number of calls
pub struct DocumentProcessor {
    config: SnyfterConfig,
    engine: TableEngine,
    pdf: PdfExtractor,
    docx: DocxExtractor,
    html: HtmlExtractor,
    text: TextExtractor,
    tabular: Arc<dyn TabularLoader>,
}

impl DocumentProcessor {
    /// Validates the configuration and wires the default capabilities
    pub fn new(config: SnyfterConfig) -> SnyfterResult<Self> {
        let ocr = OcrGate::from_config(&config.ocr);
        Self::with_ocr(config, ocr)
    }

    pub fn with_ocr(config: SnyfterConfig, ocr: OcrGate) -> SnyfterResult<Self> {
        config.validate()?;
        info!(
            "🐹 Document processor ready (OCR: {})",
            if ocr.is_enabled() { ocr.engine_name() } else { "disabled" }
        );

        Ok(Self {
            engine: TableEngine::new(&config.heuristics),
            pdf: PdfExtractor::new(&config, ocr.clone()),
            docx: DocxExtractor::new(&config.heuristics, ocr),
            html: HtmlExtractor::new(&config.heuristics)?,
            text: TextExtractor::new(&config.heuristics),
            tabular: Arc::new(CsvExcelLoader),
            config,
        })
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.pdf = self.pdf.with_rasterizer(rasterizer);
        self
    }

    pub fn with_table_finder(mut self, finder: Arc<dyn PdfTableFinder>) -> Self {
        self.pdf = self.pdf.with_finder(finder);
        self
    }

    pub fn with_tabular_loader(mut self, loader: Arc<dyn TabularLoader>) -> Self {
        self.tabular = loader;
        self
    }

    pub fn config(&self) -> &SnyfterConfig {
        &self.config
    }

    fn extractor_for(&self, kind: FileKind) -> &dyn DocumentExtractor {
        match kind {
            FileKind::Pdf => &self.pdf,
            FileKind::Docx => &self.docx,
            FileKind::Html => &self.html,
            _ => &self.text,
        }
    }

    /// Never fails: errors, and panics inside an extractor or capability,
    /// come back as a degraded result with `processing_method = error`
    pub fn process(&self, document: &Document) -> ExtractionResult {
        let _timer = PerformanceTimer::start(format!("processing {}", document.filename));
        log_processing_start!(document.filename, document.file_size());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.try_process(document)))
            .unwrap_or_else(|payload| Err(panic_error(payload.as_ref())));

        match outcome {
            Ok(result) => {
                info!(
                    "✅ {}: {} pages, {} tables, method {}",
                    document.filename, result.page_count, result.table_count, result.processing_method
                );
                result
            }
            Err(e) => {
                log_error!(e, document.filename.as_str());
                ExtractionResult::degraded(&e)
            }
        }
    }

    fn try_process(&self, document: &Document) -> SnyfterResult<ExtractionResult> {
        let kind = FileKind::detect(document);
        debug!("{} detected as {}", document.filename, kind);

        if let Some(tabular) = TabularKind::from_file_kind(kind) {
            return self.process_tabular(document, tabular);
        }

        let extractor = self.extractor_for(kind);
        let (extracted, tables) = extractor.extract(&document.content, self.tables_allowed(document))?;
        let page_count = extractor.count_pages(&document.content);

        Ok(ExtractionResult::new(
            sanitize_text(&extracted.text, self.config.limits.max_text_bytes),
            page_count,
            extracted.used_ocr,
            extracted.method,
            self.apply_limits(tables),
        ))
    }

    /// CSV/TSV/Excel: the whole file is one table and its flattened text
    fn process_tabular(&self, document: &Document, kind: TabularKind) -> SnyfterResult<ExtractionResult> {
        let dataset = self.tabular.load(&document.content, kind)?;
        info!(
            "📈 Loaded {} dataset: {} rows x {} columns",
            kind,
            dataset.rows.len(),
            dataset.columns.len()
        );

        let tables = if self.tables_allowed(document) {
            dataset_table(&self.engine, &dataset, kind, &document.filename)
                .into_iter()
                .collect()
        } else {
            Vec::new()
        };

        Ok(ExtractionResult::new(
            sanitize_text(&dataset.to_text(), self.config.limits.max_text_bytes),
            1,
            false,
            ProcessingMethod::TabularExtraction,
            self.apply_limits(tables),
        ))
    }

    fn tables_allowed(&self, document: &Document) -> bool {
        let allowed = document.file_size() < self.config.limits.max_table_file_size;
        if !allowed {
            info!(
                "⚠️ Skipping table extraction for {} ({} bytes over the {} byte limit)",
                document.filename,
                document.file_size(),
                self.config.limits.max_table_file_size
            );
        }
        allowed
    }

    /// Apply the storage row ceiling and drop empty tables
    fn apply_limits(&self, tables: Vec<Table>) -> Vec<Table> {
        let ceiling = self.config.limits.max_storage_rows;

        tables
            .into_iter()
            .filter(|table| !table.is_empty())
            .map(|table| {
                if table.row_count() > ceiling {
                    info!(
                        "✂️ Table {} truncated from {} to {} rows",
                        table.index(),
                        table.row_count(),
                        ceiling
                    );
                    table.truncated(ceiling)
                } else {
                    table
                }
            })
            .collect()
    }
}

fn panic_error(payload: &(dyn Any + Send)) -> SnyfterError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    SnyfterError::General(anyhow!("extraction panicked: {}", message))
}

/// Strip NUL characters and cap the text at `max_bytes`, cutting on a char
/// boundary
pub fn sanitize_text(text: &str, max_bytes: usize) -> String {
    let mut clean = text.replace('\0', "");
    if clean.len() > max_bytes {
        let mut cut = max_bytes;
        while !clean.is_char_boundary(cut) {
            cut -= 1;
        }
        clean.truncate(cut);
        clean.push_str(TRUNCATION_MARKER);
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExtractionMethod, TableType};

    fn processor() -> DocumentProcessor {
        let mut config = SnyfterConfig::default();
        config.ocr.enabled = false;
        DocumentProcessor::new(config).unwrap()
    }

    #[test]
    fn test_text_document() {
        let doc = Document::new("people.txt", b"Name    Age    City\nAlice   30     NYC\nBob     25     LA\n".to_vec());
        let result = processor().process(&doc);

        assert_eq!(result.processing_method, ProcessingMethod::TextExtraction);
        assert_eq!(result.page_count, 1);
        assert_eq!(result.table_count, 1);
        assert!(!result.has_ocr_content);
        assert_eq!(result.tables[0].table_type(), TableType::Data);
    }

    #[test]
    fn test_csv_document() {
        let doc = Document::new("stock.csv", b"product,quantity\nPen,12\nBook,3\n".to_vec());
        let result = processor().process(&doc);

        assert_eq!(result.processing_method, ProcessingMethod::TabularExtraction);
        assert_eq!(result.full_text, "product | quantity\nPen | 12\nBook | 3");
        assert_eq!(result.tables[0].title(), Some("CSV Data: stock.csv"));
        assert_eq!(result.tables[0].extraction_method(), ExtractionMethod::CsvParser);
    }

    #[test]
    fn test_failure_is_degraded() {
        let doc = Document::new("broken.docx", b"not a zip archive".to_vec());
        let result = processor().process(&doc);

        assert!(result.is_error());
        assert_eq!(result.page_count, 1);
        assert!(result.tables.is_empty());
        assert!(result.full_text.starts_with("Error processing document: "));
    }

    struct PanickingLoader;

    impl TabularLoader for PanickingLoader {
        fn load(&self, _content: &[u8], _kind: TabularKind) -> SnyfterResult<crate::extractors::Dataset> {
            panic!("loader exploded");
        }
    }

    #[test]
    fn test_panics_are_degraded() {
        let csv = Document::new("stock.csv", b"product,quantity\nPen,12\n".to_vec());
        let result = processor().with_tabular_loader(Arc::new(PanickingLoader)).process(&csv);
        assert!(result.is_error());
        assert_eq!(result.page_count, 1);
        assert!(result.full_text.contains("extraction panicked: loader exploded"));

        // the same processor keeps serving after a panic
        let text = Document::new("notes.txt", b"Still fine afterwards\n".to_vec());
        let processor = processor().with_tabular_loader(Arc::new(PanickingLoader));
        assert!(processor.process(&csv).is_error());
        assert_eq!(processor.process(&text).processing_method, ProcessingMethod::TextExtraction);
    }

    #[test]
    fn test_large_files_skip_tables() {
        let mut config = SnyfterConfig::default();
        config.ocr.enabled = false;
        config.limits.max_table_file_size = 16;
        let processor = DocumentProcessor::new(config).unwrap();

        let doc = Document::new("people.txt", b"Name    Age    City\nAlice   30     NYC\nBob     25     LA\n".to_vec());
        let result = processor.process(&doc);

        assert!(result.tables.is_empty());
        assert!(result.full_text.starts_with("Name"));
    }

    #[test]
    fn test_row_ceiling() {
        let mut config = SnyfterConfig::default();
        config.ocr.enabled = false;
        config.limits.max_storage_rows = 3;
        let processor = DocumentProcessor::new(config).unwrap();

        let csv: String = std::iter::once("id,value\n".to_string())
            .chain((0..5).map(|i| format!("{},{}\n", i, i * 10)))
            .collect();
        let result = processor.process(&Document::new("ids.csv", csv.into_bytes()));

        let table = &result.tables[0];
        assert!(table.is_truncated());
        assert_eq!(table.stored_row_count(), 3);
        assert_eq!(table.original_row_count(), 5);
        assert_eq!(table.row_count(), 3);
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("a\0b", 100), "ab");
        assert_eq!(sanitize_text("héllo", 2), "h\n[Text truncated]");
        assert_eq!(sanitize_text("hello", 5), "hello");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SnyfterConfig::default();
        config.heuristics.header_threshold = 0.0;
        assert!(DocumentProcessor::new(config).is_err());
    }
}
