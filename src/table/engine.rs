use tracing::debug;

use super::classifier::{StructureIssue, TableClassifier};
use super::detector::RowDetector;
use super::parser::{normalize_width, GridParser};
use super::quality::{classify_table_type, quality_score};
use super::{HeaderSource, RawTable};
use crate::config::HeuristicsConfig;
use crate::log_table_extracted;
use crate::model::{ExtractionMethod, Table, TableParts};

/// Turns raw grids from any extractor into canonical [`Table`]s
#[derive(Debug, Clone)]
pub struct TableEngine {
    classifier: TableClassifier,
}

impl Default for TableEngine {
    fn default() -> Self {
        Self::new(&HeuristicsConfig::default())
    }
}

impl TableEngine {
    pub fn new(config: &HeuristicsConfig) -> Self {
        Self {
            classifier: TableClassifier::new(config),
        }
    }

    pub fn classifier(&self) -> &TableClassifier {
        &self.classifier
    }

    /// Normalize, validate, type, classify and score one grid
    pub fn build(&self, raw: RawTable, index: usize) -> Result<Table, StructureIssue> {
        let RawTable {
            rows,
            headers,
            method,
            confidence,
            page,
            title,
            context_before,
            context_after,
        } = raw;

        let (headers, rows) = match headers {
            HeaderSource::Infer => self.classifier.split_header(rows),
            HeaderSource::FirstRow => {
                let mut rows = rows;
                if rows.is_empty() {
                    (None, rows)
                } else {
                    let first = rows.remove(0);
                    (Some(first), rows)
                }
            }
            HeaderSource::Given(headers) => (Some(headers), rows),
            HeaderSource::Absent => (None, rows),
        };

        let width = headers
            .as_ref()
            .map(Vec::len)
            .or_else(|| rows.first().map(Vec::len))
            .unwrap_or(0);
        if width == 0 {
            return Err(StructureIssue::NoColumns);
        }
        let rows = normalize_width(rows, width);

        self.classifier.validate(headers.as_deref(), &rows)?;

        let column_types = self.classifier.infer_column_types(&rows, width);
        let table_type = classify_table_type(headers.as_deref());
        let quality = quality_score(&rows);

        Ok(Table::from_parts(TableParts {
            index,
            page,
            title,
            context_before,
            context_after,
            headers,
            rows,
            column_count: width,
            column_types,
            table_type,
            confidence_score: confidence.unwrap_or_else(|| method.default_confidence()),
            quality_score: quality,
            extraction_method: method,
        }))
    }

    /// Build every candidate, skipping rejects; indices stay dense and ordered
    pub fn build_all(&self, candidates: Vec<RawTable>) -> Vec<Table> {
        self.build_all_from(candidates, 0)
    }

    /// Like [`build_all`](Self::build_all), numbering from `first_index`
    pub fn build_all_from(&self, candidates: Vec<RawTable>, first_index: usize) -> Vec<Table> {
        let mut tables = Vec::with_capacity(candidates.len());

        for raw in candidates {
            let method = raw.method;
            match self.build(raw, first_index + tables.len()) {
                Ok(table) => {
                    log_table_extracted!(table.index(), method, table.row_count(), table.column_count());
                    tables.push(table);
                }
                Err(issue) => debug!("Skipping {} table candidate: {}", method, issue),
            }
        }

        tables
    }

    /// Locate text-pattern candidates in decoded plain text
    pub fn text_candidates(&self, text: &str, method: ExtractionMethod) -> Vec<RawTable> {
        let parser = GridParser::new();

        RowDetector::new()
            .detect_regions(text)
            .iter()
            .filter_map(|region| parser.parse_region(region))
            .map(|rows| RawTable::new(rows, method))
            .collect()
    }
}
