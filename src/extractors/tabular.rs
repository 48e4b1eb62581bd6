//! Whole-file tables: CSV, TSV and Excel workbooks.

use std::fmt;
use std::io::{Cursor, Read, Seek};

use calamine::{DataType, Reader, Xls, Xlsx};
use csv::{ReaderBuilder, Trim};
use tracing::{debug, info};

use super::text::decode_text;
use super::FileKind;
use crate::error::{SnyfterError, SnyfterResult};
use crate::model::{ExtractionMethod, Table};
use crate::table::formatter::TableFormatter;
use crate::table::{HeaderSource, RawTable, TableEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularKind {
    Csv,
    Tsv,
    Xls,
    Xlsx,
}

impl TabularKind {
    pub fn from_file_kind(kind: FileKind) -> Option<Self> {
        match kind {
            FileKind::Csv => Some(TabularKind::Csv),
            FileKind::Tsv => Some(TabularKind::Tsv),
            FileKind::Xls => Some(TabularKind::Xls),
            FileKind::Xlsx => Some(TabularKind::Xlsx),
            _ => None,
        }
    }

    /// Upper-case family name used in table titles
    pub fn label(&self) -> &'static str {
        match self {
            TabularKind::Csv => "CSV",
            TabularKind::Tsv => "TSV",
            TabularKind::Xls | TabularKind::Xlsx => "EXCEL",
        }
    }

    pub fn method(&self) -> ExtractionMethod {
        match self {
            TabularKind::Csv => ExtractionMethod::CsvParser,
            TabularKind::Tsv => ExtractionMethod::TsvParser,
            TabularKind::Xls | TabularKind::Xlsx => ExtractionMethod::ExcelParser,
        }
    }
}

impl fmt::Display for TabularKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Rectangular dataset: named columns plus string rows
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Flattened `a | b` lines, header first
    pub fn to_text(&self) -> String {
        TableFormatter::new().to_text(Some(self.columns.as_slice()), &self.rows)
    }
}

pub trait TabularLoader: Send + Sync {
    fn load(&self, content: &[u8], kind: TabularKind) -> SnyfterResult<Dataset>;
}

/// csv crate for delimited text, calamine for workbooks
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvExcelLoader;

impl TabularLoader for CsvExcelLoader {
    fn load(&self, content: &[u8], kind: TabularKind) -> SnyfterResult<Dataset> {
        match kind {
            TabularKind::Csv => {
                let text = decode_text(content);
                let delimiter = detect_delimiter(&text);
                debug!("CSV delimiter: {:?}", delimiter as char);
                read_delimited(&text, delimiter)
            }
            TabularKind::Tsv => read_delimited(&decode_text(content), b'\t'),
            TabularKind::Xlsx => {
                let workbook = Xlsx::new(Cursor::new(content))
                    .map_err(|e| SnyfterError::parse("xlsx", format!("failed to read workbook: {}", e)))?;
                read_first_sheet(workbook, "xlsx")
            }
            TabularKind::Xls => {
                let workbook = Xls::new(Cursor::new(content))
                    .map_err(|e| SnyfterError::parse("xls", format!("failed to read workbook: {}", e)))?;
                read_first_sheet(workbook, "xls")
            }
        }
    }
}

/// `;`, tab or `|` when it outnumbers commas, else `,`
pub fn detect_delimiter(text: &str) -> u8 {
    let commas = text.matches(',').count();
    [b';', b'\t', b'|']
        .into_iter()
        .find(|&candidate| text.bytes().filter(|&b| b == candidate).count() > commas)
        .unwrap_or(b',')
}

fn read_delimited(text: &str, delimiter: u8) -> SnyfterResult<Dataset> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| SnyfterError::parse_with_source("csv", "failed to read header row", e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| SnyfterError::parse_with_source("csv", "malformed record", e))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Dataset { columns, rows })
}

fn read_first_sheet<RS, R>(mut workbook: R, format: &str) -> SnyfterResult<Dataset>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: fmt::Display,
{
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| SnyfterError::parse(format, "workbook has no sheets"))?;

    let range = workbook
        .worksheet_range(&sheet)
        .ok_or_else(|| SnyfterError::parse(format, format!("sheet '{}' is missing", sheet)))?
        .map_err(|e| SnyfterError::parse(format, format!("failed to read sheet '{}': {}", sheet, e)))?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<String>>())
        .filter(|row| row.iter().any(|cell| !cell.is_empty()));

    let columns = rows.next().unwrap_or_default();
    Ok(Dataset {
        columns,
        rows: rows.collect(),
    })
}

fn cell_text(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.trim().to_string(),
        DataType::Float(v) => format!("{}", v),
        DataType::Int(v) => format!("{}", v),
        DataType::Bool(b) => b.to_string(),
        DataType::Error(e) => format!("#{:?}", e),
        DataType::Empty => String::new(),
        DataType::DateTime(v) => format!("{}", v),
        DataType::DateTimeIso(s) => s.clone(),
        DataType::Duration(v) => format!("{}", v),
        DataType::DurationIso(s) => s.clone(),
    }
}

/// The whole dataset as one table titled `"{TYPE} Data: {filename}"`
pub fn dataset_table(engine: &TableEngine, dataset: &Dataset, kind: TabularKind, filename: &str) -> Option<Table> {
    let raw = RawTable::new(dataset.rows.clone(), kind.method())
        .with_headers(HeaderSource::Given(dataset.columns.clone()))
        .with_confidence(1.0)
        .with_title(Some(format!("{} Data: {}", kind.label(), filename)));

    match engine.build(raw, 0) {
        Ok(table) => {
            info!(
                "📊 {} dataset: {} rows x {} columns",
                kind,
                table.row_count(),
                table.column_count()
            );
            Some(table)
        }
        Err(issue) => {
            debug!("Skipping {} dataset table: {}", kind, issue);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnType, TableType};

    #[test]
    fn test_delimiter_detection() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), b';');
        assert_eq!(detect_delimiter("a\tb\n1\t2"), b'\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), b'|');
        assert_eq!(detect_delimiter("a,b;c\n1,2,3"), b',');
    }

    #[test]
    fn test_csv_load_trims_and_skips_blank_records() {
        let dataset = CsvExcelLoader
            .load(b"Item; Price\nPen; $1.50\n;\nBook; $9.99\n", TabularKind::Csv)
            .unwrap();

        assert_eq!(dataset.columns, vec!["Item", "Price"]);
        assert_eq!(
            dataset.rows,
            vec![vec!["Pen".to_string(), "$1.50".to_string()], vec!["Book".to_string(), "$9.99".to_string()]]
        );
    }

    #[test]
    fn test_dataset_becomes_single_table() {
        let dataset = CsvExcelLoader
            .load(b"product,quantity,price\nPen,12,$1.50\nBook,3,$9.99\n", TabularKind::Csv)
            .unwrap();
        let table = dataset_table(&TableEngine::default(), &dataset, TabularKind::Csv, "stock.csv").unwrap();

        assert_eq!(table.title(), Some("CSV Data: stock.csv"));
        assert_eq!(table.confidence_score(), 1.0);
        assert_eq!(table.extraction_method(), ExtractionMethod::CsvParser);
        assert_eq!(
            table.column_types(),
            [ColumnType::Text, ColumnType::Numeric, ColumnType::Currency]
        );
        // quantity + product outscore price
        assert_eq!(table.table_type(), TableType::Inventory);
        assert_eq!(dataset.to_text(), "product | quantity | price\nPen | 12 | $1.50\nBook | 3 | $9.99");
    }

    #[test]
    fn test_broken_workbook_is_an_error() {
        assert!(CsvExcelLoader.load(b"not a zip", TabularKind::Xlsx).is_err());
    }

    #[test]
    fn test_excel_label() {
        assert_eq!(TabularKind::Xls.label(), "EXCEL");
        assert_eq!(TabularKind::Xlsx.method(), ExtractionMethod::ExcelParser);
    }
}
