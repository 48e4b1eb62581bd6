use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::config::HeuristicsConfig;
use crate::model::ColumnType;

const HEADER_KEYWORDS: [&str; 6] = ["name", "type", "date", "amount", "total", "count"];
const CURRENCY_SYMBOLS: [char; 4] = ['$', '€', '£', '¥'];

/// Why a grid was rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructureIssue {
    #[error("no data rows")]
    NoDataRows,

    #[error("no columns")]
    NoColumns,

    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRows { row: usize, expected: usize, found: usize },

    #[error("{headers} headers for {columns} data columns")]
    HeaderMismatch { headers: usize, columns: usize },

    #[error("only {fill_ratio:.2} of cells have content")]
    TooSparse { fill_ratio: f64 },
}

fn date_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"\d{1,2}/\d{1,2}/\d{2,4}",
            r"\d{1,2}-\d{1,2}-\d{2,4}",
            r"\d{4}-\d{1,2}-\d{1,2}",
            r"(?i)(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)",
            r"(?i)(january|february|march|april|may|june|july|august|september|october|november|december)",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

/// Header, column type and structure decisions for a cell grid
#[derive(Debug, Clone)]
pub struct TableClassifier {
    header_threshold: f64,
    type_threshold: f64,
    min_fill_ratio: f64,
}

impl Default for TableClassifier {
    fn default() -> Self {
        Self::new(&HeuristicsConfig::default())
    }
}

impl TableClassifier {
    pub fn new(config: &HeuristicsConfig) -> Self {
        Self {
            header_threshold: config.header_threshold,
            type_threshold: config.type_threshold,
            min_fill_ratio: config.min_fill_ratio,
        }
    }

    /// Header likelihood of a row
    pub fn header_score(&self, row: &[String]) -> f64 {
        let mut score = 0.0;

        for cell in row.iter().filter(|cell| !cell.trim().is_empty()) {
            if !is_plain_number(cell) {
                score += 1.0;
            }
            if cell.chars().count() < 50 {
                score += 0.5;
            }
            let lower = cell.to_lowercase();
            if HEADER_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
                score += 1.0;
            }
        }

        score
    }

    pub fn looks_like_header(&self, row: &[String]) -> bool {
        let non_empty = row.iter().filter(|cell| !cell.trim().is_empty()).count();
        if non_empty == 0 {
            return false;
        }
        self.header_score(row) >= non_empty as f64 * self.header_threshold
    }

    /// Split off the first row when it reads as a header
    pub fn split_header(&self, mut rows: Vec<Vec<String>>) -> (Option<Vec<String>>, Vec<Vec<String>>) {
        if rows.len() <= 1 {
            return (None, rows);
        }

        if self.looks_like_header(&rows[0]) {
            let headers = rows.remove(0);
            (Some(headers), rows)
        } else {
            (None, rows)
        }
    }

    pub fn infer_column_types(&self, rows: &[Vec<String>], column_count: usize) -> Vec<ColumnType> {
        (0..column_count)
            .map(|col| {
                self.infer_column_type(rows.iter().filter_map(|row| row.get(col).map(String::as_str)))
            })
            .collect()
    }

    /// First of currency, percentage, date, numeric reaching the threshold
    pub fn infer_column_type<'a>(&self, values: impl Iterator<Item = &'a str>) -> ColumnType {
        let values: Vec<&str> = values.map(str::trim).filter(|v| !v.is_empty()).collect();
        if values.is_empty() {
            return ColumnType::Text;
        }

        let total = values.len() as f64;
        let fraction = |predicate: fn(&str) -> bool| {
            values.iter().filter(|v| predicate(v)).count() as f64 / total
        };

        if fraction(is_currency) >= self.type_threshold {
            ColumnType::Currency
        } else if fraction(is_percentage) >= self.type_threshold {
            ColumnType::Percentage
        } else if fraction(is_date) >= self.type_threshold {
            ColumnType::Date
        } else if fraction(is_numeric) >= self.type_threshold {
            ColumnType::Numeric
        } else {
            ColumnType::Text
        }
    }

    /// Reject ragged, mismatched, empty or mostly blank grids
    pub fn validate(&self, headers: Option<&[String]>, rows: &[Vec<String>]) -> Result<(), StructureIssue> {
        let first = rows.first().ok_or(StructureIssue::NoDataRows)?;
        let expected = first.len();
        if expected == 0 {
            return Err(StructureIssue::NoColumns);
        }

        for (i, row) in rows.iter().enumerate().skip(1) {
            if row.len() != expected {
                return Err(StructureIssue::RaggedRows {
                    row: i,
                    expected,
                    found: row.len(),
                });
            }
        }

        if let Some(headers) = headers {
            if headers.len() != expected {
                return Err(StructureIssue::HeaderMismatch {
                    headers: headers.len(),
                    columns: expected,
                });
            }
        }

        let total = rows.len() * expected;
        let filled = rows
            .iter()
            .flatten()
            .filter(|cell| !cell.trim().is_empty())
            .count();
        let fill_ratio = filled as f64 / total as f64;
        if fill_ratio < self.min_fill_ratio {
            return Err(StructureIssue::TooSparse { fill_ratio });
        }

        Ok(())
    }
}

fn is_plain_number(cell: &str) -> bool {
    let stripped: String = cell
        .chars()
        .filter(|c| !matches!(c, '%' | '$' | ',' | '.'))
        .collect();
    !stripped.is_empty() && stripped.chars().all(|c| c.is_numeric())
}

fn is_currency(value: &str) -> bool {
    value.contains(&CURRENCY_SYMBOLS[..])
}

fn is_percentage(value: &str) -> bool {
    value.contains('%')
}

fn is_date(value: &str) -> bool {
    date_patterns().iter().any(|pattern| pattern.is_match(value))
}

fn is_numeric(value: &str) -> bool {
    let stripped: String = value.chars().filter(|c| !matches!(c, '$' | ',')).collect();
    !stripped.is_empty()
        && stripped
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
}
