//! Format-specific extractors.
//!
//! Each extractor locates table regions in its native structure and hands
//! raw grids to the [`TableEngine`](crate::table::TableEngine). A candidate
//! that fails to build is skipped; an extractor never fails on tables.

pub mod docx;
pub mod html;
pub mod pdf;
pub mod tabular;
pub mod text;

use std::fmt;

use crate::error::SnyfterResult;
use crate::model::{Document, ProcessingMethod, Table};

pub use docx::DocxExtractor;
pub use html::HtmlExtractor;
pub use pdf::PdfExtractor;
pub use tabular::{CsvExcelLoader, Dataset, TabularKind, TabularLoader};
pub use text::TextExtractor;

/// Text pulled out of a document
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub used_ocr: bool,
    pub method: ProcessingMethod,
}

impl ExtractedText {
    pub fn new(text: String, used_ocr: bool, method: ProcessingMethod) -> Self {
        Self {
            text,
            used_ocr,
            method,
        }
    }
}

pub trait DocumentExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract_text(&self, content: &[u8]) -> SnyfterResult<ExtractedText>;

    /// Tables with dense, ordered indices. Zero tables is not an error.
    fn extract_tables(&self, content: &[u8]) -> Vec<Table>;

    /// Text, plus tables when `with_tables` is set, from one pass over the
    /// document
    fn extract(&self, content: &[u8], with_tables: bool) -> SnyfterResult<(ExtractedText, Vec<Table>)> {
        let text = self.extract_text(content)?;
        let tables = if with_tables {
            self.extract_tables(content)
        } else {
            Vec::new()
        };
        Ok((text, tables))
    }

    fn count_pages(&self, content: &[u8]) -> usize;
}

/// Document format the pipeline dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Pdf,
    Docx,
    Html,
    Text,
    Csv,
    Tsv,
    Xls,
    Xlsx,
}

impl FileKind {
    pub fn from_extension(extension: &str) -> Option<Self> {
        let kind = match extension.trim_start_matches('.').to_lowercase().as_str() {
            "pdf" => FileKind::Pdf,
            "docx" => FileKind::Docx,
            "html" | "htm" | "xhtml" | "mhtml" | "mht" => FileKind::Html,
            "txt" | "text" | "md" | "markdown" | "log" | "rst" => FileKind::Text,
            "csv" => FileKind::Csv,
            "tsv" | "tab" => FileKind::Tsv,
            "xls" => FileKind::Xls,
            "xlsx" | "xlsm" => FileKind::Xlsx,
            _ => return None,
        };
        Some(kind)
    }

    /// Guess from leading bytes; anything unrecognized is text
    pub fn sniff(content: &[u8]) -> Self {
        let head = &content[..content.len().min(1000)];

        if content.starts_with(b"%PDF") {
            return FileKind::Pdf;
        }
        if content.starts_with(b"PK\x03\x04") {
            if contains(head, b"word/") {
                return FileKind::Docx;
            }
            if contains(head, b"xl/") {
                return FileKind::Xlsx;
            }
        }

        let trimmed = content
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .map(|start| &content[start..])
            .unwrap_or_default();
        if trimmed.starts_with(b"<") {
            return FileKind::Html;
        }

        match sniff_delimiter(head) {
            Some(b'\t') => FileKind::Tsv,
            Some(_) => FileKind::Csv,
            None => FileKind::Text,
        }
    }

    /// Extension (or declared type) first, content sniffing otherwise
    pub fn detect(document: &Document) -> Self {
        document
            .extension()
            .and_then(|ext| Self::from_extension(&ext))
            .unwrap_or_else(|| Self::sniff(&document.content))
    }

    pub fn is_tabular(&self) -> bool {
        matches!(self, FileKind::Csv | FileKind::Tsv | FileKind::Xls | FileKind::Xlsx)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Docx => "docx",
            FileKind::Html => "html",
            FileKind::Text => "text",
            FileKind::Csv => "csv",
            FileKind::Tsv => "tsv",
            FileKind::Xls => "xls",
            FileKind::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short text that names a table, figure or chart
pub(crate) fn looks_like_caption(text: &str) -> bool {
    let lower = text.to_lowercase();
    text.chars().count() < 100 && ["table", "figure", "chart"].iter().any(|word| lower.contains(word))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Delimiter whose per-line count is identical over the first lines and
/// averages at least two
fn sniff_delimiter(head: &[u8]) -> Option<u8> {
    let text = std::str::from_utf8(head).ok()?;
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).take(10).collect();
    // a cut-off last line would skew the counts
    let lines = if head.len() == 1000 && lines.len() > 2 {
        &lines[..lines.len() - 1]
    } else {
        &lines[..]
    };
    if lines.len() < 2 {
        return None;
    }

    [b',', b'\t', b';', b'|'].into_iter().find(|&delimiter| {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| line.bytes().filter(|&b| b == delimiter).count())
            .collect();
        let first = counts[0];
        let average = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
        counts.iter().all(|&c| c == first) && average >= 2.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_mapping() {
        assert_eq!(FileKind::from_extension(".PDF"), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_extension("htm"), Some(FileKind::Html));
        assert_eq!(FileKind::from_extension("xlsx"), Some(FileKind::Xlsx));
        assert_eq!(FileKind::from_extension("weird"), None);
    }

    #[test]
    fn test_sniffing() {
        assert_eq!(FileKind::sniff(b"%PDF-1.5\n..."), FileKind::Pdf);
        assert_eq!(FileKind::sniff(b"PK\x03\x04....word/document.xml"), FileKind::Docx);
        assert_eq!(FileKind::sniff(b"PK\x03\x04....xl/workbook.xml"), FileKind::Xlsx);
        assert_eq!(FileKind::sniff(b"  \n<html><body></body></html>"), FileKind::Html);
        assert_eq!(FileKind::sniff(b"a,b,c\n1,2,3\n4,5,6\n"), FileKind::Csv);
        assert_eq!(FileKind::sniff(b"a\tb\tc\n1\t2\t3\n"), FileKind::Tsv);
        assert_eq!(FileKind::sniff(b"Hello, world.\nJust prose here.\n"), FileKind::Text);
    }

    #[test]
    fn test_caption_detection() {
        assert!(looks_like_caption("Table 3: Revenue by region"));
        assert!(looks_like_caption("See the chart below"));
        assert!(!looks_like_caption("Revenue by region"));
        assert!(!looks_like_caption(&format!("Table {}", "x".repeat(120))));
    }

    #[test]
    fn test_declared_type_wins_over_content() {
        let doc = Document::new("upload", b"%PDF-1.5".to_vec()).with_declared_type("txt");
        assert_eq!(FileKind::detect(&doc), FileKind::Text);

        let doc = Document::new("README", b"plain words".to_vec());
        assert_eq!(FileKind::detect(&doc), FileKind::Text);
    }
}
