use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, WINDOWS_1252};
use tracing::info;

use super::{DocumentExtractor, ExtractedText};
use crate::config::HeuristicsConfig;
use crate::error::{SnyfterError, SnyfterResult};
use crate::model::{ExtractionMethod, ProcessingMethod, Table};
use crate::table::TableEngine;

const MIN_TABLE_CONTENT: usize = 10;

/// Plain text, markdown and anything without a dedicated extractor
pub struct TextExtractor {
    engine: TableEngine,
}

impl TextExtractor {
    pub fn new(heuristics: &HeuristicsConfig) -> Self {
        Self {
            engine: TableEngine::new(heuristics),
        }
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new(&HeuristicsConfig::default())
    }
}

impl DocumentExtractor for TextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extract_text(&self, content: &[u8]) -> SnyfterResult<ExtractedText> {
        if content.is_empty() {
            return Err(SnyfterError::parse("text", "document is empty"));
        }

        Ok(ExtractedText::new(
            decode_text(content),
            false,
            ProcessingMethod::TextExtraction,
        ))
    }

    fn extract_tables(&self, content: &[u8]) -> Vec<Table> {
        if content.len() < MIN_TABLE_CONTENT {
            return Vec::new();
        }

        let text = decode_text(content);
        let tables = self
            .engine
            .build_all(self.engine.text_candidates(&text, ExtractionMethod::TextPattern));

        if !tables.is_empty() {
            info!("📊 Found {} text-pattern tables", tables.len());
        }
        tables
    }

    fn count_pages(&self, content: &[u8]) -> usize {
        if content.is_empty() {
            return 0;
        }
        estimate_pages(&decode_text(content))
    }
}

/// Decode bytes of unknown encoding, preferring the first candidate that
/// reads as text: BOM-marked UTF-8/16, plain UTF-8, then windows-1252.
pub fn decode_text(content: &[u8]) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(content) {
        let (text, _) = encoding.decode_without_bom_handling(&content[bom_len..]);
        return text.into_owned();
    }

    if let Ok(text) = std::str::from_utf8(content) {
        if is_valid_text(text) {
            return text.to_string();
        }
    }

    // BOM-less UTF-16 shows up as every other byte being NUL
    for encoding in [UTF_16LE, UTF_16BE] {
        if looks_like_utf16(content, encoding == UTF_16LE) {
            let (text, had_errors) = encoding.decode_without_bom_handling(content);
            if !had_errors && is_valid_text(&text) {
                return text.into_owned();
            }
        }
    }

    let (text, _, _) = WINDOWS_1252.decode(content);
    if is_valid_text(&text) {
        return text.into_owned();
    }

    String::from_utf8_lossy(content).into_owned()
}

fn looks_like_utf16(content: &[u8], little_endian: bool) -> bool {
    if content.len() < 4 || content.len() % 2 != 0 {
        return false;
    }
    let zero_slot = if little_endian { 1 } else { 0 };
    let zeros = content
        .chunks_exact(2)
        .filter(|pair| pair[zero_slot] == 0)
        .count();
    zeros * 2 > content.len() / 2
}

/// Low NUL ratio and mostly printable characters
pub fn is_valid_text(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    let total = text.chars().count() as f64;
    let nulls = text.chars().filter(|&c| c == '\0').count() as f64;
    if nulls / total > 0.1 {
        return false;
    }

    let printable = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .count() as f64;
    let printable_ratio = printable / total;

    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() > 1 {
        let average = lines.iter().map(|l| l.chars().count()).sum::<usize>() as f64 / lines.len() as f64;
        if average < 5.0 && printable_ratio < 0.9 {
            return false;
        }
    }

    printable_ratio > 0.7
}

/// Page estimate from line count and density
pub fn estimate_pages(text: &str) -> usize {
    let lines = text.matches('\n').count() + 1;

    let pages = if lines < 50 {
        1
    } else if lines < 200 {
        lines / 50
    } else {
        let chars_per_line = text.chars().count() as f64 / lines as f64;
        if chars_per_line > 80.0 {
            lines / 40
        } else {
            lines / 60
        }
    };

    pages.max(1)
}
