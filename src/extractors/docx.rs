//! Word documents: `word/document.xml` read with quick-xml out of the zip.

use std::io::{Cursor, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;
use tracing::{debug, info};
use zip::ZipArchive;

use super::{looks_like_caption, DocumentExtractor, ExtractedText};
use crate::config::HeuristicsConfig;
use crate::error::{ErrorContext, SnyfterError, SnyfterResult};
use crate::model::{ExtractionMethod, ProcessingMethod, Table};
use crate::ocr::{OcrGate, PageImage};
use crate::table::{HeaderSource, RawTable, TableEngine};

const DOC_XML_PATH: &str = "word/document.xml";
const MEDIA_PREFIX: &str = "word/media/";
const PARAGRAPHS_PER_PAGE: usize = 25;
const MAX_CONTEXT_CHARS: usize = 200;

/// Top-level body content in document order
#[derive(Debug, Clone, PartialEq)]
enum Block {
    Paragraph(String),
    Table { rows: Vec<Vec<String>>, page: u32 },
}

#[derive(Debug, Default)]
struct DocxBody {
    blocks: Vec<Block>,
    page_breaks: usize,
}

impl DocxBody {
    fn paragraph_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, Block::Paragraph(_)))
            .count()
    }

    /// First non-empty paragraph among `positions`, stopping at a table
    fn neighbour_paragraph(&self, mut positions: impl Iterator<Item = usize>) -> Option<String> {
        positions.find_map(|i| match &self.blocks[i] {
            Block::Paragraph(text) if text.is_empty() => None,
            Block::Paragraph(text) => Some(Some(text.clone())),
            Block::Table { .. } => Some(None),
        })?
    }
}

pub struct DocxExtractor {
    engine: TableEngine,
    ocr: OcrGate,
}

impl DocxExtractor {
    pub fn new(heuristics: &HeuristicsConfig, ocr: OcrGate) -> Self {
        Self {
            engine: TableEngine::new(heuristics),
            ocr,
        }
    }

    fn open(content: &[u8]) -> SnyfterResult<ZipArchive<Cursor<&[u8]>>> {
        ZipArchive::new(Cursor::new(content)).with_context("docx", "failed to open archive")
    }

    fn read_body(content: &[u8]) -> SnyfterResult<DocxBody> {
        let mut archive = Self::open(content)?;
        let mut file = archive
            .by_name(DOC_XML_PATH)
            .with_context("docx", "missing word/document.xml")?;
        let mut xml = String::new();
        file.read_to_string(&mut xml)
            .with_context("docx", "failed to read word/document.xml")?;

        parse_body(&xml)
    }

    /// OCR text of every embedded image the gate accepts
    fn image_text(&self, content: &[u8]) -> Vec<String> {
        if !self.ocr.is_enabled() {
            return Vec::new();
        }
        let Ok(mut archive) = Self::open(content) else {
            return Vec::new();
        };

        let names: Vec<String> = archive
            .file_names()
            .filter(|name| name.starts_with(MEDIA_PREFIX))
            .map(str::to_string)
            .collect();

        let mut texts = Vec::new();
        for name in names {
            let mut bytes = Vec::new();
            let read = archive
                .by_name(&name)
                .map_err(|e| e.to_string())
                .and_then(|mut file| file.read_to_end(&mut bytes).map_err(|e| e.to_string()));
            if let Err(e) = read {
                debug!("Could not read {}: {}", name, e);
                continue;
            }

            if let Some(output) = self.ocr.recognize(&PageImage::new(bytes, name.as_str())) {
                info!("🔍 OCR recovered {} chars from {}", output.text.len(), name);
                texts.push(output.text.trim().to_string());
            }
        }
        texts
    }
}

impl DocumentExtractor for DocxExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn extract_text(&self, content: &[u8]) -> SnyfterResult<ExtractedText> {
        let body = Self::read_body(content)?;

        let mut lines = Vec::new();
        for block in &body.blocks {
            match block {
                Block::Paragraph(text) if !text.is_empty() => lines.push(text.clone()),
                Block::Paragraph(_) => {}
                Block::Table { rows, .. } => {
                    lines.extend(rows.iter().map(|row| row.join(" | ")));
                }
            }
        }

        let image_text = self.image_text(content);
        let used_ocr = !image_text.is_empty();
        lines.extend(image_text.into_iter().map(|text| format!("[IMAGE TEXT]: {}", text)));

        let method = if used_ocr {
            ProcessingMethod::HybridWithOcr
        } else {
            ProcessingMethod::TextExtraction
        };
        Ok(ExtractedText::new(lines.join("\n"), used_ocr, method))
    }

    fn extract_tables(&self, content: &[u8]) -> Vec<Table> {
        let body = match Self::read_body(content) {
            Ok(body) => body,
            Err(e) => {
                debug!("No DOCX tables: {}", e);
                return Vec::new();
            }
        };

        let candidates: Vec<RawTable> = body
            .blocks
            .iter()
            .enumerate()
            .filter_map(|(i, block)| match block {
                Block::Table { rows, page } => {
                    let before = body.neighbour_paragraph((0..i).rev());
                    let after = body.neighbour_paragraph(i + 1..body.blocks.len());
                    let (title, before) = match before {
                        Some(text) if looks_like_caption(&text) => (Some(text), None),
                        Some(text) if text.chars().count() < MAX_CONTEXT_CHARS => (None, Some(text)),
                        _ => (None, None),
                    };

                    Some(
                        RawTable::new(rows.clone(), ExtractionMethod::DocxNativeTables)
                            .with_headers(HeaderSource::FirstRow)
                            .on_page(*page)
                            .with_title(title)
                            .with_context(before, after),
                    )
                }
                Block::Paragraph(_) => None,
            })
            .collect();

        let tables = self.engine.build_all(candidates);
        if !tables.is_empty() {
            info!("📊 Found {} DOCX tables", tables.len());
        }
        tables
    }

    fn count_pages(&self, content: &[u8]) -> usize {
        match Self::read_body(content) {
            Ok(body) => (body.paragraph_count() / PARAGRAPHS_PER_PAGE)
                .max(body.page_breaks + 1)
                .max(1),
            Err(_) => 0,
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_page_break(element: &BytesStart) -> bool {
    element
        .attributes()
        .flatten()
        .any(|attr| attr.key.local_name().as_ref() == b"type" && attr.value.as_ref() == b"page")
}

/// Walk the body once, collecting top-level paragraphs and tables. Nested
/// tables are flattened into the text of the enclosing cell.
fn parse_body(xml: &str) -> SnyfterResult<DocxBody> {
    let mut reader = XmlReader::from_str(xml);
    let mut buf = Vec::new();
    let mut body = DocxBody::default();

    let mut depth = 0usize;
    let mut in_text = false;
    let mut paragraph = String::new();
    let mut cell = String::new();
    let mut row: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut table_page = 1u32;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| SnyfterError::parse("docx", format!("malformed document.xml: {}", e)))?;

        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"tbl" => {
                    depth += 1;
                    if depth == 1 {
                        rows.clear();
                        table_page = body.page_breaks as u32 + 1;
                    }
                }
                b"tr" if depth == 1 => row.clear(),
                b"tc" if depth == 1 => cell.clear(),
                b"p" if depth == 0 => paragraph.clear(),
                b"t" => in_text = true,
                b"br" if is_page_break(&e) => body.page_breaks += 1,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"br" if is_page_break(&e) => body.page_breaks += 1,
                b"tab" | b"br" | b"cr" => {
                    if depth == 0 {
                        paragraph.push(' ');
                    } else {
                        cell.push(' ');
                    }
                }
                b"p" if depth == 0 => body.blocks.push(Block::Paragraph(String::new())),
                b"tc" if depth == 1 => row.push(String::new()),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| SnyfterError::parse("docx", format!("bad text escape: {}", e)))?;
                if depth == 0 {
                    paragraph.push_str(&text);
                } else {
                    cell.push_str(&text);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if depth == 0 => body
                    .blocks
                    .push(Block::Paragraph(collapse_whitespace(&paragraph))),
                b"p" => cell.push(' '),
                b"tc" if depth == 1 => row.push(collapse_whitespace(&cell)),
                b"tr" if depth == 1 => rows.push(std::mem::take(&mut row)),
                b"tbl" => {
                    if depth == 1 {
                        body.blocks.push(Block::Table {
                            rows: std::mem::take(&mut rows),
                            page: table_page,
                        });
                    }
                    depth = depth.saturating_sub(1);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(body)
}
