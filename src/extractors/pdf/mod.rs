//! PDF text and tables via lopdf, with OCR fallback for scanned pages.
//!
//! Tables come from an ordered per-page strategy chain. The first strategy
//! that yields at least one built table wins the page:
//!
//! 1. native grids from the [`PdfTableFinder`]
//! 2. OCR of the rasterized page
//! 3. text-pattern detection over the positioned page text
//!
//! Pages with enough native text still get their embedded images OCR'd.

pub mod layout;
pub mod ocr_tables;

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Document, Object, Stream};
use tracing::{debug, info, warn};

pub use layout::{BoundingBox, ContentStreamTableFinder, LayoutGrid, PageLayout, PdfTableFinder, TextBlock};

use self::layout::positioned_text;
use self::ocr_tables::ocr_grids;
use super::{looks_like_caption, DocumentExtractor, ExtractedText};
use crate::config::SnyfterConfig;
use crate::error::{SnyfterError, SnyfterResult};
use crate::model::{ExtractionMethod, ProcessingMethod, Table};
use crate::ocr::{OcrGate, OcrOutput, PageImage, PageRasterizer, PdftoppmRasterizer};
use crate::table::{HeaderSource, RawTable, TableEngine};

/// Vertical reach, in points, of a grid's caption and context blocks
const CONTEXT_WINDOW: f32 = 100.0;

/// Embedded images narrower or shorter than this are icons and rules
const MIN_EMBEDDED_IMAGE_SIZE: u32 = 100;

/// Page OCR results for one document, keyed by page number. Text and table
/// extraction share it so a page is rasterized and recognized once.
type PageOcr = HashMap<u32, Option<OcrOutput>>;

pub struct PdfExtractor {
    engine: TableEngine,
    finder: Arc<dyn PdfTableFinder>,
    rasterizer: Arc<dyn PageRasterizer>,
    ocr: OcrGate,
    table_confidence_threshold: f64,
    min_page_chars: usize,
}

impl PdfExtractor {
    pub fn new(config: &SnyfterConfig, ocr: OcrGate) -> Self {
        Self {
            engine: TableEngine::new(&config.heuristics),
            finder: Arc::new(ContentStreamTableFinder::default()),
            rasterizer: Arc::new(PdftoppmRasterizer::new(config.ocr.render_dpi)),
            ocr,
            table_confidence_threshold: config.ocr.table_confidence_threshold,
            min_page_chars: config.ocr.min_page_chars,
        }
    }

    pub fn with_finder(mut self, finder: Arc<dyn PdfTableFinder>) -> Self {
        self.finder = finder;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    fn load(content: &[u8]) -> SnyfterResult<Document> {
        Document::load_mem(content)
            .map_err(|e| SnyfterError::parse("pdf", format!("failed to load document: {}", e)))
    }

    fn ocr_page(&self, content: &[u8], page_number: u32, cache: &mut PageOcr) -> Option<OcrOutput> {
        if !self.ocr.is_enabled() {
            return None;
        }
        cache
            .entry(page_number)
            .or_insert_with(|| {
                let image = self.rasterizer.rasterize(content, page_number)?;
                self.ocr.recognize(&image)
            })
            .clone()
    }

    /// OCR of the page's embedded images that are big enough to hold text
    fn image_text(&self, document: &Document, page_number: u32) -> Vec<OcrOutput> {
        if !self.ocr.is_enabled() {
            return Vec::new();
        }
        embedded_images(document, page_number)
            .iter()
            .filter_map(|image| self.ocr.recognize(image))
            .collect()
    }

    /// Native text of one page; positioned runs first, lopdf's own
    /// extraction when those come up empty
    fn page_text(document: &Document, page_number: u32) -> String {
        let text = positioned_text(document, page_number);
        if !text.trim().is_empty() {
            return text;
        }
        document
            .extract_text(&[page_number])
            .map(|t| t.trim().to_string())
            .unwrap_or_default()
    }

    fn native_candidates(&self, document: &Document, page_number: u32) -> Vec<RawTable> {
        let layout = self.finder.find_tables(document, page_number);

        layout
            .grids
            .iter()
            .map(|grid| {
                let (title, context_before, context_after) = grid_context(grid, &layout.blocks);
                RawTable::new(grid.cells.clone(), ExtractionMethod::PymupdfTables)
                    .with_headers(HeaderSource::FirstRow)
                    .on_page(page_number)
                    .with_title(title)
                    .with_context(context_before, context_after)
            })
            .collect()
    }

    fn ocr_candidates(&self, content: &[u8], page_number: u32, cache: &mut PageOcr) -> Vec<RawTable> {
        let Some(output) = self.ocr_page(content, page_number, cache) else {
            return Vec::new();
        };
        if output.confidence <= self.table_confidence_threshold {
            debug!(
                "Page {}: OCR confidence {:.2} too low for table detection",
                page_number, output.confidence
            );
            return Vec::new();
        }

        ocr_grids(&output.text)
            .into_iter()
            .enumerate()
            .map(|(i, grid)| {
                RawTable::new(grid, ExtractionMethod::OcrPatternDetection)
                    .with_headers(HeaderSource::FirstRow)
                    .on_page(page_number)
                    .with_title(Some(format!("OCR Table {}", i + 1)))
            })
            .collect()
    }

    fn text_candidates(&self, document: &Document, page_number: u32) -> Vec<RawTable> {
        let text = Self::page_text(document, page_number);
        self.engine
            .text_candidates(&text, ExtractionMethod::TextPattern)
            .into_iter()
            .map(|raw| raw.on_page(page_number))
            .collect()
    }

    fn page_tables(
        &self,
        content: &[u8],
        document: &Document,
        page_number: u32,
        first_index: usize,
        cache: &mut PageOcr,
    ) -> Vec<Table> {
        let native = self
            .engine
            .build_all_from(self.native_candidates(document, page_number), first_index);
        if !native.is_empty() {
            return native;
        }

        let ocr = self
            .engine
            .build_all_from(self.ocr_candidates(content, page_number, cache), first_index);
        if !ocr.is_empty() {
            debug!("Page {}: {} tables from OCR", page_number, ocr.len());
            return ocr;
        }

        self.engine
            .build_all_from(self.text_candidates(document, page_number), first_index)
    }

    fn document_text(&self, content: &[u8], document: &Document, cache: &mut PageOcr) -> ExtractedText {
        let pages: Vec<u32> = document.get_pages().keys().copied().collect();

        let mut sections = Vec::with_capacity(pages.len());
        let mut ocr_pages = 0;
        let mut ocr_only_pages = 0;

        for &page_number in &pages {
            let native = Self::page_text(document, page_number);
            let mut section = native.clone();

            if native.chars().count() < self.min_page_chars {
                if let Some(output) = self.ocr_page(content, page_number, cache) {
                    info!(
                        "🔍 OCR recovered {} chars on page {} ({:.0}% confidence)",
                        output.text.len(),
                        page_number,
                        output.confidence * 100.0
                    );
                    append_marked(&mut section, &format!("[OCR TEXT FROM PAGE {}]", page_number), &output);
                    ocr_pages += 1;
                    if native.trim().is_empty() {
                        ocr_only_pages += 1;
                    }
                }
            } else {
                let images = self.image_text(document, page_number);
                if !images.is_empty() {
                    info!("🖼️ OCR read {} embedded images on page {}", images.len(), page_number);
                    for output in &images {
                        append_marked(&mut section, &format!("[IMAGE TEXT FROM PAGE {}]", page_number), output);
                    }
                    ocr_pages += 1;
                }
            }

            if !section.is_empty() {
                sections.push(section);
            }
        }

        let method = if !pages.is_empty() && ocr_only_pages == pages.len() {
            ProcessingMethod::Ocr
        } else if ocr_pages > 0 {
            ProcessingMethod::HybridWithOcr
        } else {
            ProcessingMethod::TextExtraction
        };

        ExtractedText::new(sections.join("\n\n"), ocr_pages > 0, method)
    }

    fn document_tables(&self, content: &[u8], document: &Document, cache: &mut PageOcr) -> Vec<Table> {
        let mut tables = Vec::new();
        for page_number in document.get_pages().keys().copied() {
            let page_tables = self.page_tables(content, document, page_number, tables.len(), cache);
            tables.extend(page_tables);
        }

        if !tables.is_empty() {
            info!("📊 Found {} PDF tables", tables.len());
        }
        tables
    }
}

fn append_marked(section: &mut String, marker: &str, output: &OcrOutput) {
    if !section.is_empty() {
        section.push('\n');
    }
    section.push_str(marker);
    section.push('\n');
    section.push_str(output.text.trim());
}

/// Image XObjects of one page at least [`MIN_EMBEDDED_IMAGE_SIZE`] on
/// both sides, re-encoded where needed so the OCR engine can read them
fn embedded_images(document: &Document, page_number: u32) -> Vec<PageImage> {
    let Some(&page_id) = document.get_pages().get(&page_number) else {
        return Vec::new();
    };
    let (direct, inherited) = document.get_page_resources(page_id);
    let resources = direct
        .into_iter()
        .chain(inherited.into_iter().filter_map(|id| document.get_dictionary(id).ok()));

    let mut seen = HashSet::new();
    let mut images = Vec::new();
    for resource in resources {
        let Ok(xobjects) = resource
            .get(b"XObject")
            .and_then(|object| document.dereference(object))
            .and_then(|(_, object)| object.as_dict())
        else {
            continue;
        };

        for (name, object) in xobjects.iter() {
            let Ok((id, Object::Stream(stream))) = document.dereference(object) else {
                continue;
            };
            if id.is_some_and(|id| !seen.insert(id)) {
                continue;
            }
            if stream.dict.get(b"Subtype").and_then(Object::as_name_str).ok() != Some("Image") {
                continue;
            }

            let (Some(width), Some(height)) = (dimension(stream, b"Width"), dimension(stream, b"Height")) else {
                continue;
            };
            let label = format!("page {} image {}", page_number, String::from_utf8_lossy(name));
            if width < MIN_EMBEDDED_IMAGE_SIZE || height < MIN_EMBEDDED_IMAGE_SIZE {
                debug!("Skipping {}: {}x{}", label, width, height);
                continue;
            }

            match image_bytes(stream, width, height) {
                Some(bytes) => images.push(PageImage::new(bytes, label)),
                None => debug!("Skipping {}: unsupported encoding", label),
            }
        }
    }
    images
}

fn dimension(stream: &Stream, key: &[u8]) -> Option<u32> {
    let value = stream.dict.get(key).and_then(Object::as_i64).ok()?;
    u32::try_from(value).ok()
}

/// JPEG data as stored; raw 8-bit gray or RGB samples become PNG
fn image_bytes(stream: &Stream, width: u32, height: u32) -> Option<Vec<u8>> {
    let filters = stream.filters().unwrap_or_default();
    if filters.iter().any(|f| f == "DCTDecode") {
        return Some(stream.content.clone());
    }

    let samples = if filters.is_empty() {
        stream.content.clone()
    } else {
        // lopdf only decodes streams that are not tagged as images
        let mut plain = stream.clone();
        plain.dict.remove(b"Subtype");
        plain.decompressed_content().ok()?
    };

    if stream.dict.get(b"BitsPerComponent").and_then(Object::as_i64).ok() != Some(8) {
        return None;
    }
    let decoded = match stream.dict.get(b"ColorSpace").and_then(Object::as_name_str).ok() {
        Some("DeviceGray") => DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, samples)?),
        Some("DeviceRGB") => DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, samples)?),
        _ => return None,
    };

    let mut png = Vec::new();
    decoded.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).ok()?;
    Some(png)
}

/// Title, context before and context after for a grid, taken from the
/// nearest text blocks within [`CONTEXT_WINDOW`] above and below it
fn grid_context(grid: &LayoutGrid, blocks: &[TextBlock]) -> (Option<String>, Option<String>, Option<String>) {
    let within = |gap: f32| (-1.0..=CONTEXT_WINDOW).contains(&gap);

    let above = blocks
        .iter()
        .map(|block| (grid.bbox.gap_to_above(&block.bbox), block))
        .filter(|(gap, _)| within(*gap))
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, block)| block.text.trim().to_string());

    let below = blocks
        .iter()
        .map(|block| (grid.bbox.gap_to_below(&block.bbox), block))
        .filter(|(gap, _)| within(*gap))
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, block)| block.text.trim().to_string());

    match above {
        Some(text) if looks_like_caption(&text) => (Some(text), None, below),
        other => (None, other, below),
    }
}

impl DocumentExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extract_text(&self, content: &[u8]) -> SnyfterResult<ExtractedText> {
        let document = Self::load(content)?;
        Ok(self.document_text(content, &document, &mut PageOcr::new()))
    }

    fn extract_tables(&self, content: &[u8]) -> Vec<Table> {
        match Self::load(content) {
            Ok(document) => self.document_tables(content, &document, &mut PageOcr::new()),
            Err(e) => {
                warn!("⚠️ Skipping PDF tables: {}", e);
                Vec::new()
            }
        }
    }

    /// One load and one OCR pass per page for both text and tables
    fn extract(&self, content: &[u8], with_tables: bool) -> SnyfterResult<(ExtractedText, Vec<Table>)> {
        let document = Self::load(content)?;
        let mut cache = PageOcr::new();

        let text = self.document_text(content, &document, &mut cache);
        let tables = if with_tables {
            self.document_tables(content, &document, &mut cache)
        } else {
            Vec::new()
        };
        Ok((text, tables))
    }

    fn count_pages(&self, content: &[u8]) -> usize {
        Self::load(content)
            .map(|document| document.get_pages().len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcrConfig;
    use crate::ocr::{OcrEngine, PageImage};
    use image::{ImageFormat, RgbImage};
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Run<'a> = (&'a str, i64, i64);

    fn pdf(pages: &[Vec<Run>]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut page_ids = Vec::new();
        for runs in pages {
            let content = Content {
                operations: text_operations(runs),
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            page_ids.push(doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            }));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => page_ids.iter().map(|id| (*id).into()).collect::<Vec<Object>>(),
                "Count" => page_ids.len() as i64,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn text_operations(runs: &[Run]) -> Vec<Operation> {
        let mut operations = Vec::new();
        for (text, x, y) in runs {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
            operations.push(Operation::new(
                "Tm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), (*x).into(), (*y).into()],
            ));
            operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
            operations.push(Operation::new("ET", vec![]));
        }
        operations
    }

    /// One page of text with JPEG image XObjects of the given sizes
    fn pdf_with_images(runs: &[Run], sizes: &[(u32, u32)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });

        let mut xobjects = lopdf::Dictionary::new();
        let mut operations = Vec::new();
        for (i, &(width, height)) in sizes.iter().enumerate() {
            let mut jpeg = Vec::new();
            RgbImage::new(width, height)
                .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
                .unwrap();
            let image_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                jpeg,
            ));
            let name = format!("Im{}", i + 1);
            xobjects.set(name.clone(), image_id);
            operations.push(Operation::new("q", vec![]));
            operations.push(Operation::new(
                "cm",
                vec![(width as i64).into(), 0.into(), 0.into(), (height as i64).into(), 72.into(), 300.into()],
            ));
            operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
            operations.push(Operation::new("Q", vec![]));
        }
        operations.extend(text_operations(runs));

        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "XObject" => xobjects,
        });
        let content_id = doc.add_object(Stream::new(dictionary! {}, Content { operations }.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn sales_page(caption: &'static str) -> Vec<Run<'static>> {
        vec![
            (caption, 72, 700),
            ("Region", 72, 680),
            ("Q1", 200, 680),
            ("Q2", 300, 680),
            ("North", 72, 664),
            ("$1,200", 200, 664),
            ("$1,350", 300, 664),
            ("South", 72, 648),
            ("$980", 200, 648),
            ("$1,010", 300, 648),
            ("Figures are unaudited.", 72, 620),
        ]
    }

    fn no_ocr() -> SnyfterConfig {
        let mut config = SnyfterConfig::default();
        config.ocr.enabled = false;
        config
    }

    struct StubRasterizer;

    impl PageRasterizer for StubRasterizer {
        fn rasterize(&self, _pdf: &[u8], page_number: u32) -> Option<PageImage> {
            let mut bytes = Vec::new();
            RgbImage::new(100, 100)
                .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                .ok()?;
            Some(PageImage::new(bytes, format!("page {}", page_number)))
        }
    }

    struct StubOcr;

    impl OcrEngine for StubOcr {
        fn recognize(&self, _image: &PageImage) -> OcrOutput {
            OcrOutput {
                text: "Name    Score    Grade\nAlice    90    A\nBob    85    B".to_string(),
                confidence: 0.9,
            }
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    struct NoTables;

    impl PdfTableFinder for NoTables {
        fn find_tables(&self, _document: &Document, _page_number: u32) -> PageLayout {
            PageLayout::default()
        }
    }

    /// Counts recognitions; reads like [`StubOcr`]
    struct CountingOcr(Arc<AtomicUsize>);

    impl OcrEngine for CountingOcr {
        fn recognize(&self, image: &PageImage) -> OcrOutput {
            self.0.fetch_add(1, Ordering::SeqCst);
            StubOcr.recognize(image)
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn ocr_extractor() -> PdfExtractor {
        let gate = OcrGate::new(Arc::new(StubOcr), &OcrConfig::default());
        PdfExtractor::new(&SnyfterConfig::default(), gate).with_rasterizer(Arc::new(StubRasterizer))
    }

    #[test]
    fn test_native_tables_with_context() {
        let content = pdf(&[sales_page("Table 1: Quarterly sales"), sales_page("Regional totals")]);
        let extractor = PdfExtractor::new(&no_ocr(), OcrGate::disabled());
        let tables = extractor.extract_tables(&content);

        assert_eq!(tables.len(), 2);
        let first = &tables[0];
        assert_eq!(first.index(), 0);
        assert_eq!(first.page(), Some(1));
        assert_eq!(first.headers().unwrap(), ["Region", "Q1", "Q2"]);
        assert_eq!(first.rows()[1], vec!["South", "$980", "$1,010"]);
        assert_eq!(first.extraction_method(), ExtractionMethod::PymupdfTables);
        assert_eq!(first.confidence_score(), 0.95);
        assert_eq!(first.title(), Some("Table 1: Quarterly sales"));
        assert_eq!(first.context_before(), None);
        assert_eq!(first.context_after(), Some("Figures are unaudited."));

        // no caption keyword, so the block above is plain context
        let second = &tables[1];
        assert_eq!(second.index(), 1);
        assert_eq!(second.page(), Some(2));
        assert_eq!(second.title(), None);
        assert_eq!(second.context_before(), Some("Regional totals"));
    }

    #[test]
    fn test_native_text_without_ocr() {
        let content = pdf(&[sales_page("Table 1: Quarterly sales")]);
        let extractor = PdfExtractor::new(&no_ocr(), OcrGate::disabled());

        let extracted = extractor.extract_text(&content).unwrap();
        assert!(extracted.text.starts_with("Table 1: Quarterly sales\nRegion    Q1    Q2"));
        assert!(!extracted.used_ocr);
        assert_eq!(extracted.method, ProcessingMethod::TextExtraction);
        assert_eq!(extractor.count_pages(&content), 1);
    }

    #[test]
    fn test_scanned_page_falls_back_to_ocr() {
        let content = pdf(&[vec![]]);
        let extractor = ocr_extractor();

        let tables = extractor.extract_tables(&content);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].headers().unwrap(), ["Name", "Score", "Grade"]);
        assert_eq!(tables[0].row_count(), 2);
        assert_eq!(tables[0].title(), Some("OCR Table 1"));
        assert_eq!(tables[0].extraction_method(), ExtractionMethod::OcrPatternDetection);
        assert_eq!(tables[0].confidence_score(), 0.7);

        let extracted = extractor.extract_text(&content).unwrap();
        assert!(extracted.used_ocr);
        assert_eq!(extracted.method, ProcessingMethod::Ocr);
        assert!(extracted.text.starts_with("[OCR TEXT FROM PAGE 1]\nName"));
    }

    #[test]
    fn test_sparse_page_is_hybrid() {
        let content = pdf(&[sales_page("Table 1: Quarterly sales"), vec![("Page two", 72, 700)]]);
        let extracted = ocr_extractor().extract_text(&content).unwrap();

        assert_eq!(extracted.method, ProcessingMethod::HybridWithOcr);
        assert!(extracted.text.contains("Page two\n[OCR TEXT FROM PAGE 2]"));
        assert!(!extracted.text.contains("[OCR TEXT FROM PAGE 1]"));
    }

    #[test]
    fn test_text_pattern_is_last_resort() {
        let content = pdf(&[vec![
            ("Name", 72, 700),
            ("Age", 200, 700),
            ("City", 300, 700),
            ("Alice", 72, 684),
            ("30", 200, 684),
            ("NYC", 300, 684),
            ("Bob", 72, 668),
            ("25", 200, 668),
            ("LA", 300, 668),
        ]]);
        let extractor = PdfExtractor::new(&no_ocr(), OcrGate::disabled()).with_finder(Arc::new(NoTables));
        let tables = extractor.extract_tables(&content);

        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].extraction_method(), ExtractionMethod::TextPattern);
        assert_eq!(tables[0].page(), Some(1));
        assert_eq!(tables[0].headers().unwrap(), ["Name", "Age", "City"]);
    }

    #[test]
    fn test_embedded_images_on_text_pages_are_ocrd() {
        // 60x60 is below the embedded image floor and never reaches the engine
        let content = pdf_with_images(&sales_page("Table 1: Quarterly sales"), &[(240, 120), (60, 60)]);
        let extracted = ocr_extractor().extract_text(&content).unwrap();

        assert!(extracted.used_ocr);
        assert_eq!(extracted.method, ProcessingMethod::HybridWithOcr);
        assert!(extracted.text.starts_with("Table 1: Quarterly sales"));
        assert!(extracted.text.contains("[IMAGE TEXT FROM PAGE 1]\nName    Score    Grade"));
        assert_eq!(extracted.text.matches("[IMAGE TEXT FROM PAGE 1]").count(), 1);
        assert!(!extracted.text.contains("[OCR TEXT FROM PAGE 1]"));

        let disabled = PdfExtractor::new(&no_ocr(), OcrGate::disabled());
        let extracted = disabled.extract_text(&content).unwrap();
        assert_eq!(extracted.method, ProcessingMethod::TextExtraction);
        assert!(!extracted.text.contains("[IMAGE TEXT"));
    }

    #[test]
    fn test_sparse_page_is_recognized_once_per_extraction() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = OcrGate::new(Arc::new(CountingOcr(calls.clone())), &OcrConfig::default());
        let extractor =
            PdfExtractor::new(&SnyfterConfig::default(), gate).with_rasterizer(Arc::new(StubRasterizer));
        let content = pdf(&[sales_page("Table 1: Quarterly sales"), vec![("Page two", 72, 700)]]);

        let (text, tables) = extractor.extract(&content, true).unwrap();
        assert_eq!(text.method, ProcessingMethod::HybridWithOcr);
        assert!(text.text.contains("[OCR TEXT FROM PAGE 2]"));
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].extraction_method(), ExtractionMethod::OcrPatternDetection);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // separate calls keep nothing between them
        extractor.extract_text(&content).unwrap();
        extractor.extract_tables(&content);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_broken_pdf() {
        let extractor = PdfExtractor::new(&no_ocr(), OcrGate::disabled());
        assert!(extractor.extract_text(b"%PDF-1.5 garbage").is_err());
        assert!(extractor.extract_tables(b"%PDF-1.5 garbage").is_empty());
        assert_eq!(extractor.count_pages(b"%PDF-1.5 garbage"), 0);
    }
}
