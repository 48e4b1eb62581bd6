#![allow(dead_code)]

use std::io::Cursor;

use image::{ImageFormat, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use snyfter::config::SnyfterConfig;
use snyfter::extractors::pdf::{PageLayout, PdfTableFinder};
use snyfter::ocr::{OcrEngine, OcrOutput, PageImage, PageRasterizer};

/// Text run: content, x, y
pub type Run<'a> = (&'a str, i64, i64);

/// One page per entry, Courier text placed at absolute positions
pub fn pdf(pages: &[Vec<Run>]) -> Vec<u8> {
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
        let content = Content { operations };
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

pub fn no_ocr() -> SnyfterConfig {
    let mut config = SnyfterConfig::default();
    config.ocr.enabled = false;
    config
}

/// Renders every page as a blank 100x100 PNG
pub struct BlankPages;

impl PageRasterizer for BlankPages {
    fn rasterize(&self, _pdf: &[u8], page_number: u32) -> Option<PageImage> {
        let mut bytes = Vec::new();
        RgbImage::new(100, 100)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .ok()?;
        Some(PageImage::new(bytes, format!("page {}", page_number)))
    }
}

/// Always "reads" the same roster
pub struct RosterOcr;

impl OcrEngine for RosterOcr {
    fn recognize(&self, _image: &PageImage) -> OcrOutput {
        OcrOutput {
            text: "Name    Score    Grade\nAlice    90    A\nBob    85    B".to_string(),
            confidence: 0.92,
        }
    }

    fn name(&self) -> &str {
        "roster"
    }
}

/// Table finder that blows up on every page
pub struct ExplodingFinder;

impl PdfTableFinder for ExplodingFinder {
    fn find_tables(&self, _document: &Document, page_number: u32) -> PageLayout {
        panic!("table finder crashed on page {}", page_number);
    }
}
