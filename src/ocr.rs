//! OCR and page rasterization capabilities.
//!
//! Both are external programs treated as black boxes. Neither ever fails:
//! a missing binary or unreadable image simply yields no result.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::process::Command;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{ImageFormat, ImageReader};
use tempfile::{Builder, TempDir};
use tracing::{debug, warn};

use crate::config::OcrConfig;

/// Encoded raster image (PNG or JPEG bytes)
#[derive(Debug, Clone)]
pub struct PageImage {
    pub bytes: Vec<u8>,
    /// Where the image came from, for logging
    pub label: String,
}

impl PageImage {
    pub fn new(bytes: Vec<u8>, label: impl Into<String>) -> Self {
        Self {
            bytes,
            label: label.into(),
        }
    }

    /// Width and height read from the image header
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        ImageReader::new(Cursor::new(&self.bytes))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OcrOutput {
    pub text: String,
    /// Mean word confidence in [0, 1]
    pub confidence: f64,
}

impl OcrOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &PageImage) -> OcrOutput;

    fn name(&self) -> &str;
}

/// Engine used when OCR is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOcr;

impl OcrEngine for NoopOcr {
    fn recognize(&self, _image: &PageImage) -> OcrOutput {
        OcrOutput::empty()
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// `tesseract` CLI in TSV mode
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: String,
    language: String,
}

impl TesseractOcr {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: language.into(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn run(&self, image: &PageImage) -> std::io::Result<Option<String>> {
        let mut file = Builder::new().prefix("snyfter-ocr-").tempfile()?;
        file.write_all(&image.bytes)?;
        file.flush()?;

        let output = Command::new(&self.binary)
            .arg(file.path())
            .arg("stdout")
            .args(["-l", &self.language, "--oem", "3", "--psm", "6", "tsv"])
            .output()?;

        if !output.status.success() {
            debug!(
                "tesseract failed on {}: {}",
                image.label,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }

        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &PageImage) -> OcrOutput {
        match self.run(image) {
            Ok(Some(tsv)) => parse_tesseract_tsv(&tsv),
            Ok(None) => OcrOutput::empty(),
            Err(e) => {
                warn!("⚠️ Could not run {}: {}", self.binary, e);
                OcrOutput::empty()
            }
        }
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

struct Word {
    left: i64,
    width: i64,
    height: i64,
    text: String,
}

/// Rebuild lines from tesseract TSV, keeping wide horizontal gaps as
/// multi-space runs so column layouts survive.
pub fn parse_tesseract_tsv(tsv: &str) -> OcrOutput {
    let mut lines: BTreeMap<(i64, i64, i64, i64), Vec<Word>> = BTreeMap::new();
    let mut confidences = Vec::new();

    for record in tsv.lines().skip(1) {
        let fields: Vec<&str> = record.split('\t').collect();
        if fields.len() < 12 || fields[0] != "5" {
            continue;
        }
        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }

        let number = |i: usize| fields[i].trim().parse::<f64>().unwrap_or(-1.0);
        let conf = number(10);
        if conf > 0.0 {
            confidences.push(conf);
        }

        let key = (number(1) as i64, number(2) as i64, number(3) as i64, number(4) as i64);
        lines.entry(key).or_default().push(Word {
            left: number(6) as i64,
            width: number(8) as i64,
            height: number(9) as i64,
            text: text.to_string(),
        });
    }

    if confidences.is_empty() {
        return OcrOutput::empty();
    }

    let text = lines
        .into_values()
        .map(|mut words| {
            words.sort_by_key(|w| w.left);
            join_words(&words)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let confidence = confidences.iter().sum::<f64>() / confidences.len() as f64 / 100.0;

    OcrOutput {
        text,
        confidence: confidence.clamp(0.0, 1.0),
    }
}

fn join_words(words: &[Word]) -> String {
    let mut line = String::new();
    let mut previous_right: Option<i64> = None;

    for word in words {
        if let Some(right) = previous_right {
            // a gap wider than the glyph height separates columns
            if word.left - right > word.height.max(1) {
                line.push_str("    ");
            } else {
                line.push(' ');
            }
        }
        line.push_str(&word.text);
        previous_right = Some(word.left + word.width);
    }

    line
}

/// OCR engine plus the configured acceptance thresholds
#[derive(Clone)]
pub struct OcrGate {
    engine: Arc<dyn OcrEngine>,
    enabled: bool,
    confidence_threshold: f64,
    min_image_size: u32,
    max_image_size: u32,
}

impl OcrGate {
    pub fn new(engine: Arc<dyn OcrEngine>, config: &OcrConfig) -> Self {
        Self {
            engine,
            enabled: config.enabled,
            confidence_threshold: config.confidence_threshold,
            min_image_size: config.min_image_size,
            max_image_size: config.max_image_size,
        }
    }

    /// Tesseract when enabled, otherwise a gate that never recognizes anything
    pub fn from_config(config: &OcrConfig) -> Self {
        if config.enabled {
            Self::new(Arc::new(TesseractOcr::new(config.language.clone())), config)
        } else {
            Self::disabled()
        }
    }

    pub fn disabled() -> Self {
        Self::new(
            Arc::new(NoopOcr),
            &OcrConfig {
                enabled: false,
                ..OcrConfig::default()
            },
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Size check against the configured floor; unreadable images are
    /// rejected. Oversized images are accepted and shrunk before recognition.
    pub fn accepts(&self, image: &PageImage) -> bool {
        match image.dimensions() {
            Some((width, height)) if width.min(height) < self.min_image_size => {
                debug!("Image {} too small: {}x{}", image.label, width, height);
                false
            }
            Some(_) => true,
            None => {
                debug!("Image {} has an unknown format", image.label);
                false
            }
        }
    }

    /// The image itself if it fits within `max_image_size`, otherwise a PNG
    /// downscaled to fit with its aspect ratio kept
    pub fn fit<'a>(&self, image: &'a PageImage) -> Option<Cow<'a, PageImage>> {
        let (width, height) = image.dimensions()?;
        if width.max(height) <= self.max_image_size {
            return Some(Cow::Borrowed(image));
        }

        let decoded = match image::load_from_memory(&image.bytes) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("⚠️ Could not decode {} for downscaling: {}", image.label, e);
                return None;
            }
        };
        let scaled = decoded.resize(self.max_image_size, self.max_image_size, FilterType::Triangle);
        debug!(
            "Downscaled {} from {}x{} to {}x{}",
            image.label,
            width,
            height,
            scaled.width(),
            scaled.height()
        );

        let mut bytes = Vec::new();
        if let Err(e) = scaled.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png) {
            warn!("⚠️ Could not re-encode {}: {}", image.label, e);
            return None;
        }
        Some(Cow::Owned(PageImage::new(bytes, image.label.clone())))
    }

    /// Recognized text, or `None` if the image was rejected or the text is
    /// empty or below the confidence threshold
    pub fn recognize(&self, image: &PageImage) -> Option<OcrOutput> {
        if !self.enabled || !self.accepts(image) {
            return None;
        }
        let image = self.fit(image)?;

        let output = self.engine.recognize(&image);
        if output.is_empty() {
            return None;
        }
        if output.confidence < self.confidence_threshold {
            debug!(
                "OCR text for {} below threshold: {:.2} < {:.2}",
                image.label, output.confidence, self.confidence_threshold
            );
            return None;
        }

        Some(output)
    }
}

pub trait PageRasterizer: Send + Sync {
    /// Render one 1-based page of a PDF
    fn rasterize(&self, pdf: &[u8], page_number: u32) -> Option<PageImage>;
}

/// `pdftoppm` from poppler
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    dpi: u32,
}

impl PdftoppmRasterizer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }

    fn render(&self, pdf: &[u8], page_number: u32) -> std::io::Result<Option<Vec<u8>>> {
        let dir = TempDir::new()?;
        let input = dir.path().join("page.pdf");
        std::fs::write(&input, pdf)?;
        let prefix = dir.path().join("render");

        let page = page_number.to_string();
        let output = Command::new("pdftoppm")
            .args(["-png", "-singlefile", "-r", &self.dpi.to_string(), "-f", &page, "-l", &page])
            .arg(&input)
            .arg(&prefix)
            .output()?;

        if !output.status.success() {
            debug!(
                "pdftoppm failed on page {}: {}",
                page_number,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }

        let png = prefix.with_extension("png");
        if png.exists() {
            Ok(Some(std::fs::read(png)?))
        } else {
            Ok(None)
        }
    }
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new(300)
    }
}

impl PageRasterizer for PdftoppmRasterizer {
    fn rasterize(&self, pdf: &[u8], page_number: u32) -> Option<PageImage> {
        match self.render(pdf, page_number) {
            Ok(Some(bytes)) => Some(PageImage::new(bytes, format!("page {}", page_number))),
            Ok(None) => None,
            Err(e) => {
                warn!("⚠️ Could not rasterize page {}: {}", page_number, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    struct FixedOcr(OcrOutput);

    impl OcrEngine for FixedOcr {
        fn recognize(&self, _image: &PageImage) -> OcrOutput {
            self.0.clone()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn png(width: u32, height: u32) -> PageImage {
        let mut bytes = Vec::new();
        RgbImage::new(width, height)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        PageImage::new(bytes, "test")
    }

    fn gate(text: &str, confidence: f64) -> OcrGate {
        OcrGate::new(
            Arc::new(FixedOcr(OcrOutput {
                text: text.to_string(),
                confidence,
            })),
            &OcrConfig::default(),
        )
    }

    #[test]
    fn test_tsv_lines_keep_column_gaps() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   1\t1\t0\t0\t0\t0\t0\t0\t800\t600\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t10\t10\t40\t12\t90\tItem\n\
                   5\t1\t1\t1\t1\t2\t200\t10\t40\t12\t80\tPrice\n\
                   5\t1\t1\t1\t2\t1\t10\t30\t30\t12\t70\tPen\n\
                   5\t1\t1\t1\t2\t2\t44\t30\t20\t12\t60\tred\n";
        let output = parse_tesseract_tsv(tsv);

        assert_eq!(output.text, "Item    Price\nPen red");
        assert!((output.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_tsv_without_words_is_empty() {
        assert_eq!(parse_tesseract_tsv("level\tpage_num\n"), OcrOutput::empty());
    }

    #[test]
    fn test_gate_applies_confidence_threshold() {
        let image = png(100, 100);
        assert!(gate("hello", 0.05).recognize(&image).is_none());
        assert_eq!(gate("hello", 0.5).recognize(&image).unwrap().text, "hello");
        assert!(gate("   ", 0.9).recognize(&image).is_none());
    }

    /// Reports the size of the image it was given
    struct SizeOcr;

    impl OcrEngine for SizeOcr {
        fn recognize(&self, image: &PageImage) -> OcrOutput {
            let (width, height) = image.dimensions().unwrap_or_default();
            OcrOutput {
                text: format!("{}x{}", width, height),
                confidence: 0.9,
            }
        }

        fn name(&self) -> &str {
            "size"
        }
    }

    #[test]
    fn test_gate_rejects_small_and_unreadable_images() {
        let g = gate("hello", 0.9);
        assert!(!g.accepts(&png(20, 400)));
        assert!(g.accepts(&png(60, 400)));
        assert!(g.accepts(&png(5000, 400)));
        assert!(!g.accepts(&PageImage::new(b"not an image".to_vec(), "junk")));
    }

    #[test]
    fn test_oversized_images_are_downscaled() {
        let g = OcrGate::new(Arc::new(SizeOcr), &OcrConfig::default());
        assert_eq!(g.recognize(&png(4800, 600)).unwrap().text, "4096x512");

        let small = png(200, 100);
        assert!(matches!(g.fit(&small), Some(Cow::Borrowed(_))));
        assert_eq!(g.recognize(&small).unwrap().text, "200x100");
    }

    #[test]
    fn test_disabled_gate_never_recognizes() {
        let g = OcrGate::disabled();
        assert!(!g.is_enabled());
        assert!(g.recognize(&png(100, 100)).is_none());
    }
}
