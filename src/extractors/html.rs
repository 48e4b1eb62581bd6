//! HTML pages via scraper.

use encoding_rs::WINDOWS_1252;
use scraper::{ElementRef, Html, Selector};
use tracing::info;

use super::{DocumentExtractor, ExtractedText};
use crate::config::HeuristicsConfig;
use crate::error::{SnyfterError, SnyfterResult};
use crate::model::{ExtractionMethod, ProcessingMethod, Table};
use crate::table::{HeaderSource, RawTable, TableEngine};

const WORDS_PER_PAGE: usize = 500;
const MAX_CONTEXT_CHARS: usize = 200;

struct HtmlSelectors {
    tables: Selector,
    rows: Selector,
    body: Selector,
}

impl HtmlSelectors {
    fn new() -> SnyfterResult<Self> {
        let parse = |css: &str| {
            Selector::parse(css)
                .map_err(|e| SnyfterError::configuration(format!("CSS selector error: {:?}", e)))
        };
        Ok(Self {
            tables: parse("table")?,
            rows: parse("tr")?,
            body: parse("body")?,
        })
    }
}

/// Element of interest in document order
enum Marker<'a> {
    Heading(String),
    Paragraph(String),
    Table(ElementRef<'a>),
}

pub struct HtmlExtractor {
    engine: TableEngine,
    selectors: HtmlSelectors,
}

impl HtmlExtractor {
    pub fn new(heuristics: &HeuristicsConfig) -> SnyfterResult<Self> {
        Ok(Self {
            engine: TableEngine::new(heuristics),
            selectors: HtmlSelectors::new()?,
        })
    }

    fn parse(content: &[u8]) -> Html {
        Html::parse_document(&decode_html(content))
    }

    /// Rows whose nearest enclosing table is `table`
    fn own_rows<'a>(&self, table: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        table
            .select(&self.selectors.rows)
            .filter(|row| nearest_table(*row) == Some(table))
            .collect()
    }

    fn table_candidate(&self, table: ElementRef<'_>, markers: &[Marker<'_>]) -> Option<RawTable> {
        let rows = self.own_rows(table);
        let (first, rest) = rows.split_first()?;

        let header_cells: Vec<ElementRef> = cells(*first)
            .into_iter()
            .filter(|cell| cell.value().name() == "th")
            .collect();
        let headers = if header_cells.is_empty() {
            HeaderSource::FirstRow
        } else {
            HeaderSource::Given(header_cells.into_iter().map(cell_text).collect())
        };

        let grid: Vec<Vec<String>> = match headers {
            HeaderSource::FirstRow => rows.iter().map(|row| row_text(*row)).collect(),
            _ => rest.iter().map(|row| row_text(*row)).collect(),
        };

        let caption = table
            .children()
            .filter_map(ElementRef::wrap)
            .find(|child| child.value().name() == "caption")
            .map(cell_text);

        let position = markers
            .iter()
            .position(|marker| matches!(marker, Marker::Table(t) if *t == table));
        let (heading, before, after) = match position {
            Some(at) => surrounding_text(markers, at),
            None => (None, None, None),
        };

        Some(
            RawTable::new(grid, ExtractionMethod::HtmlParser)
                .with_headers(headers)
                .with_title(caption.or(heading))
                .with_context(before.filter(|text| text.chars().count() < MAX_CONTEXT_CHARS), after),
        )
    }

    fn body_text(&self, document: &Html) -> String {
        let root = document
            .select(&self.selectors.body)
            .next()
            .unwrap_or_else(|| document.root_element());

        root.descendants()
            .filter_map(|node| {
                let text = node.value().as_text()?;
                let hidden = node.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"))
                });
                let text = text.trim();
                (!hidden && !text.is_empty()).then(|| text.to_string())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DocumentExtractor for HtmlExtractor {
    fn name(&self) -> &'static str {
        "html"
    }

    fn extract_text(&self, content: &[u8]) -> SnyfterResult<ExtractedText> {
        let document = Self::parse(content);
        Ok(ExtractedText::new(
            self.body_text(&document),
            false,
            ProcessingMethod::HtmlExtraction,
        ))
    }

    fn extract_tables(&self, content: &[u8]) -> Vec<Table> {
        let document = Self::parse(content);
        let markers = markers(&document);

        let candidates: Vec<RawTable> = document
            .select(&self.selectors.tables)
            .filter_map(|table| self.table_candidate(table, &markers))
            .collect();

        let tables = self.engine.build_all(candidates);
        if !tables.is_empty() {
            info!("📊 Found {} HTML tables", tables.len());
        }
        tables
    }

    fn count_pages(&self, content: &[u8]) -> usize {
        let words = self.body_text(&Self::parse(content)).split_whitespace().count();
        (words / WORDS_PER_PAGE).max(1)
    }
}

fn nearest_table(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "table")
}

fn cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|cell| matches!(cell.value().name(), "td" | "th"))
        .collect()
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn row_text(row: ElementRef<'_>) -> Vec<String> {
    cells(row).into_iter().map(cell_text).collect()
}

/// Headings, paragraphs outside tables, and tables, in document order
fn markers(document: &Html) -> Vec<Marker<'_>> {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter_map(|element| match element.value().name() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Some(Marker::Heading(cell_text(element))),
            "p" if nearest_table(element).is_none() => Some(Marker::Paragraph(cell_text(element))),
            "table" => Some(Marker::Table(element)),
            _ => None,
        })
        .collect()
}

/// Nearest heading and paragraph before the table at `at`, and the next
/// paragraph after it
fn surrounding_text(markers: &[Marker<'_>], at: usize) -> (Option<String>, Option<String>, Option<String>) {
    let heading = markers[..at].iter().rev().find_map(|marker| match marker {
        Marker::Heading(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    });
    let paragraph = |marker: &Marker<'_>| match marker {
        Marker::Paragraph(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    };
    let before = markers[..at].iter().rev().find_map(paragraph);
    let after = markers[at + 1..].iter().find_map(paragraph);

    (heading, before, after)
}

/// UTF-8, else windows-1252, after undoing quoted-printable transfer
/// encoding when the bytes look like it (saved `.mht` pages)
pub fn decode_html(content: &[u8]) -> String {
    let decoded;
    let bytes = if looks_quoted_printable(content) {
        decoded = decode_quoted_printable(content);
        decoded.as_slice()
    } else {
        content
    };

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => WINDOWS_1252.decode(bytes).0.into_owned(),
    }
}

fn looks_quoted_printable(content: &[u8]) -> bool {
    content.windows(3).any(|w| w == b"=3D" || w == b"=\r\n") || content.windows(2).any(|w| w == b"=\n")
}

fn decode_quoted_printable(content: &[u8]) -> Vec<u8> {
    let hex = |b: u8| (b as char).to_digit(16).map(|d| d as u8);
    let mut out = Vec::with_capacity(content.len());
    let mut i = 0;

    while i < content.len() {
        if content[i] == b'=' {
            match content.get(i + 1..i + 3) {
                Some([b'\r', b'\n']) => {
                    i += 3;
                    continue;
                }
                Some([b'\n', _]) => {
                    i += 2;
                    continue;
                }
                Some(&[hi, lo]) => {
                    if let (Some(hi), Some(lo)) = (hex(hi), hex(lo)) {
                        out.push(hi << 4 | lo);
                        i += 3;
                        continue;
                    }
                }
                None if content.get(i + 1) == Some(&b'\n') => {
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }
        out.push(content[i]);
        i += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TableType;

    fn extractor() -> HtmlExtractor {
        HtmlExtractor::new(&HeuristicsConfig::default()).unwrap()
    }

    const PAGE: &str = r#"<html><head><title>Report</title><style>td { color: red }</style></head>
<body>
  <h2>Team results</h2>
  <p>Scores from the spring league.</p>
  <table>
    <tr><th>Player</th><th>Score</th></tr>
    <tr><td>Ann</td><td> 12 </td></tr>
    <tr><td>Bo
      Lee</td><td>9</td><td>extra</td></tr>
  </table>
  <p>Ties were broken by goal difference.</p>
  <script>var ignored = 1;</script>
  <table>
    <caption>Table 2: Fixtures</caption>
    <tr><td>Date</td><td>Venue</td></tr>
    <tr><td>2024-03-01</td><td><table><tr><td>North</td><td>Field</td></tr></table></td></tr>
  </table>
</body></html>"#;

    #[test]
    fn test_tables_with_context() {
        let tables = extractor().extract_tables(PAGE.as_bytes());

        // the nested table has no data rows of its own
        assert_eq!(tables.len(), 2);

        let scores = &tables[0];
        assert_eq!(scores.headers().unwrap(), ["Player", "Score"]);
        assert_eq!(scores.rows(), [vec!["Ann", "12"], vec!["Bo Lee", "9"]]);
        assert_eq!(scores.title(), Some("Team results"));
        assert_eq!(scores.context_before(), Some("Scores from the spring league."));
        assert_eq!(scores.context_after(), Some("Ties were broken by goal difference."));
        assert_eq!(scores.table_type(), TableType::Performance);
        assert_eq!(scores.confidence_score(), 0.95);
        assert!(scores.page().is_none());

        let fixtures = &tables[1];
        assert_eq!(fixtures.index(), 1);
        assert_eq!(fixtures.title(), Some("Table 2: Fixtures"));
        assert_eq!(fixtures.headers().unwrap(), ["Date", "Venue"]);
        assert_eq!(fixtures.row_count(), 1);
        assert_eq!(fixtures.rows()[0], vec!["2024-03-01", "North Field"]);
    }

    #[test]
    fn test_header_only_table_is_discarded() {
        let html = "<table><tr><th>Name</th><th>Email</th></tr></table>";
        assert!(extractor().extract_tables(html.as_bytes()).is_empty());
    }

    #[test]
    fn test_text_skips_scripts_and_styles() {
        let extracted = extractor().extract_text(PAGE.as_bytes()).unwrap();

        assert!(extracted.text.starts_with("Team results\nScores from the spring league."));
        assert!(!extracted.text.contains("ignored"));
        assert!(!extracted.text.contains("color"));
        assert_eq!(extracted.method, ProcessingMethod::HtmlExtraction);
        assert_eq!(extractor().count_pages(PAGE.as_bytes()), 1);
    }

    #[test]
    fn test_quoted_printable_and_legacy_encodings() {
        let qp = b"<p class=3D\"x\">caf=C3=A9 au=\r\n lait</p>";
        assert_eq!(decode_html(qp), "<p class=\"x\">café au lait</p>");
        assert_eq!(decode_html(b"<p>na\xefve</p>"), "<p>naïve</p>");
    }
}
