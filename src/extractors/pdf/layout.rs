//! Positioned text from PDF content streams.
//!
//! lopdf exposes no layout API, so text runs are placed by following the
//! text-positioning operators (`Tm`, `Td`, `TD`, `T*`) and estimating glyph
//! advance from the font size. Rows come from baseline clustering and
//! columns from left-edge anchors shared across rows.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use tracing::debug;

/// Average glyph advance as a fraction of the font size
const GLYPH_ADVANCE: f32 = 0.5;

/// TJ adjustments (thousandths of an em) past this split a run in two
const TJ_SPLIT_ADJUSTMENT: f32 = -1000.0;

/// Rows further apart than this many font sizes end a table candidate
const ROW_GAP_FACTOR: f32 = 2.5;

/// PDF user-space rectangle, y growing upwards
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn union(self, other: BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Distance from this box's top edge up to the bottom of `other`
    pub fn gap_to_above(&self, other: &BoundingBox) -> f32 {
        other.y0 - self.y1
    }

    /// Distance from this box's bottom edge down to the top of `other`
    pub fn gap_to_below(&self, other: &BoundingBox) -> f32 {
        self.y0 - other.y1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    /// Baseline
    pub y: f32,
    pub width: f32,
    pub font_size: f32,
}

impl TextRun {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }
}

/// Paragraph-like text outside any table
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub text: String,
    pub bbox: BoundingBox,
}

/// Cell grid found on a page; the first row is the header row
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutGrid {
    pub cells: Vec<Vec<String>>,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageLayout {
    pub grids: Vec<LayoutGrid>,
    pub blocks: Vec<TextBlock>,
}

impl PageLayout {
    pub fn is_empty(&self) -> bool {
        self.grids.is_empty() && self.blocks.is_empty()
    }
}

/// Native table detection for one page. Never fails; an unreadable page
/// has an empty layout.
pub trait PdfTableFinder: Send + Sync {
    fn find_tables(&self, document: &Document, page_number: u32) -> PageLayout;
}

#[derive(Debug, Clone)]
struct Segment {
    text: String,
    x: f32,
    right: f32,
}

#[derive(Debug, Clone)]
struct LayoutRow {
    y: f32,
    font_size: f32,
    segments: Vec<Segment>,
}

impl LayoutRow {
    fn bbox(&self) -> BoundingBox {
        let x0 = self.segments.iter().map(|s| s.x).fold(f32::MAX, f32::min);
        let x1 = self.segments.iter().map(|s| s.right).fold(f32::MIN, f32::max);
        BoundingBox {
            x0,
            y0: self.y,
            x1,
            y1: self.y + self.font_size,
        }
    }

    fn text(&self, separator: &str) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

/// Table finder over positioned content-stream text
#[derive(Debug, Clone)]
pub struct ContentStreamTableFinder {
    row_tolerance: f32,
    column_tolerance: f32,
    min_rows: usize,
    min_columns: usize,
}

impl Default for ContentStreamTableFinder {
    fn default() -> Self {
        Self {
            row_tolerance: 2.0,
            column_tolerance: 10.0,
            min_rows: 2,
            min_columns: 2,
        }
    }
}

impl PdfTableFinder for ContentStreamTableFinder {
    fn find_tables(&self, document: &Document, page_number: u32) -> PageLayout {
        let Some(page_id) = document.get_pages().get(&page_number).copied() else {
            return PageLayout::default();
        };

        let rows = group_rows(read_text_runs(document, page_id), self.row_tolerance);
        let layout = self.layout_from_rows(&rows);
        debug!(
            "Page {}: {} rows, {} grids, {} text blocks",
            page_number,
            rows.len(),
            layout.grids.len(),
            layout.blocks.len()
        );
        layout
    }
}

impl ContentStreamTableFinder {
    fn layout_from_rows(&self, rows: &[LayoutRow]) -> PageLayout {
        let mut layout = PageLayout::default();
        let mut in_grid = vec![false; rows.len()];

        let mut start = 0;
        while start < rows.len() {
            if rows[start].segments.len() < self.min_columns {
                start += 1;
                continue;
            }

            let mut end = start + 1;
            while end < rows.len()
                && rows[end].segments.len() >= self.min_columns
                && rows_are_adjacent(&rows[end - 1], &rows[end])
            {
                end += 1;
            }

            if let Some(grid) = self.build_grid(&rows[start..end]) {
                in_grid[start..end].iter_mut().for_each(|flag| *flag = true);
                layout.grids.push(grid);
            }
            start = end;
        }

        let mut current: Vec<&LayoutRow> = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let joins = !in_grid[i]
                && i > 0
                && !in_grid[i - 1]
                && current
                    .last()
                    .is_some_and(|prev| rows_are_adjacent(prev, row));
            if !joins {
                if let Some(block) = text_block(&current) {
                    layout.blocks.push(block);
                }
                current.clear();
            }
            if !in_grid[i] {
                current.push(row);
            }
        }
        if let Some(block) = text_block(&current) {
            layout.blocks.push(block);
        }

        layout
    }

    fn build_grid(&self, rows: &[LayoutRow]) -> Option<LayoutGrid> {
        if rows.len() < self.min_rows {
            return None;
        }

        let starts: Vec<f32> = rows
            .iter()
            .flat_map(|row| row.segments.iter().map(|s| s.x))
            .collect();
        let min_occurrences = (rows.len() / 2).max(1);
        let anchors: Vec<f32> = cluster_values(&starts, self.column_tolerance)
            .into_iter()
            .filter(|&anchor| {
                rows.iter()
                    .filter(|row| {
                        row.segments
                            .iter()
                            .any(|s| (s.x - anchor).abs() <= self.column_tolerance)
                    })
                    .count()
                    >= min_occurrences
            })
            .collect();

        if anchors.len() < self.min_columns {
            return None;
        }

        let cells = rows
            .iter()
            .map(|row| {
                let mut cells = vec![String::new(); anchors.len()];
                for segment in &row.segments {
                    let column = anchors
                        .iter()
                        .rposition(|&anchor| segment.x >= anchor - self.column_tolerance)
                        .unwrap_or(0);
                    if !cells[column].is_empty() {
                        cells[column].push(' ');
                    }
                    cells[column].push_str(&segment.text);
                }
                cells
            })
            .collect();

        let bbox = rows
            .iter()
            .map(LayoutRow::bbox)
            .reduce(BoundingBox::union)?;

        Some(LayoutGrid { cells, bbox })
    }
}

fn rows_are_adjacent(upper: &LayoutRow, lower: &LayoutRow) -> bool {
    upper.y - lower.y <= upper.font_size.max(lower.font_size) * ROW_GAP_FACTOR
}

fn text_block(rows: &[&LayoutRow]) -> Option<TextBlock> {
    let bbox = rows.iter().map(|row| row.bbox()).reduce(BoundingBox::union)?;
    let text = rows
        .iter()
        .map(|row| row.text(" "))
        .collect::<Vec<_>>()
        .join(" ");
    Some(TextBlock { text, bbox })
}

/// Page text rebuilt from positioned runs. Wide gaps inside a row become
/// runs of spaces and large vertical gaps become blank lines.
pub fn positioned_text(document: &Document, page_number: u32) -> String {
    let Some(page_id) = document.get_pages().get(&page_number).copied() else {
        return String::new();
    };
    let rows = group_rows(read_text_runs(document, page_id), 2.0);

    let mut lines: Vec<String> = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        if i > 0 && !rows_are_adjacent(&rows[i - 1], row) {
            lines.push(String::new());
        }
        lines.push(row.text("    "));
    }
    lines.join("\n")
}

/// Group runs into rows by baseline, top of the page first, and merge
/// touching runs within a row into segments
fn group_rows(mut runs: Vec<TextRun>, tolerance: f32) -> Vec<LayoutRow> {
    runs.sort_by(|a, b| {
        b.y.partial_cmp(&a.y)
            .unwrap_or(Ordering::Equal)
            .then(a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal))
    });

    let mut grouped: Vec<(f32, Vec<TextRun>)> = Vec::new();
    for run in runs {
        match grouped.last_mut() {
            Some((y, row)) if (*y - run.y).abs() <= tolerance => row.push(run),
            _ => grouped.push((run.y, vec![run])),
        }
    }

    grouped
        .into_iter()
        .map(|(y, mut row)| {
            row.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));
            let font_size = row.iter().map(|r| r.font_size).fold(0.0, f32::max);
            let mut segments: Vec<Segment> = Vec::new();

            for run in row {
                match segments.last_mut() {
                    Some(segment) if run.x - segment.right < run.font_size => {
                        if run.x - segment.right > run.font_size * 0.2 {
                            segment.text.push(' ');
                        }
                        segment.text.push_str(&run.text);
                        segment.right = segment.right.max(run.right());
                    }
                    _ => segments.push(Segment {
                        text: run.text.clone(),
                        x: run.x,
                        right: run.right(),
                    }),
                }
            }

            LayoutRow {
                y,
                font_size,
                segments,
            }
        })
        .collect()
}

/// Cluster sorted values that lie within `threshold` of their neighbour;
/// returns the cluster means
pub fn cluster_values(values: &[f32], threshold: f32) -> Vec<f32> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let mut clusters: Vec<Vec<f32>> = Vec::new();
    for value in sorted {
        match clusters.last_mut() {
            Some(cluster) if cluster.last().is_some_and(|&last| value - last <= threshold) => {
                cluster.push(value)
            }
            _ => clusters.push(vec![value]),
        }
    }

    clusters
        .iter()
        .map(|cluster| cluster.iter().sum::<f32>() / cluster.len() as f32)
        .collect()
}

/// Text state tracked while walking a content stream
#[derive(Debug, Clone)]
struct TextCursor {
    scale_x: f32,
    scale_y: f32,
    line_x: f32,
    line_y: f32,
    x: f32,
    y: f32,
    font_size: f32,
    leading: f32,
}

impl Default for TextCursor {
    fn default() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            line_x: 0.0,
            line_y: 0.0,
            x: 0.0,
            y: 0.0,
            font_size: 12.0,
            leading: 0.0,
        }
    }
}

impl TextCursor {
    /// `BT` resets the matrices; font and leading carry over
    fn begin(&mut self) {
        *self = Self {
            font_size: self.font_size,
            leading: self.leading,
            ..Self::default()
        };
    }

    fn set_matrix(&mut self, m: &[f32]) {
        self.scale_x = m[0];
        self.scale_y = m[3];
        self.line_x = m[4];
        self.line_y = m[5];
        self.x = m[4];
        self.y = m[5];
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_x += tx * self.scale_x;
        self.line_y += ty * self.scale_y;
        self.x = self.line_x;
        self.y = self.line_y;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn effective_size(&self) -> f32 {
        let size = self.font_size * self.scale_y.abs();
        if size > 0.0 {
            size
        } else {
            self.font_size.max(1.0)
        }
    }

    fn text_width(&self, text: &str) -> f32 {
        text.chars().count() as f32 * self.font_size * self.scale_x.abs() * GLYPH_ADVANCE
    }

    /// TJ adjustment in thousandths of an em
    fn adjust(&mut self, thousandths: f32) {
        self.x -= thousandths / 1000.0 * self.font_size * self.scale_x.abs();
    }

    fn emit(&mut self, text: String, runs: &mut Vec<TextRun>) {
        let width = self.text_width(&text);
        if !text.trim().is_empty() {
            runs.push(TextRun {
                text: text.trim().to_string(),
                x: self.x,
                y: self.y,
                width,
                font_size: self.effective_size(),
            });
        }
        self.x += width;
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn decode(encoding: Option<&str>, object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) => Some(Document::decode_text(encoding, bytes)),
        _ => None,
    }
}

/// Every shown string on a page with its estimated position
pub fn read_text_runs(document: &Document, page_id: ObjectId) -> Vec<TextRun> {
    let Ok(raw_content) = document.get_page_content(page_id) else {
        return Vec::new();
    };
    let Ok(content) = Content::decode(&raw_content) else {
        return Vec::new();
    };

    let encodings = document
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, font.get_font_encoding()))
        .collect::<BTreeMap<Vec<u8>, &str>>();

    let mut encoding: Option<&str> = None;
    let mut cursor = TextCursor::default();
    let mut runs = Vec::new();

    for operation in &content.operations {
        let operands = &operation.operands;
        match operation.operator.as_str() {
            "BT" => cursor.begin(),
            "Tf" => {
                if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                    encoding = encodings.get(name).copied();
                }
                if let Some(size) = operands.get(1).and_then(number) {
                    cursor.font_size = size;
                }
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(number) {
                    cursor.leading = leading;
                }
            }
            "Td" | "TD" => {
                if let (Some(tx), Some(ty)) = (
                    operands.first().and_then(number),
                    operands.get(1).and_then(number),
                ) {
                    if operation.operator == "TD" {
                        cursor.leading = -ty;
                    }
                    cursor.move_line(tx, ty);
                }
            }
            "Tm" => {
                let matrix: Vec<f32> = operands.iter().filter_map(number).collect();
                if matrix.len() == 6 {
                    cursor.set_matrix(&matrix);
                }
            }
            "T*" => cursor.next_line(),
            "Tj" => {
                if let Some(text) = operands.first().and_then(|o| decode(encoding, o)) {
                    cursor.emit(text, &mut runs);
                }
            }
            "'" => {
                cursor.next_line();
                if let Some(text) = operands.first().and_then(|o| decode(encoding, o)) {
                    cursor.emit(text, &mut runs);
                }
            }
            "\"" => {
                cursor.next_line();
                if let Some(text) = operands.get(2).and_then(|o| decode(encoding, o)) {
                    cursor.emit(text, &mut runs);
                }
            }
            "TJ" => {
                let Some(Object::Array(items)) = operands.first() else {
                    continue;
                };
                let mut pending = String::new();
                for item in items {
                    if let Some(text) = decode(encoding, item) {
                        pending.push_str(&text);
                    } else if let Some(adjustment) = number(item) {
                        if adjustment <= TJ_SPLIT_ADJUSTMENT {
                            cursor.emit(std::mem::take(&mut pending), &mut runs);
                            cursor.adjust(adjustment);
                        } else if adjustment < -100.0 {
                            pending.push(' ');
                        }
                    }
                }
                cursor.emit(pending, &mut runs);
            }
            _ => {}
        }
    }

    runs
}
