use csv::{QuoteStyle, Terminator, WriterBuilder};
use tracing::warn;

use crate::model::TableExports;

/// Deterministic serializations of headers + rows
pub struct TableFormatter {
    padding: usize,
    alignment: ColumnAlignment,
}

#[derive(Clone, Copy)]
pub enum ColumnAlignment {
    Left,
    Center,
    Right,
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            padding: 1,
            alignment: ColumnAlignment::Left,
        }
    }

    pub fn with_alignment(mut self, alignment: ColumnAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn exports(&self, headers: Option<&[String]>, rows: &[Vec<String>]) -> TableExports {
        let csv = self.to_csv(headers, rows, b',').unwrap_or_else(|e| {
            warn!("⚠️ CSV export failed: {}", e);
            String::new()
        });

        TableExports {
            csv,
            html: self.to_html(headers, rows),
            markdown: self.to_markdown(headers, rows),
            text: self.to_text(headers, rows),
        }
    }

    /// Every field quoted, header first when present
    pub fn to_csv(&self, headers: Option<&[String]>, rows: &[Vec<String>], delimiter: u8) -> Result<String, csv::Error> {
        let mut writer = WriterBuilder::new()
            .delimiter(delimiter)
            .quote_style(QuoteStyle::Always)
            .terminator(Terminator::Any(b'\n'))
            .flexible(true)
            .from_writer(Vec::<u8>::new());

        if let Some(headers) = headers {
            writer.write_record(headers)?;
        }
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;

        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn to_html(&self, headers: Option<&[String]>, rows: &[Vec<String>]) -> String {
        let mut html = String::from("<table>");

        if let Some(headers) = headers {
            html.push_str("<thead><tr>");
            for cell in headers {
                html.push_str(&format!("<th>{}</th>", escape_html(cell)));
            }
            html.push_str("</tr></thead>");
        }

        html.push_str("<tbody>");
        for row in rows {
            html.push_str("<tr>");
            for cell in row {
                html.push_str(&format!("<td>{}</td>", escape_html(cell)));
            }
            html.push_str("</tr>");
        }
        html.push_str("</tbody></table>");

        html
    }

    /// Pipe table; generated `Column N` headers when none were detected
    pub fn to_markdown(&self, headers: Option<&[String]>, rows: &[Vec<String>]) -> String {
        let width = headers
            .map(<[String]>::len)
            .or_else(|| rows.first().map(Vec::len))
            .unwrap_or(0);
        if width == 0 {
            return String::new();
        }

        let generated: Vec<String>;
        let header_cells = match headers {
            Some(headers) => headers,
            None => {
                generated = (1..=width).map(|i| format!("Column {}", i)).collect();
                &generated
            }
        };

        let mut lines = Vec::with_capacity(rows.len() + 2);
        lines.push(markdown_row(header_cells));
        lines.push(format!("|{}|", vec!["---"; width].join("|")));
        lines.extend(rows.iter().map(|row| markdown_row(row)));

        lines.join("\n")
    }

    /// Flattened `a | b | c` lines
    pub fn to_text(&self, headers: Option<&[String]>, rows: &[Vec<String>]) -> String {
        headers
            .into_iter()
            .chain(rows.iter().map(Vec::as_slice))
            .map(|row| row.join(" | "))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Column-aligned grid for terminal display
    pub fn format_aligned(&self, headers: Option<&[String]>, rows: &[Vec<String>]) -> String {
        let column_count = headers
            .map(<[String]>::len)
            .into_iter()
            .chain(rows.iter().map(Vec::len))
            .max()
            .unwrap_or(0);
        if column_count == 0 {
            return String::new();
        }

        let widths = self.calculate_column_widths(headers, rows, column_count);
        let mut formatted = Vec::new();

        if let Some(headers) = headers {
            formatted.push(self.format_row(headers, &widths));
            formatted.push(self.create_separator(&widths));
        }
        for row in rows {
            formatted.push(self.format_row(row, &widths));
        }

        formatted.join("\n")
    }

    fn calculate_column_widths(&self, headers: Option<&[String]>, rows: &[Vec<String>], column_count: usize) -> Vec<usize> {
        let mut widths = vec![0; column_count];

        for row in headers.into_iter().chain(rows.iter().map(Vec::as_slice)) {
            for (i, cell) in row.iter().enumerate().take(column_count) {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        widths.iter_mut().for_each(|w| *w += self.padding * 2);
        widths
    }

    fn format_row(&self, row: &[String], widths: &[usize]) -> String {
        let cells: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, &width)| {
                let content = row.get(i).map(String::as_str).unwrap_or("");
                self.pad_content(content, width)
            })
            .collect();

        format!("|{}|", cells.join("|"))
    }

    fn pad_content(&self, content: &str, width: usize) -> String {
        match self.alignment {
            ColumnAlignment::Left => format!("{:<width$}", content, width = width),
            ColumnAlignment::Right => format!("{:>width$}", content, width = width),
            ColumnAlignment::Center => format!("{:^width$}", content, width = width),
        }
    }

    fn create_separator(&self, widths: &[usize]) -> String {
        let separators: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
        format!("|{}|", separators.join("|"))
    }
}

fn markdown_row(cells: &[String]) -> String {
    let cells: Vec<String> = cells.iter().map(|cell| cell.replace('|', "\\|").replace('\n', " ")).collect();
    format!("| {} |", cells.join(" | "))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect()
    }

    #[test]
    fn test_csv_quotes_every_field() {
        let headers = vec!["Item".to_string(), "Note".to_string()];
        let rows = grid(&[&["Pen", "says \"hi\", twice"]]);
        let csv = TableFormatter::new().to_csv(Some(headers.as_slice()), &rows, b',').unwrap();
        assert_eq!(csv, "\"Item\",\"Note\"\n\"Pen\",\"says \"\"hi\"\", twice\"\n");
    }

    #[test]
    fn test_html_escapes_cells() {
        let headers = vec!["A<B".to_string()];
        let rows = grid(&[&["x & y"]]);
        let html = TableFormatter::new().to_html(Some(headers.as_slice()), &rows);
        assert_eq!(
            html,
            "<table><thead><tr><th>A&lt;B</th></tr></thead><tbody><tr><td>x &amp; y</td></tr></tbody></table>"
        );
    }

    #[test]
    fn test_markdown_generates_headers() {
        let rows = grid(&[&["1", "a|b"]]);
        let md = TableFormatter::new().to_markdown(None, &rows);
        assert_eq!(md, "| Column 1 | Column 2 |\n|---|---|\n| 1 | a\\|b |");
    }

    #[test]
    fn test_text_is_pipe_joined() {
        let headers = vec!["k".to_string(), "v".to_string()];
        let rows = grid(&[&["a", "1"], &["b", "2"]]);
        assert_eq!(TableFormatter::new().to_text(Some(headers.as_slice()), &rows), "k | v\na | 1\nb | 2");
    }

    #[test]
    fn test_aligned_output_pads_columns() {
        let headers = vec!["Name".to_string(), "Qty".to_string()];
        let rows = grid(&[&["Pen", "12"]]);
        let out = TableFormatter::new().format_aligned(Some(headers.as_slice()), &rows);
        assert_eq!(out, "|Name  |Qty  |\n|------|-----|\n|Pen   |12   |");
    }
}
