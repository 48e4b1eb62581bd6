use super::detector::{detect_separator, is_separator_line, split_on_gaps, Separator, TableRegion};

/// Turns the lines of a text region into a rectangular cell grid
pub struct GridParser;

impl Default for GridParser {
    fn default() -> Self {
        Self::new()
    }
}

impl GridParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a region; `None` when no separator can be determined
    pub fn parse_region(&self, region: &TableRegion) -> Option<Vec<Vec<String>>> {
        let data_lines = self.filter_separator_lines(&region.lines);
        let first = data_lines.first()?;
        let separator = detect_separator(first)?;

        let rows = self.parse_rows(&data_lines, separator);
        if rows.is_empty() {
            None
        } else {
            Some(rows)
        }
    }

    /// Drop markdown separator lines and blanks
    pub fn filter_separator_lines<'a>(&self, lines: &'a [String]) -> Vec<&'a str> {
        lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() && !is_separator_line(line))
            .collect()
    }

    /// Split every line with one separator; the first row fixes the width
    pub fn parse_rows(&self, lines: &[&str], separator: Separator) -> Vec<Vec<String>> {
        let mut rows: Vec<Vec<String>> = Vec::new();

        for line in lines {
            let mut cells = self.split_line(line, separator);

            if cells.iter().all(|cell| cell.is_empty()) {
                continue;
            }

            if let Some(first) = rows.first() {
                cells.resize(first.len(), String::new());
            }
            rows.push(cells);
        }

        rows
    }

    pub fn split_line(&self, line: &str, separator: Separator) -> Vec<String> {
        let line = line.trim();
        match separator {
            Separator::Pipe => line
                .trim_matches('|')
                .split('|')
                .map(|cell| cell.trim().to_string())
                .collect(),
            Separator::Tab => line.split('\t').map(|cell| cell.trim().to_string()).collect(),
            Separator::Comma => line.split(',').map(|cell| cell.trim().to_string()).collect(),
            Separator::Space => split_on_gaps(line, 3)
                .into_iter()
                .map(|cell| cell.trim().to_string())
                .collect(),
        }
    }
}

/// Right-pad or cut every row to `width`
pub fn normalize_width(rows: Vec<Vec<String>>, width: usize) -> Vec<Vec<String>> {
    rows.into_iter()
        .map(|mut row| {
            row.resize(width, String::new());
            row
        })
        .collect()
}
