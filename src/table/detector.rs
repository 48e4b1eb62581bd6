//! Line-level table detection for plain text.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineType {
    TableRow,
    TableSeparator,
    Text,
    Empty,
}

/// Column separator of a text table, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    Pipe,
    Tab,
    Comma,
    Space,
}

/// Contiguous block of table-shaped lines
#[derive(Debug, Clone, PartialEq)]
pub struct TableRegion {
    pub start_line: usize,
    pub end_line: usize,
    pub lines: Vec<String>,
}

pub struct RowDetector {
    min_line_len: usize,
    min_region_lines: usize,
}

impl Default for RowDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl RowDetector {
    pub fn new() -> Self {
        Self {
            min_line_len: 3,
            min_region_lines: 2,
        }
    }

    pub fn classify_line(&self, line: &str) -> LineType {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            return LineType::Empty;
        }
        if trimmed.chars().count() < self.min_line_len {
            return LineType::Text;
        }
        if is_separator_line(trimmed) {
            return LineType::TableSeparator;
        }
        if self.is_table_row(trimmed) {
            return LineType::TableRow;
        }

        LineType::Text
    }

    /// Row test on a trimmed line. Separator lines count as rows too.
    pub fn is_table_row(&self, line: &str) -> bool {
        if line.chars().count() < self.min_line_len {
            return false;
        }

        if line.matches('|').count() >= 2 {
            return true;
        }

        if line.contains('\t') {
            return true;
        }

        if line.split_whitespace().count() >= 3 && has_whitespace_run(line, 3) {
            return true;
        }

        if is_separator_line(line) {
            return true;
        }

        if line.matches(',').count() >= 2 {
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() >= 3 && fields.iter().take(3).all(|f| !f.trim().is_empty()) {
                return true;
            }
        }

        false
    }

    /// Group contiguous row lines into regions of at least two lines
    pub fn detect_regions(&self, content: &str) -> Vec<TableRegion> {
        let mut regions = Vec::new();
        let mut current_region: Option<TableRegionBuilder> = None;

        for (i, line) in content.lines().enumerate() {
            match self.classify_line(line) {
                LineType::TableRow | LineType::TableSeparator => {
                    current_region
                        .get_or_insert_with(|| TableRegionBuilder::new(i))
                        .add_line(line.trim());
                }
                LineType::Text | LineType::Empty => {
                    if let Some(region) = current_region.take() {
                        if let Some(table) = region.build(self.min_region_lines) {
                            regions.push(table);
                        }
                    }
                }
            }
        }

        if let Some(region) = current_region {
            if let Some(table) = region.build(self.min_region_lines) {
                regions.push(table);
            }
        }

        regions
    }
}

/// Markdown separator such as `|---|---|`, `|:--|--:|` or `+----+----+`
pub fn is_separator_line(line: &str) -> bool {
    let trimmed = line.trim();
    let ruled = trimmed.contains("---") || trimmed.contains(":-") || trimmed.contains("-:");
    ruled && trimmed.chars().all(|c| matches!(c, '-' | '|' | '+' | ':' | ' '))
}

/// Separator for a sample line: pipe > tab > comma > wide whitespace
pub fn detect_separator(line: &str) -> Option<Separator> {
    if line.matches('|').count() >= 2 {
        Some(Separator::Pipe)
    } else if line.contains('\t') {
        Some(Separator::Tab)
    } else if line.matches(',').count() >= 2 {
        Some(Separator::Comma)
    } else if has_whitespace_run(line, 3) {
        Some(Separator::Space)
    } else {
        None
    }
}

pub(crate) fn has_whitespace_run(line: &str, min_run: usize) -> bool {
    let mut run = 0;
    for c in line.chars() {
        if c.is_whitespace() {
            run += 1;
            if run >= min_run {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// Split on runs of at least `min_run` whitespace characters
pub(crate) fn split_on_gaps(line: &str, min_run: usize) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut pending = String::new();

    for c in line.trim().chars() {
        if c.is_whitespace() {
            pending.push(c);
            continue;
        }
        if pending.chars().count() >= min_run || pending.contains('\t') {
            cells.push(std::mem::take(&mut current));
        } else {
            current.push_str(&pending);
        }
        pending.clear();
        current.push(c);
    }

    if !current.is_empty() {
        cells.push(current);
    }

    cells
}

struct TableRegionBuilder {
    start_line: usize,
    lines: Vec<String>,
}

impl TableRegionBuilder {
    fn new(start_line: usize) -> Self {
        Self {
            start_line,
            lines: Vec::new(),
        }
    }

    fn add_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn build(self, min_lines: usize) -> Option<TableRegion> {
        if self.lines.len() < min_lines {
            return None;
        }

        Some(TableRegion {
            start_line: self.start_line,
            end_line: self.start_line + self.lines.len() - 1,
            lines: self.lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_shapes() {
        let detector = RowDetector::new();
        assert!(detector.is_table_row("| a | b |"));
        assert!(detector.is_table_row("a\tb"));
        assert!(detector.is_table_row("Name    Age    City"));
        assert!(detector.is_table_row("x, y, z"));
        assert!(detector.is_table_row("|------|-------|"));

        assert!(!detector.is_table_row("Just a sentence, with one comma."));
        assert!(!detector.is_table_row("two   words"));
        assert!(!detector.is_table_row("a,,b"));
        assert!(!detector.is_table_row("|a"));
    }

    #[test]
    fn test_aligned_separators() {
        assert!(is_separator_line("|------|-------|"));
        assert!(is_separator_line("|:-----|------:|"));
        assert!(is_separator_line("| :-: | --: |"));
        assert!(is_separator_line("+----+----+"));

        assert!(!is_separator_line("| - | - |"));
        assert!(!is_separator_line("| 10:30 | 11:45 |"));
        assert!(!is_separator_line("|-a-|---|"));
    }

    #[test]
    fn test_separator_priority() {
        assert_eq!(detect_separator("a | b | c\td"), Some(Separator::Pipe));
        assert_eq!(detect_separator("a\tb, c, d"), Some(Separator::Tab));
        assert_eq!(detect_separator("a, b, c    d"), Some(Separator::Comma));
        assert_eq!(detect_separator("a    b"), Some(Separator::Space));
        assert_eq!(detect_separator("plain words"), None);
    }

    #[test]
    fn test_regions_are_split_by_prose() {
        let text = "Intro paragraph.\n\
                    Name    Age    City\n\
                    Alice   30     NYC\n\
                    \n\
                    Single    row    only\n\
                    Closing words.\n\
                    a\tb\n\
                    c\td\n";
        let regions = RowDetector::new().detect_regions(text);

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].start_line, 1);
        assert_eq!(regions[0].end_line, 2);
        assert_eq!(regions[1].lines, vec!["a\tb", "c\td"]);
    }

    #[test]
    fn test_split_on_gaps_keeps_single_spaces() {
        assert_eq!(
            split_on_gaps("New York    10,000   ok", 3),
            vec!["New York", "10,000", "ok"]
        );
        assert_eq!(split_on_gaps("a  b c", 2), vec!["a", "b c"]);
    }
}
