//! Table blocks in OCR output.

use crate::table::detector::split_on_gaps;

/// Heuristic row test for a recognized line
pub fn looks_like_ocr_row(line: &str) -> bool {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 2 {
        return false;
    }

    let numeric_parts = parts
        .iter()
        .filter(|part| {
            let digits: String = part.chars().filter(|c| !matches!(c, ',' | '.')).collect();
            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        })
        .count();

    parts.len() >= 3
        || line.contains('|')
        || line.contains('\t')
        || numeric_parts >= 2
        || line.chars().count() > 20
}

/// Runs of row-like lines; blank and prose lines end a block
pub fn row_blocks(text: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines().map(str::trim) {
        if !line.is_empty() && looks_like_ocr_row(line) {
            current.push(line);
        } else if !current.is_empty() {
            blocks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
}

fn split_ocr_line(line: &str) -> Vec<String> {
    if line.contains('|') {
        line.trim_matches('|')
            .split('|')
            .map(|cell| cell.trim().to_string())
            .collect()
    } else {
        split_on_gaps(line, 2)
    }
}

/// Grids of at least two rows and two columns, padded to the widest row
pub fn ocr_grids(text: &str) -> Vec<Vec<Vec<String>>> {
    row_blocks(text)
        .into_iter()
        .filter(|block| block.len() >= 2)
        .filter_map(|block| {
            let rows: Vec<Vec<String>> = block
                .iter()
                .map(|line| split_ocr_line(line))
                .filter(|cells| cells.len() > 1)
                .collect();
            let width = rows.iter().map(Vec::len).max().unwrap_or(0);
            if rows.len() < 2 || width < 2 {
                return None;
            }

            Some(
                rows.into_iter()
                    .map(|mut row| {
                        row.resize(width, String::new());
                        row
                    })
                    .collect(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_heuristics() {
        assert!(looks_like_ocr_row("Name  Score  Grade"));
        assert!(looks_like_ocr_row("1,200 3.5"));
        assert!(looks_like_ocr_row("a | b"));
        assert!(looks_like_ocr_row("Quarterly revenue summary"));
        assert!(!looks_like_ocr_row("Revenue"));
        assert!(!looks_like_ocr_row("short pair"));
    }

    #[test]
    fn test_grids_from_ocr_text() {
        let text = "Scanned report\n\nName    Score    Grade\nAlice    90    A\nBob Smith    85\n\nThe end";
        let grids = ocr_grids(text);

        assert_eq!(grids.len(), 1);
        assert_eq!(grids[0][0], vec!["Name", "Score", "Grade"]);
        assert_eq!(grids[0][2], vec!["Bob Smith", "85", ""]);
    }

    #[test]
    fn test_single_row_block_is_dropped() {
        assert!(ocr_grids("Name    Score    Grade\n\nprose").is_empty());
    }
}
