use crate::model::TableType;

const MALFORMED_CELL_LEN: usize = 200;

/// Category keyword sets, checked in this order
const CATEGORIES: [(TableType, &[&str]); 6] = [
    (TableType::Financial, &["amount", "cost", "price", "revenue", "profit", "budget", "expense", "$"]),
    (TableType::Contact, &["email", "phone", "address", "contact", "person", "full name", "contact_name"]),
    (TableType::Statistics, &["count", "average", "percentage", "rate", "metric", "total"]),
    (TableType::Schedule, &["date", "time", "day", "month", "year", "schedule", "calendar"]),
    (TableType::Inventory, &["quantity", "stock", "item", "product", "inventory"]),
    (TableType::Performance, &["score", "rating", "performance", "result", "achievement"]),
];

/// Semantic label from header keywords; ties keep the earlier category
pub fn classify_table_type(headers: Option<&[String]>) -> TableType {
    let Some(headers) = headers else {
        return TableType::Data;
    };
    let header_text = headers.join(" ").to_lowercase();

    let mut best = TableType::Data;
    let mut best_score = 0;
    for (table_type, keywords) in CATEGORIES {
        let score = keywords
            .iter()
            .filter(|keyword| header_text.contains(*keyword))
            .count();
        if score > best_score {
            best = table_type;
            best_score = score;
        }
    }

    best
}

/// Content quality in [0, 1]; empty cells cost 0.4, malformed ones 0.8
pub fn quality_score(rows: &[Vec<String>]) -> f64 {
    let total = rows.iter().map(Vec::len).sum::<usize>();
    if total == 0 {
        return 0.5;
    }

    let cells = || rows.iter().flatten();
    let empty = cells().filter(|cell| cell.trim().is_empty()).count();
    let malformed = cells()
        .filter(|cell| cell.chars().count() > MALFORMED_CELL_LEN || cell.contains('\n'))
        .count();

    let empty_ratio = empty as f64 / total as f64;
    let malformed_ratio = malformed as f64 / total as f64;

    (1.0 - (empty_ratio * 0.4 + malformed_ratio * 0.8)).clamp(0.0, 1.0)
}
