use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{SnyfterError, SnyfterResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub document_id: i64,
    pub filename: String,
    pub snippet: String,
    /// bm25 rank; lower is better, 0 for substring matches
    pub rank: f64,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchQuery {
    Simple(String),
    Phrase(String),          // "exact phrase"
    Prefix(String),          // term*
    Boolean(BooleanQuery),   // term1 AND term2
}

#[derive(Debug, Clone, PartialEq)]
pub struct BooleanQuery {
    pub left: String,
    pub operator: BooleanOperator,
    pub right: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BooleanOperator {
    And,
    Or,
    Not,
}

/// FTS5 index over document text, keyed by document id
pub struct FtsIndex {
    pool: SqlitePool,
}

impl FtsIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> SnyfterResult<()> {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
                full_text,
                filename,
                tokenize='unicode61 remove_diacritics 2'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SnyfterError::database("create documents_fts", e))?;

        debug!("🔍 FTS5 schema ready");
        Ok(())
    }

    /// Replace whatever was indexed for `document_id`. Runs on the caller's
    /// connection so it commits or rolls back with the document row.
    pub async fn index_document(
        &self,
        conn: &mut SqliteConnection,
        document_id: i64,
        filename: &str,
        full_text: &str,
    ) -> SnyfterResult<()> {
        self.remove_document(&mut *conn, document_id).await?;

        sqlx::query("INSERT INTO documents_fts(rowid, full_text, filename) VALUES (?, ?, ?)")
            .bind(document_id)
            .bind(full_text)
            .bind(filename)
            .execute(&mut *conn)
            .await
            .map_err(|e| SnyfterError::database("index document", e))?;

        debug!("📝 Indexed document {} in FTS", document_id);
        Ok(())
    }

    pub async fn remove_document(&self, conn: &mut SqliteConnection, document_id: i64) -> SnyfterResult<()> {
        sqlx::query("DELETE FROM documents_fts WHERE rowid = ?")
            .bind(document_id)
            .execute(conn)
            .await
            .map_err(|e| SnyfterError::database("remove document from FTS", e))?;
        Ok(())
    }

    /// Rebuild the index from the documents table
    pub async fn rebuild(&self) -> SnyfterResult<()> {
        info!("🔄 Rebuilding FTS5 index");

        sqlx::query("DELETE FROM documents_fts")
            .execute(&self.pool)
            .await
            .map_err(|e| SnyfterError::database("clear documents_fts", e))?;
        sqlx::query(
            "INSERT INTO documents_fts(rowid, full_text, filename) SELECT id, full_text, filename FROM documents",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SnyfterError::database("repopulate documents_fts", e))?;
        sqlx::query("INSERT INTO documents_fts(documents_fts) VALUES('optimize')")
            .execute(&self.pool)
            .await
            .map_err(|e| SnyfterError::database("optimize documents_fts", e))?;

        Ok(())
    }

    /// bm25-ranked matches; a malformed FTS5 query is an error
    pub async fn search(&self, query: &SearchQuery, limit: u32) -> SnyfterResult<Vec<SearchHit>> {
        let fts_query = query.to_fts5_query();
        debug!("🔍 Executing FTS5 query: {}", fts_query);

        let rows = sqlx::query(
            r#"
            SELECT
                d.id as document_id,
                d.filename,
                snippet(documents_fts, 0, '[', ']', '...', 16) as snippet,
                bm25(documents_fts) as rank,
                (1.0 / (1.0 + abs(bm25(documents_fts)))) as relevance_score
            FROM documents_fts
            JOIN documents d ON documents_fts.rowid = d.id
            WHERE documents_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(&fts_query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SnyfterError::database("full-text search", e))?;

        let hits: Vec<SearchHit> = rows
            .into_iter()
            .map(|row| SearchHit {
                document_id: row.get("document_id"),
                filename: row.get("filename"),
                snippet: row.get("snippet"),
                rank: row.get("rank"),
                relevance_score: row.get("relevance_score"),
            })
            .collect();

        debug!("🔍 Found {} FTS results", hits.len());
        Ok(hits)
    }
}

impl SearchQuery {
    pub fn to_fts5_query(&self) -> String {
        match self {
            SearchQuery::Simple(term) => term.clone(),
            SearchQuery::Phrase(phrase) => format!("\"{}\"", phrase),
            SearchQuery::Prefix(prefix) => format!("{}*", prefix),
            SearchQuery::Boolean(boolean) => boolean.to_string(),
        }
    }

    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.len() > 1 && input.starts_with('"') && input.ends_with('"') {
            SearchQuery::Phrase(input[1..input.len() - 1].to_string())
        } else if input.len() > 1 && input.ends_with('*') {
            SearchQuery::Prefix(input[..input.len() - 1].to_string())
        } else if let Some((left, right)) = input.split_once(" AND ") {
            SearchQuery::Boolean(BooleanQuery::new(left, BooleanOperator::And, right))
        } else if let Some((left, right)) = input.split_once(" OR ") {
            SearchQuery::Boolean(BooleanQuery::new(left, BooleanOperator::Or, right))
        } else if let Some((left, right)) = input.split_once(" NOT ") {
            SearchQuery::Boolean(BooleanQuery::new(left, BooleanOperator::Not, right))
        } else {
            SearchQuery::Simple(input.to_string())
        }
    }

    /// Plain text for substring fallback matching
    pub fn plain_text(&self) -> String {
        let term = match self {
            SearchQuery::Simple(term) | SearchQuery::Phrase(term) | SearchQuery::Prefix(term) => term,
            SearchQuery::Boolean(boolean) => &boolean.left,
        };
        term.trim_matches(|c: char| c == '"' || c == '*').trim().to_string()
    }
}

impl BooleanQuery {
    fn new(left: &str, operator: BooleanOperator, right: &str) -> Self {
        Self {
            left: left.trim().to_string(),
            operator,
            right: right.trim().to_string(),
        }
    }
}

impl std::fmt::Display for BooleanQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.left, self.operator, self.right)
    }
}

impl std::fmt::Display for BooleanOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BooleanOperator::And => write!(f, "AND"),
            BooleanOperator::Or => write!(f, "OR"),
            BooleanOperator::Not => write!(f, "NOT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_parsing() {
        assert!(matches!(SearchQuery::parse("hello"), SearchQuery::Simple(_)));
        assert!(matches!(SearchQuery::parse("\"hello world\""), SearchQuery::Phrase(_)));
        assert!(matches!(SearchQuery::parse("hello*"), SearchQuery::Prefix(_)));
        assert!(matches!(SearchQuery::parse("hello AND world"), SearchQuery::Boolean(_)));
        // proximity syntax is passed through to FTS5 untouched
        assert_eq!(
            SearchQuery::parse("NEAR(revenue growth, 5)"),
            SearchQuery::Simple("NEAR(revenue growth, 5)".to_string())
        );
        assert_eq!(SearchQuery::parse("  revenue ").plain_text(), "revenue");
        assert_eq!(SearchQuery::parse("\"open quote").plain_text(), "open quote");
    }

    #[test]
    fn test_fts5_query_generation() {
        let phrase = SearchQuery::Phrase("hello world".to_string());
        assert_eq!(phrase.to_fts5_query(), "\"hello world\"");

        let prefix = SearchQuery::Prefix("test".to_string());
        assert_eq!(prefix.to_fts5_query(), "test*");

        assert_eq!(SearchQuery::parse("cats NOT dogs").to_fts5_query(), "cats NOT dogs");
    }
}
