//! SQLite persistence for extraction results.
//!
//! Documents are keyed by the blake3 hash of their bytes, so storing the
//! same file twice updates one record. Tables are stored as JSON next to
//! the document, and the text is indexed in FTS5.

pub mod search;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::{SnyfterError, SnyfterResult};
use crate::model::{Document, ExtractionResult, ProcessingMethod, Table};

pub use search::{FtsIndex, SearchHit, SearchQuery};

const SNIPPET_RADIUS: usize = 60;

const DOCUMENT_COLUMNS: &str = "id, filename, file_hash, file_size, file_type, full_text, page_count, \
     word_count, has_ocr_content, processing_method, table_count, created_at, updated_at";

/// A stored document without its tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: i64,
    pub filename: String,
    pub file_hash: String,
    pub file_size: i64,
    pub file_type: Option<String>,
    pub full_text: String,
    pub page_count: i64,
    pub word_count: i64,
    pub has_ocr_content: bool,
    pub processing_method: ProcessingMethod,
    pub table_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub document_count: i64,
    pub table_count: i64,
    pub ocr_document_count: i64,
    pub total_pages: i64,
    pub total_words: i64,
    pub error_count: i64,
}

pub struct SnyfterDatabase {
    pool: SqlitePool,
    fts: FtsIndex,
}

impl SnyfterDatabase {
    /// Open (creating if needed) the database and its schema
    pub async fn connect(config: &DatabaseConfig) -> SnyfterResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| SnyfterError::database("parse database url", e))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| SnyfterError::database("connect", e))?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> SnyfterResult<Self> {
        let db = Self {
            fts: FtsIndex::new(pool.clone()),
            pool,
        };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> SnyfterResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                file_hash TEXT NOT NULL UNIQUE,
                file_size INTEGER NOT NULL,
                file_type TEXT,
                full_text TEXT NOT NULL,
                page_count INTEGER NOT NULL,
                word_count INTEGER NOT NULL,
                has_ocr_content INTEGER NOT NULL,
                processing_method TEXT NOT NULL,
                table_count INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS document_tables (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                table_index INTEGER NOT NULL,
                page INTEGER,
                title TEXT,
                table_type TEXT NOT NULL,
                row_count INTEGER NOT NULL,
                column_count INTEGER NOT NULL,
                is_truncated INTEGER NOT NULL,
                table_json TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_documents_method ON documents(processing_method)",
            "CREATE INDEX IF NOT EXISTS idx_tables_document ON document_tables(document_id, table_index)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| SnyfterError::database("create schema", e))?;
        }

        self.fts.init_schema().await
    }

    /// Insert or update by content hash; returns the record id
    pub async fn save(&self, document: &Document, result: &ExtractionResult) -> SnyfterResult<i64> {
        let hash = document.content_hash();
        let now = Utc::now().to_rfc3339();
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|e| SnyfterError::database("begin save", e))?;

        let existing: Option<i64> = sqlx::query("SELECT id FROM documents WHERE file_hash = ?")
            .bind(&hash)
            .fetch_optional(&mut *transaction)
            .await
            .map_err(|e| SnyfterError::database("look up hash", e))?
            .map(|row| row.get("id"));

        let id = match existing {
            Some(id) => {
                sqlx::query(
                    "UPDATE documents SET filename = ?, file_size = ?, file_type = ?, full_text = ?, page_count = ?, \
                     word_count = ?, has_ocr_content = ?, processing_method = ?, table_count = ?, updated_at = ? \
                     WHERE id = ?",
                )
                .bind(&document.filename)
                .bind(document.file_size() as i64)
                .bind(document.extension())
                .bind(&result.full_text)
                .bind(result.page_count as i64)
                .bind(result.word_count() as i64)
                .bind(result.has_ocr_content)
                .bind(result.processing_method.as_str())
                .bind(result.table_count as i64)
                .bind(&now)
                .bind(id)
                .execute(&mut *transaction)
                .await
                .map_err(|e| SnyfterError::database("update document", e))?;

                sqlx::query("DELETE FROM document_tables WHERE document_id = ?")
                    .bind(id)
                    .execute(&mut *transaction)
                    .await
                    .map_err(|e| SnyfterError::database("clear tables", e))?;
                debug!("♻️ Updating document {} ({})", id, document.filename);
                id
            }
            None => sqlx::query(
                "INSERT INTO documents (filename, file_hash, file_size, file_type, full_text, page_count, word_count, \
                 has_ocr_content, processing_method, table_count, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&document.filename)
            .bind(&hash)
            .bind(document.file_size() as i64)
            .bind(document.extension())
            .bind(&result.full_text)
            .bind(result.page_count as i64)
            .bind(result.word_count() as i64)
            .bind(result.has_ocr_content)
            .bind(result.processing_method.as_str())
            .bind(result.table_count as i64)
            .bind(&now)
            .bind(&now)
            .execute(&mut *transaction)
            .await
            .map_err(|e| SnyfterError::database("insert document", e))?
            .last_insert_rowid(),
        };

        for table in &result.tables {
            let json = serde_json::to_string(table)
                .map_err(|e| SnyfterError::General(anyhow::anyhow!("failed to serialize table: {}", e)))?;
            sqlx::query(
                "INSERT INTO document_tables (document_id, table_index, page, title, table_type, row_count, \
                 column_count, is_truncated, table_json) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(table.index() as i64)
            .bind(table.page().map(i64::from))
            .bind(table.title())
            .bind(table.table_type().as_str())
            .bind(table.row_count() as i64)
            .bind(table.column_count() as i64)
            .bind(table.is_truncated())
            .bind(json)
            .execute(&mut *transaction)
            .await
            .map_err(|e| SnyfterError::database("insert table", e))?;
        }

        self.fts
            .index_document(&mut transaction, id, &document.filename, &result.full_text)
            .await?;
        transaction
            .commit()
            .await
            .map_err(|e| SnyfterError::database("commit save", e))?;

        info!("💾 Stored {} as document {} with {} tables", document.filename, id, result.table_count);
        Ok(id)
    }

    pub async fn get_by_id(&self, id: i64) -> SnyfterResult<Option<StoredDocument>> {
        let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SnyfterError::database("get document", e))?;

        row.as_ref().map(document_from_row).transpose()
    }

    /// Stored tables of a document in index order
    pub async fn get_tables(&self, document_id: i64) -> SnyfterResult<Vec<Table>> {
        let rows = sqlx::query("SELECT table_json FROM document_tables WHERE document_id = ? ORDER BY table_index")
            .bind(document_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SnyfterError::database("get tables", e))?;

        rows.iter()
            .map(|row| {
                let json: String = row.get("table_json");
                serde_json::from_str(&json).map_err(|e| {
                    SnyfterError::invalid_format("table JSON", format!("document {}: {}", document_id, e))
                })
            })
            .collect()
    }

    /// Most recently updated first
    pub async fn get_all(&self, limit: u32, offset: u32) -> SnyfterResult<Vec<StoredDocument>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY updated_at DESC, id DESC LIMIT ? OFFSET ?",
            DOCUMENT_COLUMNS
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SnyfterError::database("list documents", e))?;

        rows.iter().map(document_from_row).collect()
    }

    /// FTS5 bm25 search, falling back to a substring match when the query
    /// is not valid FTS5 syntax or matches nothing
    pub async fn search_by_text(&self, query: &str, limit: u32) -> SnyfterResult<Vec<SearchHit>> {
        let parsed = SearchQuery::parse(query);

        match self.fts.search(&parsed, limit).await {
            Ok(hits) if !hits.is_empty() => return Ok(hits),
            Ok(_) => debug!("No FTS matches for '{}', trying substring search", query),
            Err(e) => warn!("⚠️ FTS query '{}' failed, trying substring search: {}", query, e),
        }

        self.search_like(&parsed.plain_text(), limit).await
    }

    async fn search_like(&self, needle: &str, limit: u32) -> SnyfterResult<Vec<SearchHit>> {
        if needle.trim().is_empty() {
            return Ok(Vec::new());
        }

        let pattern = format!("%{}%", needle.trim());
        let rows = sqlx::query(
            "SELECT id, filename, full_text FROM documents \
             WHERE full_text LIKE ? OR filename LIKE ? ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SnyfterError::database("substring search", e))?;

        Ok(rows
            .iter()
            .map(|row| {
                let full_text: String = row.get("full_text");
                SearchHit {
                    document_id: row.get("id"),
                    filename: row.get("filename"),
                    snippet: snippet_around(&full_text, needle.trim()),
                    rank: 0.0,
                    relevance_score: 0.0,
                }
            })
            .collect())
    }

    pub async fn search_by_processing_method(
        &self,
        method: ProcessingMethod,
        limit: u32,
    ) -> SnyfterResult<Vec<StoredDocument>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE processing_method = ? ORDER BY updated_at DESC LIMIT ?",
            DOCUMENT_COLUMNS
        ))
        .bind(method.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SnyfterError::database("search by method", e))?;

        rows.iter().map(document_from_row).collect()
    }

    pub async fn get_ocr_documents(&self, limit: u32) -> SnyfterResult<Vec<StoredDocument>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE has_ocr_content = 1 ORDER BY updated_at DESC LIMIT ?",
            DOCUMENT_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SnyfterError::database("list OCR documents", e))?;

        rows.iter().map(document_from_row).collect()
    }

    /// Returns whether a document was removed
    pub async fn delete(&self, id: i64) -> SnyfterResult<bool> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|e| SnyfterError::database("begin delete", e))?;

        sqlx::query("DELETE FROM document_tables WHERE document_id = ?")
            .bind(id)
            .execute(&mut *transaction)
            .await
            .map_err(|e| SnyfterError::database("delete tables", e))?;
        let removed = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *transaction)
            .await
            .map_err(|e| SnyfterError::database("delete document", e))?
            .rows_affected()
            > 0;
        self.fts.remove_document(&mut transaction, id).await?;

        transaction
            .commit()
            .await
            .map_err(|e| SnyfterError::database("commit delete", e))?;

        if removed {
            info!("🗑️ Deleted document {}", id);
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> SnyfterResult<DatabaseStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as document_count,
                COALESCE(SUM(table_count), 0) as table_count,
                COALESCE(SUM(CASE WHEN has_ocr_content THEN 1 ELSE 0 END), 0) as ocr_document_count,
                COALESCE(SUM(page_count), 0) as total_pages,
                COALESCE(SUM(word_count), 0) as total_words,
                COALESCE(SUM(CASE WHEN processing_method = 'error' THEN 1 ELSE 0 END), 0) as error_count
            FROM documents
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SnyfterError::database("collect stats", e))?;

        Ok(DatabaseStats {
            document_count: row.get("document_count"),
            table_count: row.get("table_count"),
            ocr_document_count: row.get("ocr_document_count"),
            total_pages: row.get("total_pages"),
            total_words: row.get("total_words"),
            error_count: row.get("error_count"),
        })
    }

    pub async fn rebuild_search_index(&self) -> SnyfterResult<()> {
        self.fts.rebuild().await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_timestamp(value: &str) -> SnyfterResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| SnyfterError::invalid_format("RFC 3339 timestamp", value))
}

fn document_from_row(row: &SqliteRow) -> SnyfterResult<StoredDocument> {
    Ok(StoredDocument {
        id: row.get("id"),
        filename: row.get("filename"),
        file_hash: row.get("file_hash"),
        file_size: row.get("file_size"),
        file_type: row.get("file_type"),
        full_text: row.get("full_text"),
        page_count: row.get("page_count"),
        word_count: row.get("word_count"),
        has_ocr_content: row.get("has_ocr_content"),
        processing_method: row.get::<String, _>("processing_method").parse()?,
        table_count: row.get("table_count"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}

/// Up to [`SNIPPET_RADIUS`] chars either side of the first case-insensitive match
fn snippet_around(text: &str, needle: &str) -> String {
    let lower = text.to_lowercase();
    let Some(byte_at) = lower.find(&needle.to_lowercase()) else {
        return text.chars().take(SNIPPET_RADIUS * 2).collect();
    };

    // lowercasing can shift byte offsets; work in chars from here
    let char_at = lower[..byte_at].chars().count();
    let start = char_at.saturating_sub(SNIPPET_RADIUS);
    let length = needle.chars().count() + SNIPPET_RADIUS * 2;
    let snippet: String = text.chars().skip(start).take(length).collect();

    format!("{}{}", if start > 0 { "..." } else { "" }, snippet.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> SnyfterDatabase {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SnyfterDatabase::from_pool(pool).await.unwrap()
    }

    fn result(text: &str, method: ProcessingMethod, ocr: bool) -> ExtractionResult {
        ExtractionResult::new(text.to_string(), 2, ocr, method, Vec::new())
    }

    #[tokio::test]
    async fn test_failed_indexing_rolls_back_save() {
        let db = memory_db().await;
        let doc = Document::new("ledger.txt", b"opening balance carried forward".to_vec());
        let extracted = result("opening balance carried forward", ProcessingMethod::TextExtraction, false);

        sqlx::query("DROP TABLE documents_fts").execute(&db.pool).await.unwrap();
        assert!(db.save(&doc, &extracted).await.is_err());
        assert!(db.get_all(10, 0).await.unwrap().is_empty());

        db.fts.init_schema().await.unwrap();
        let id = db.save(&doc, &extracted).await.unwrap();
        let hits = db.search_by_text("balance", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, id);
    }

    #[tokio::test]
    async fn test_save_upserts_by_hash() {
        let db = memory_db().await;
        let doc = Document::new("report.txt", b"quarterly revenue figures".to_vec());

        let first = db
            .save(&doc, &result("quarterly revenue figures", ProcessingMethod::TextExtraction, false))
            .await
            .unwrap();
        let renamed = Document::new("report-copy.txt", doc.content.clone());
        let second = db
            .save(&renamed, &result("quarterly revenue figures", ProcessingMethod::TextExtraction, false))
            .await
            .unwrap();

        assert_eq!(first, second);
        let stored = db.get_by_id(first).await.unwrap().unwrap();
        assert_eq!(stored.filename, "report-copy.txt");
        assert_eq!(stored.file_type.as_deref(), Some("txt"));
        assert_eq!(stored.word_count, 3);
        assert_eq!(db.get_all(10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_text_search_ranks_and_falls_back() {
        let db = memory_db().await;
        for (name, text) in [
            ("a.txt", "The revenue grew while costs fell"),
            ("b.txt", "Revenue revenue revenue everywhere"),
            ("c.txt", "Nothing to see here"),
        ] {
            let doc = Document::new(name, text.as_bytes().to_vec());
            db.save(&doc, &result(text, ProcessingMethod::TextExtraction, false))
                .await
                .unwrap();
        }

        let hits = db.search_by_text("revenue", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].filename, "b.txt");

        // a partial word never matches a token, so the substring search answers
        let hits = db.search_by_text("venu", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].rank, 0.0);

        // unbalanced quotes are an FTS5 syntax error
        let hits = db.search_by_text("\"see", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "c.txt");
    }

    #[tokio::test]
    async fn test_filters_delete_and_stats() {
        let db = memory_db().await;
        let scanned = Document::new("scan.pdf", b"%PDF scanned".to_vec());
        let plain = Document::new("notes.txt", b"plain notes".to_vec());

        let scan_id = db
            .save(&scanned, &result("recognized words", ProcessingMethod::Ocr, true))
            .await
            .unwrap();
        db.save(&plain, &result("plain notes", ProcessingMethod::TextExtraction, false))
            .await
            .unwrap();

        let ocr = db.get_ocr_documents(10).await.unwrap();
        assert_eq!(ocr.len(), 1);
        assert_eq!(ocr[0].id, scan_id);

        let by_method = db
            .search_by_processing_method(ProcessingMethod::TextExtraction, 10)
            .await
            .unwrap();
        assert_eq!(by_method.len(), 1);
        assert_eq!(by_method[0].filename, "notes.txt");

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.document_count, 2);
        assert_eq!(stats.ocr_document_count, 1);
        assert_eq!(stats.total_pages, 4);

        assert!(db.delete(scan_id).await.unwrap());
        assert!(!db.delete(scan_id).await.unwrap());
        assert!(db.get_by_id(scan_id).await.unwrap().is_none());
        assert!(db.search_by_text("recognized", 10).await.unwrap().is_empty());
    }

    #[test]
    fn test_snippet_around_match() {
        let text = format!("{}needle{}", "a".repeat(100), "b".repeat(100));
        let snippet = snippet_around(&text, "NEEDLE");
        assert!(snippet.starts_with("..."));
        assert!(snippet.contains("needle"));
        assert_eq!(snippet.chars().count(), 3 + 60 + 6 + 60);
    }
}
