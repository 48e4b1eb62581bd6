//! Async front door: runs the blocking pipeline off the runtime threads
//! and optionally stores the outcome.

use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use tracing::info;

use crate::database::SnyfterDatabase;
use crate::error::{SnyfterError, SnyfterResult};
use crate::model::{Document, ExtractionResult};
use crate::processing::DocumentProcessor;

/// Outcome of [`ExtractionService::extract_and_store`]
#[derive(Debug, Clone)]
pub struct StoredExtraction {
    pub document_id: i64,
    pub content_hash: String,
    pub result: ExtractionResult,
}

#[derive(Clone)]
pub struct ExtractionService {
    processor: Arc<DocumentProcessor>,
    database: Option<Arc<SnyfterDatabase>>,
}

impl ExtractionService {
    pub fn new(processor: DocumentProcessor) -> Self {
        Self {
            processor: Arc::new(processor),
            database: None,
        }
    }

    pub fn with_database(mut self, database: SnyfterDatabase) -> Self {
        self.database = Some(Arc::new(database));
        self
    }

    pub fn database(&self) -> Option<&SnyfterDatabase> {
        self.database.as_deref()
    }

    pub async fn read_document(path: impl AsRef<Path>) -> SnyfterResult<Document> {
        let path = path.as_ref();
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| SnyfterError::file_io(path.display().to_string(), e))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Document::new(filename, content))
    }

    /// Process on the blocking pool; the document comes back with the result
    pub async fn extract(&self, document: Document) -> SnyfterResult<(Document, ExtractionResult)> {
        let processor = Arc::clone(&self.processor);

        tokio::task::spawn_blocking(move || {
            let result = processor.process(&document);
            (document, result)
        })
        .await
        .map_err(|e| SnyfterError::General(anyhow!("extraction worker failed: {}", e)))
    }

    pub async fn extract_and_store(&self, document: Document) -> SnyfterResult<StoredExtraction> {
        let database = self
            .database
            .clone()
            .ok_or_else(|| SnyfterError::configuration("no database configured for storing results"))?;

        let (document, result) = self.extract(document).await?;
        let document_id = database.save(&document, &result).await?;
        info!("📦 {} stored as document {}", document.filename, document_id);

        Ok(StoredExtraction {
            document_id,
            content_hash: document.content_hash(),
            result,
        })
    }
}
