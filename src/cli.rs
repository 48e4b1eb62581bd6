use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::config::SnyfterConfig;
use crate::database::SnyfterDatabase;
use crate::model::{ExtractionResult, Table};
use crate::service::ExtractionService;

#[derive(Parser, Debug)]
#[command(name = "snyfter")]
#[command(about = "Extract text and tables from documents and keep them searchable")]
#[command(version)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL, e.g. sqlite:snyfter.db
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Never run OCR
    #[arg(long, global = true)]
    pub no_ocr: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract text and tables from a file
    Extract {
        file: PathBuf,

        /// Save the result in the database
        #[arg(long)]
        store: bool,

        /// Print the whole result as JSON
        #[arg(long)]
        json: bool,

        /// Table output format
        #[arg(long, value_enum, default_value_t = TableFormat::Markdown)]
        format: TableFormat,
    },
    /// Full-text search over stored documents
    Search {
        query: String,

        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// List stored documents
    List {
        #[arg(long, default_value_t = 20)]
        limit: u32,

        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Show a stored document's text
    Show { id: i64 },
    /// Print a stored document's tables
    Tables {
        id: i64,

        #[arg(long, value_enum, default_value_t = TableFormat::Markdown)]
        format: TableFormat,
    },
    /// Database statistics
    Status,
    /// Write the default configuration to a file
    InitConfig { path: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Html,
    Markdown,
    Text,
}

impl TableFormat {
    pub fn render(&self, table: &Table) -> String {
        let exports = table.exports();
        match self {
            TableFormat::Csv => exports.csv.clone(),
            TableFormat::Html => exports.html.clone(),
            TableFormat::Markdown => exports.markdown.clone(),
            TableFormat::Text => exports.text.clone(),
        }
    }
}

impl Cli {
    /// File config (or defaults), then `SNYFTER_*` variables, then flags
    pub fn resolve_config(&self) -> Result<SnyfterConfig> {
        let mut config = match &self.config {
            Some(path) => SnyfterConfig::load_from_file(path)?,
            None => SnyfterConfig::default(),
        };
        config.apply_env();

        if let Some(url) = &self.database {
            config.database.url = url.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.no_ocr {
            config.ocr.enabled = false;
        }

        config.validate()?;
        Ok(config)
    }
}

pub async fn extract_command(
    service: &ExtractionService,
    file: PathBuf,
    json: bool,
    format: TableFormat,
) -> Result<()> {
    info!("🔍 Extracting {:?}", file);
    let document = ExtractionService::read_document(&file).await?;

    let (document_id, result) = if service.database().is_some() {
        let stored = service.extract_and_store(document).await?;
        (Some(stored.document_id), stored.result)
    } else {
        let (_, result) = service.extract(document).await?;
        (None, result)
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&file, &result, format);
        if let Some(id) = document_id {
            println!("Stored in database as document {}", id);
        }
    }

    if result.is_error() {
        return Err(anyhow!("{}", result.full_text));
    }
    Ok(())
}

fn print_result(file: &Path, result: &ExtractionResult, format: TableFormat) {
    println!("📄 {}", file.display());
    println!("   Method: {}", result.processing_method);
    println!("   Pages: {}", result.page_count);
    println!("   Words: {}", result.word_count());
    println!("   OCR content: {}", if result.has_ocr_content { "yes" } else { "no" });
    println!("   Tables: {}", result.table_count);

    for table in &result.tables {
        print_table(table, format);
    }
}

fn print_table(table: &Table, format: TableFormat) {
    println!();
    let title = table.title().unwrap_or("Untitled table");
    match table.page() {
        Some(page) => println!("## Table {} (page {}): {}", table.index() + 1, page, title),
        None => println!("## Table {}: {}", table.index() + 1, title),
    }
    println!(
        "{} rows x {} columns, {}, quality {:.2}",
        table.row_count(),
        table.column_count(),
        table.table_type(),
        table.quality_score()
    );
    if let Some(reason) = table.truncation_reason() {
        println!("({}: {} of {} rows kept)", reason, table.stored_row_count(), table.original_row_count());
    }
    println!("{}", format.render(table));
}

pub async fn search_command(database: &SnyfterDatabase, query: &str, limit: u32) -> Result<()> {
    let hits = database.search_by_text(query, limit).await?;
    if hits.is_empty() {
        println!("No documents match '{}'", query);
        return Ok(());
    }

    for hit in hits {
        println!("[{}] {} ({:.3})", hit.document_id, hit.filename, hit.relevance_score);
        println!("    {}", hit.snippet.replace('\n', " "));
    }
    Ok(())
}

pub async fn list_command(database: &SnyfterDatabase, limit: u32, offset: u32) -> Result<()> {
    let documents = database.get_all(limit, offset).await?;
    if documents.is_empty() {
        println!("No documents stored");
        return Ok(());
    }

    for doc in documents {
        println!(
            "[{}] {} - {} pages, {} tables, {} ({})",
            doc.id,
            doc.filename,
            doc.page_count,
            doc.table_count,
            doc.processing_method,
            doc.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

pub async fn show_command(database: &SnyfterDatabase, id: i64) -> Result<()> {
    let doc = database
        .get_by_id(id)
        .await?
        .ok_or_else(|| anyhow!("Document {} not found", id))?;

    println!("📄 {} (id {})", doc.filename, doc.id);
    println!("   Hash: {}", doc.file_hash);
    println!("   Size: {} bytes", doc.file_size);
    println!("   Method: {}", doc.processing_method);
    println!("   Pages: {}, words: {}, tables: {}", doc.page_count, doc.word_count, doc.table_count);
    println!();
    println!("{}", doc.full_text);
    Ok(())
}

pub async fn tables_command(database: &SnyfterDatabase, id: i64, format: TableFormat) -> Result<()> {
    if database.get_by_id(id).await?.is_none() {
        return Err(anyhow!("Document {} not found", id));
    }

    let tables = database.get_tables(id).await?;
    println!("{} tables in document {}", tables.len(), id);
    for table in &tables {
        print_table(table, format);
    }
    Ok(())
}

pub async fn status_command(database: &SnyfterDatabase) -> Result<()> {
    let stats = database.stats().await?;

    println!("📊 SNYFTER Database Status");
    println!("==========================");
    println!("Documents: {}", stats.document_count);
    println!("Tables: {}", stats.table_count);
    println!("OCR documents: {}", stats.ocr_document_count);
    println!("Failed extractions: {}", stats.error_count);
    println!("Pages: {}", stats.total_pages);
    println!("Words: {}", stats.total_words);

    let recent = database.get_all(5, 0).await?;
    if !recent.is_empty() {
        println!("\nRecent Documents:");
        println!("-----------------");
        for doc in recent {
            println!("• {} ({})", doc.filename, doc.updated_at.to_rfc3339());
        }
    }
    Ok(())
}

pub fn init_config_command(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(anyhow!("{} already exists", path.display()));
    }
    SnyfterConfig::default().save_to_file(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extract_with_globals() {
        let cli = Cli::try_parse_from([
            "snyfter", "--no-ocr", "extract", "report.pdf", "--store", "--format", "csv",
        ])
        .unwrap();

        assert!(cli.no_ocr);
        match cli.command {
            Command::Extract { file, store, json, format } => {
                assert_eq!(file, PathBuf::from("report.pdf"));
                assert!(store);
                assert!(!json);
                assert_eq!(format, TableFormat::Csv);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "snyfter", "list", "--database", "sqlite::memory:", "--log-level", "debug", "--no-ocr",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.logging.level, "debug");
        assert!(!config.ocr.enabled);
    }

    #[test]
    fn test_init_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snyfter.toml");

        init_config_command(&path).unwrap();
        assert!(init_config_command(&path).is_err());

        let cli = Cli::try_parse_from(["snyfter", "--config", path.to_str().unwrap(), "status"]).unwrap();
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.limits.max_storage_rows, 10_000);
    }
}
