use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};

use snyfter::config::SnyfterConfig;
use snyfter::model::{Document, Table};
use snyfter::processing::DocumentProcessor;
use snyfter::table::TableFormatter;

#[derive(Parser)]
#[command(name = "extract_tables")]
#[command(about = "Detect the tables in a document and write them as CSV, TSV or markdown")]
struct Cli {
    /// Input document (pdf, docx, html, csv, xlsx, text...)
    input: PathBuf,

    /// Output file (optional, defaults to input_tables.{format})
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Skip OCR of scanned pages and images
    #[arg(long)]
    no_ocr: bool,
}

#[derive(ValueEnum, Clone, Copy)]
enum OutputFormat {
    Csv,
    Tsv,
    Markdown,
}

impl OutputFormat {
    fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Tsv => "tsv",
            OutputFormat::Markdown => "md",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = SnyfterConfig::load_from_env();
    if cli.no_ocr {
        config.ocr.enabled = false;
    }
    let processor = DocumentProcessor::new(config)?;

    let content = tokio::fs::read(&cli.input).await?;
    println!("Read {} bytes from {:?}", content.len(), cli.input);

    let document = Document::new(file_name(&cli.input), content);
    let result = tokio::task::spawn_blocking(move || processor.process(&document)).await?;
    if result.is_error() {
        return Err(anyhow!("{}", result.full_text));
    }
    println!("Found {} tables", result.tables.len());

    let rendered = render(&result.tables, cli.format)?;
    let output_path = cli
        .output
        .unwrap_or_else(|| default_output(&cli.input, cli.format.extension()));
    tokio::fs::write(&output_path, rendered).await?;
    println!("Wrote {} tables to {:?}", result.tables.len(), output_path);

    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn default_output(input: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_tables.{}", stem, extension))
}

fn table_heading(table: &Table) -> String {
    format!("Table {}: {}", table.index() + 1, table.title().unwrap_or("Untitled"))
}

fn render(tables: &[Table], format: OutputFormat) -> Result<String> {
    let formatter = TableFormatter::new();
    let mut out = String::new();

    for table in tables {
        match format {
            OutputFormat::Csv | OutputFormat::Tsv => {
                let delimiter = if matches!(format, OutputFormat::Tsv) { b'\t' } else { b',' };
                out.push_str(&format!("# {}\n", table_heading(table)));
                out.push_str(&formatter.to_csv(table.headers(), table.rows(), delimiter)?);
            }
            OutputFormat::Markdown => {
                out.push_str(&format!("## {}\n\n", table_heading(table)));
                out.push_str(&table.exports().markdown);
                out.push('\n');
            }
        }
        out.push('\n');
    }

    Ok(out)
}
