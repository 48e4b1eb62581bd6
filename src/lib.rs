//! SNYFTER: document ingestion with table detection, OCR fallback and
//! full-text search.
//!
//! [`processing::DocumentProcessor`] is the synchronous core; the
//! [`service::ExtractionService`] runs it on tokio's blocking pool and
//! stores results through [`database::SnyfterDatabase`].

pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod extractors;
pub mod logging;
pub mod model;
pub mod ocr;
pub mod processing;
pub mod service;
pub mod table;

pub use config::SnyfterConfig;
pub use database::SnyfterDatabase;
pub use error::{SnyfterError, SnyfterResult};
pub use model::{Document, ExtractionResult, ProcessingMethod, Table, TableType};
pub use processing::DocumentProcessor;
pub use service::ExtractionService;
