use serde::{Deserialize, Serialize};
use std::path::Path;
use anyhow::{Result, anyhow};

use crate::error::{SnyfterError, SnyfterResult};
use crate::logging::LoggingConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SnyfterConfig {
    pub limits: LimitsConfig,
    pub heuristics: HeuristicsConfig,
    pub ocr: OcrConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Rows kept per table when storing; larger tables are truncated
    pub max_storage_rows: usize,

    /// Files at or above this size (bytes) skip table extraction
    pub max_table_file_size: u64,

    /// Full text is cut after this many bytes
    pub max_text_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicsConfig {
    /// Header score must reach this fraction of the non-empty cells
    pub header_threshold: f64,

    /// Fraction of values a column type must match
    pub type_threshold: f64,

    /// Minimum share of non-empty data cells for a table to be kept
    pub min_fill_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Enable OCR for scanned pages and embedded images
    pub enabled: bool,

    /// Recognized text below this confidence is discarded
    pub confidence_threshold: f64,

    /// OCR text must beat this confidence before table detection runs on it
    pub table_confidence_threshold: f64,

    /// Images smaller than this (either side, pixels) are skipped
    pub min_image_size: u32,

    /// Images larger than this (either side, pixels) are downscaled to fit
    pub max_image_size: u32,

    /// Pages with less native text than this are OCR'd
    pub min_page_chars: usize,

    /// Render resolution for scanned pages
    pub render_dpi: u32,

    /// Tesseract language code
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection string
    pub url: String,

    /// Maximum pooled connections
    pub max_connections: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_storage_rows: 10_000,
            max_table_file_size: 10 * 1024 * 1024,
            max_text_bytes: 512 * 1024,
        }
    }
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            header_threshold: 0.6,
            type_threshold: 0.6,
            min_fill_ratio: 0.3,
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: 0.1,
            table_confidence_threshold: 0.3,
            min_image_size: 50,
            max_image_size: 4096,
            min_page_chars: 50,
            render_dpi: 300,
            language: "eng".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:snyfter.db".to_string(),
            max_connections: 5,
        }
    }
}

impl SnyfterConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow!("Failed to read config file: {}", e))?;

        let config: SnyfterConfig = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `SNYFTER_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("SNYFTER_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(rows) = std::env::var("SNYFTER_MAX_STORAGE_ROWS") {
            if let Ok(value) = rows.parse::<usize>() {
                self.limits.max_storage_rows = value;
            }
        }

        if let Ok(size) = std::env::var("SNYFTER_MAX_TABLE_FILE_SIZE") {
            if let Ok(value) = size.parse::<u64>() {
                self.limits.max_table_file_size = value;
            }
        }

        if let Ok(enabled) = std::env::var("SNYFTER_OCR_ENABLED") {
            self.ocr.enabled = enabled.to_lowercase() == "true";
        }

        if let Ok(level) = std::env::var("SNYFTER_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| anyhow!("Failed to write config file: {}", e))?;

        Ok(())
    }

    pub fn validate(&self) -> SnyfterResult<()> {
        let ratios = [
            ("heuristics.header_threshold", self.heuristics.header_threshold),
            ("heuristics.type_threshold", self.heuristics.type_threshold),
            ("heuristics.min_fill_ratio", self.heuristics.min_fill_ratio),
            ("ocr.confidence_threshold", self.ocr.confidence_threshold),
            ("ocr.table_confidence_threshold", self.ocr.table_confidence_threshold),
        ];
        for (name, value) in ratios {
            if !(value > 0.0 && value <= 1.0) {
                return Err(SnyfterError::configuration(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.limits.max_storage_rows == 0 {
            return Err(SnyfterError::configuration("limits.max_storage_rows must be > 0"));
        }
        if self.limits.max_table_file_size == 0 {
            return Err(SnyfterError::configuration("limits.max_table_file_size must be > 0"));
        }
        if self.ocr.min_image_size > self.ocr.max_image_size {
            return Err(SnyfterError::configuration(
                "ocr.min_image_size must not exceed ocr.max_image_size",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use std::fs;

    #[test]
    fn test_default_config() {
        let config = SnyfterConfig::default();
        assert_eq!(config.limits.max_storage_rows, 10_000);
        assert_eq!(config.limits.max_table_file_size, 10 * 1024 * 1024);
        assert_eq!(config.heuristics.header_threshold, 0.6);
        assert!(config.ocr.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = SnyfterConfig::default();
        config.limits.max_storage_rows = 250;
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("snyfter.toml");

        config.save_to_file(&config_path).unwrap();

        let loaded_config = SnyfterConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded_config.limits.max_storage_rows, 250);
        assert_eq!(loaded_config.ocr.language, "eng");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("partial.toml");
        fs::write(&config_path, "[ocr]\nenabled = false\n").unwrap();

        let config = SnyfterConfig::load_from_file(&config_path).unwrap();
        assert!(!config.ocr.enabled);
        assert_eq!(config.ocr.min_image_size, 50);
        assert_eq!(config.heuristics.type_threshold, 0.6);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut config = SnyfterConfig::default();
        config.heuristics.type_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(SnyfterError::Configuration { .. })
        ));
    }
}
