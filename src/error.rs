use thiserror::Error;

/// Main error type for SNYFTER
#[derive(Error, Debug)]
pub enum SnyfterError {
    #[error("{format} parsing failed: {message}")]
    DocumentParse {
        format: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("OCR failed: {message}")]
    Ocr { message: String },

    #[error("Database operation failed: {operation}")]
    Database {
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("File I/O error: {path}")]
    FileIO {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid document format: expected {expected}, found {found}")]
    InvalidFormat { expected: String, found: String },

    #[error("General error: {0}")]
    General(#[from] anyhow::Error),
}

impl SnyfterError {
    /// Create a parse error for the given format
    pub fn parse(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DocumentParse {
            format: format.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a parse error with source
    pub fn parse_with_source(
        format: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::DocumentParse {
            format: format.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn ocr(message: impl Into<String>) -> Self {
        Self::Ocr {
            message: message.into(),
        }
    }

    /// Create a database error
    pub fn database(operation: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Database {
            operation: operation.into(),
            source,
        }
    }

    /// Create a file I/O error
    pub fn file_io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileIO {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn invalid_format(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::InvalidFormat {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Check if error is recoverable (the document can still be recorded)
    pub fn is_recoverable(&self) -> bool {
        match self {
            SnyfterError::DocumentParse { .. } => true,
            SnyfterError::Ocr { .. } => true,
            SnyfterError::InvalidFormat { .. } => true,
            SnyfterError::Database { .. } => false,
            SnyfterError::Configuration { .. } => false,
            _ => true,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            SnyfterError::DocumentParse { format, .. } => {
                format!("📄 SNYFTER couldn't read this {} file. It might be encrypted or corrupted.", format)
            }
            SnyfterError::Ocr { .. } => {
                "🔍 Text recognition failed. Scanned pages may be missing from the result.".to_string()
            }
            SnyfterError::Database { .. } => {
                "💾 Database error occurred. Your data might not be saved.".to_string()
            }
            SnyfterError::FileIO { .. } => {
                "📁 File access error. Check file permissions and disk space.".to_string()
            }
            SnyfterError::Configuration { message } => {
                format!("⚙️ Configuration problem: {}", message)
            }
            SnyfterError::InvalidFormat { expected, found } => {
                format!("📄 Expected a {} document but found {}.", expected, found)
            }
            _ => "🐹 Something went wrong. Check the logs for details.".to_string(),
        }
    }
}

/// Result type alias for convenience
pub type SnyfterResult<T> = Result<T, SnyfterError>;

/// Attach a format label to foreign parser errors
pub trait ErrorContext<T> {
    fn with_context(self, format: &str, context: &str) -> SnyfterResult<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context(self, format: &str, context: &str) -> SnyfterResult<T> {
        self.map_err(|e| SnyfterError::parse_with_source(format, context, e))
    }
}
