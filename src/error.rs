//! Error types for price_bulk

use zip::result::ZipError;

/// Who is at fault for a failed operation, mirroring the 4xx/5xx split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The caller sent something we cannot accept
    Client,
    /// Storage or internal failure
    Server,
}

/// Unified error type for import/export operations
#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    /// Request declared a media type other than `application/zip`
    #[error("Expected zip file, got: {0}")]
    UnsupportedContentType(String),
    /// Request body was empty
    #[error("Empty request body")]
    EmptyBody,
    /// Bytes are not a readable zip container
    #[error("Failed to read zip: {0}")]
    ArchiveFormat(#[source] ZipError),
    /// No member of the archive ends with `.csv`
    #[error("CSV file not found in zip. Files in archive: {available:?}")]
    MemberNotFound { available: Vec<String> },
    /// Malformed CSV row; `line` is 1-based in the raw member stream
    #[error("Invalid CSV at line {line}: {detail}")]
    CsvFormat { line: u64, detail: String },
    /// CSV member decompresses to more than the configured limit
    #[error("CSV file exceeds {limit} bytes uncompressed")]
    MemberTooLarge { limit: u64 },
    /// CSV held a header at most
    #[error("No valid records found in CSV")]
    NoRecords,
    /// Failed to build the export archive
    #[error("Failed to write zip: {0}")]
    ArchiveWrite(#[source] ZipError),
    /// I/O failure outside of archive decoding
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Database operation failed
    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),
    /// Blocking worker panicked or was cancelled
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

/// Short alias used across the crate
pub type Error = PriceError;

impl PriceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PriceError::UnsupportedContentType(_)
            | PriceError::EmptyBody
            | PriceError::ArchiveFormat(_)
            | PriceError::MemberNotFound { .. }
            | PriceError::CsvFormat { .. }
            | PriceError::MemberTooLarge { .. }
            | PriceError::NoRecords => ErrorClass::Client,
            PriceError::ArchiveWrite(_)
            | PriceError::Io(_)
            | PriceError::Storage(_)
            | PriceError::TaskFailed(_) => ErrorClass::Server,
        }
    }

    pub(crate) fn csv(line: u64, detail: impl Into<String>) -> Self {
        PriceError::CsvFormat {
            line,
            detail: detail.into(),
        }
    }
}

/// Result alias for price_bulk operations
pub type Result<T> = std::result::Result<T, PriceError>;
