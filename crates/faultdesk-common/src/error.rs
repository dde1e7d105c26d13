//! Error types for Faultdesk
//!
//! Services return `anyhow::Result` and bail with `FaultdeskError` variants;
//! callers downcast at the boundary to decide how to surface a failure.

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum FaultdeskError {
    #[error("only .xlsx/.xls/.csv files are supported, got '{0}'")]
    UnsupportedFormat(String),

    #[error("invalid workbook file")]
    InvalidWorkbook,

    #[error("file contains no data rows")]
    NoDataRows,

    #[error("invalid CSV file: {0}")]
    InvalidCsv(String),

    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    #[error("archive does not contain alarm_local.csv")]
    MissingMember,

    #[error("{0} in archive is empty")]
    EmptyMember(String),

    #[error("no file content provided")]
    EmptyUpload,

    #[error("file is too large (max {max_mb}MB)")]
    FileTooLarge { max_mb: u64 },

    #[error("file path not found: {0}")]
    PathNotFound(String),

    #[error("no reports available for aggregation")]
    NoReportsAvailable,

    #[error("store inconsistency: {0}")]
    StoreInconsistency(String),
}

impl FaultdeskError {
    /// Whether the error was caused by the submitted input rather than the
    /// system itself. Input errors are surfaced as rejected requests and are
    /// never retried.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, FaultdeskError::StoreInconsistency(_))
    }
}
