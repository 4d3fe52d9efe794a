//! Error types for the fibermap core library.

/// Top-level error enum for the fibermap core library.
///
/// Data-content problems in a spreadsheet (missing cells, unknown prefixes,
/// malformed codes) are never errors: they surface as discarded rows in the
/// extraction report. Only environment failures end up here.
#[derive(Debug, thiserror::Error)]
pub enum FiberError {
    #[error("Spreadsheet unreadable: {0}")]
    SheetUnreadable(String),

    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Invalid project: {0}")]
    InvalidProject(String),

    #[error("No spreadsheet attached to project: {0}")]
    MissingWorkbook(String),

    #[error("Invalid saved configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<calamine::Error> for FiberError {
    fn from(err: calamine::Error) -> FiberError {
        FiberError::SheetUnreadable(err.to_string())
    }
}

pub type FiberResult<T> = Result<T, FiberError>;
