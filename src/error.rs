// src/error.rs

use thiserror::Error;

/// Errors surfaced by the reconciliation pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("spreadsheet read error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("spreadsheet write error: {0}")]
    Report(String),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no text layer in {0}")]
    NoTextLayer(String),

    #[error("run cancelled")]
    Cancelled,
}

impl From<tempfile::PersistError> for Error {
    fn from(e: tempfile::PersistError) -> Self {
        Error::Io(e.error)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
