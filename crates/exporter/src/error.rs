use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to read index data: {0}")]
    Index(#[from] index_engine::IndexError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown export sheet '{0}' (expected performance, composition or changes)")]
    UnknownSheet(String),
}
