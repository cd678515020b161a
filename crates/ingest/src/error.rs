use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Provider returned status {status} for {symbol}")]
    Status { symbol: String, status: u16 },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data from provider: {0}")]
    InvalidData(String),

    #[error("No price data for {symbol} from any source")]
    NoData { symbol: String },

    #[error("No price data from any source for any symbol")]
    NothingIngested,

    #[error("Symbol universe error: {0}")]
    Universe(String),

    #[error("Database error: {0}")]
    Database(#[from] database::DbError),
}
