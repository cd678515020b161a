use core_types::TradingDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("No trading days in range {start} to {end}")]
    NoTradingDays { start: TradingDate, end: TradingDate },

    #[error("Database error: {0}")]
    Database(#[from] database::DbError),

    #[error("Calculation error: {0}")]
    Calculation(String),
}
