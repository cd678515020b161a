pub mod date;
pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use date::{DateRange, TradingDate};
pub use enums::BuildStatus;
pub use error::CoreError;
pub use structs::{
    BuildSummary, CompositionChange, ConstituentWeight, IndexComposition, IndexPerformance,
    MarketCapSnapshot, PriceSnapshot, RankedSymbol, Stock,
};
