//! # Market Data Ingestion
//!
//! Loads the symbol universe, downloads daily prices and derives market
//! caps, writing everything through `database::MarketDataWriter`.
//!
//! - `PriceDataSource`: the interface every provider implements, so
//!   sources can be chained and mocked.
//! - `YahooSource` / `StooqSource`: live providers (Yahoo's chart JSON with
//!   adjusted closes and company names, Stooq's daily CSV).
//! - `SyntheticSource`: a seeded random walk for offline use.
//! - `FallbackSource`: ordered providers with bounded retries.
//! - `run_ingest`: the end-to-end pipeline.

pub mod error;
pub mod pipeline;
pub mod source;
pub mod stooq;
pub mod synthetic;
pub mod universe;
pub mod yahoo;

#[cfg(test)]
mod test_support;

pub use error::IngestError;
pub use pipeline::{build_source, market_caps, run_ingest, IngestOptions, IngestReport};
pub use source::{FallbackSource, PriceDataSource};
pub use stooq::StooqSource;
pub use synthetic::{business_days, synthetic_shares, SyntheticSource};
pub use universe::{
    fetch_universe, load_universe, normalize_symbol, resolve_universe, static_universe,
    STATIC_SYMBOLS,
};
pub use yahoo::{parse_chart_json, ChartData, YahooSource};
