//! # Index Engine
//!
//! Builds the equal-weighted top-N index and answers the three read queries
//! over what was built.
//!
//! ## Architectural Principles
//!
//! - **Storage through traits:** every component holds an `Arc` of one of the
//!   `database` store traits, so the same code runs against Postgres or the
//!   in-memory store.
//! - **Write once per build:** `IndexBuilder` computes a whole date range in
//!   memory and hands the result to the store in a single call.
//! - **Readers never compute:** `PerformanceReader`, `CompositionReader` and
//!   `CompositionDiffer` only read stored rows.
//!
//! ## Public API
//!
//! - `IndexBuilder`: ranks, weights and compounds the index over a date range.
//! - `PerformanceReader` / `CompositionReader`: stored rows for a range or a date.
//! - `CompositionDiffer`: entries and exits between consecutive snapshots.
//! - `IndexError`: the error type returned by all of the above.

pub mod builder;
pub mod differ;
pub mod error;
pub mod readers;

pub use builder::{equal_weight, mean, simple_return, BuildRun, IndexBuilder};
pub use differ::{changes_between, diff_snapshots, group_by_date, CompositionDiffer};
pub use error::IndexError;
pub use readers::{CompositionReader, PerformanceReader};
