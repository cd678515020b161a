//! # Index Database Crate
//!
//! This crate acts as a high-level, application-specific interface to the
//! PostgreSQL database holding ingested market data and computed index rows.
//!
//! ## Architectural Principles
//!
//! - **Adapter Layer:** This crate encapsulates all database-specific logic.
//!   The rest of the application talks to the store traits, never to SQL.
//! - **Swappable Stores:** `DbRepository` is the Postgres implementation;
//!   `InMemoryStore` implements the same traits for tests and local runs.
//! - **Asynchronous & Pooled:** All operations are asynchronous, and the Postgres
//!   store uses a connection pool (`PgPool`) for concurrent access.
//!
//! ## Public API
//!
//! - `connect` / `run_migrations`: pool setup and schema migrations.
//! - `MarketDataStore`, `CompositionStore`, `PerformanceStore`, `IndexStore`,
//!   `MarketDataWriter`: the store contracts.
//! - `DbRepository`, `InMemoryStore`: the implementations.
//! - `DbError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod memory;
pub mod repository;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use memory::InMemoryStore;
pub use repository::DbRepository;
pub use store::{CompositionStore, IndexStore, MarketDataStore, MarketDataWriter, PerformanceStore};
