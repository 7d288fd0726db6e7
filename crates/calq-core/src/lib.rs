//! # Calq Core Library
//!
//! A local calendar query engine: given todo and completion rows from a
//! local store, it answers "what is on this date" and "what is on these
//! dates" with view-ready items, and keeps a range cache in front of the
//! answers.
//!
//! ## Features
//!
//! - **Recurrence Engine**: Normalizes loosely-formatted rules (RRULE text,
//!   rule lists, structured objects) and expands them day by day with a
//!   bounded span
//! - **Three-Stage Pipeline**: Candidate fetch, occurrence decision and
//!   aggregation with per-stage counts and timings
//! - **Range Cache**: Interval-merging cache with coalesced in-flight loads,
//!   invalidation by date range and month-gated retention pruning
//! - **Storage Seam**: SQLite candidate store built on sqlx, plus an
//!   in-memory store for tests and embedding
//!
//! ## Core Modules
//!
//! - [`date`]: Calendar dates, date-only normalization and inclusive ranges
//! - [`recurrence`]: Rule normalization, occurrence checks and expansion
//! - [`interval`]: Interval algebra over date ranges
//! - [`pipeline`]: Candidate, decision and aggregation stages plus the orchestrator
//! - [`cache`]: Range cache over the orchestrator
//! - [`repository`]: Candidate store trait and implementations
//! - [`db`]: Database connection and migration management
//! - [`config`]: Layered configuration
//! - [`error`]: Error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use calq_core::{
//!     cache::RangeCache, config::Config, date::DateRange, db,
//!     repository::SqliteCandidateStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::establish_connection("calendar.db").await?;
//!     let store = Arc::new(SqliteCandidateStore::from_config(pool, &config));
//!
//!     let cache = RangeCache::from_store(store, &config.cache);
//!     let march = DateRange::parse("2026-03-01", "2026-03-31")?;
//!     let view = cache.get_or_load_range(march, false).await?;
//!     for (date, items) in &view.items_by_date {
//!         println!("{}: {} item(s)", date, items.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod date;
pub mod db;
pub mod error;
pub mod interval;
pub mod models;
pub mod pipeline;
pub mod recurrence;
pub mod repository;

pub use cache::{CacheEntry, EnsureOutcome, RangeCache, RangeView, RetentionPolicy};
pub use date::{CalendarDate, DateRange};
pub use error::{CoreError, QueryError, Stage};
pub use pipeline::{QueryOrchestrator, QueryReport};
