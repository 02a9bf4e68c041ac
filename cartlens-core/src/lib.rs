//! # cartlens-core
//!
//! Core library for cartlens - batch analytics over synthetic e-commerce
//! activity.
//!
//! This library provides:
//! - Domain types for users, products, sessions, and transactions
//! - Dataset loading and validation with a structured error report
//! - The analytics components: funnel, aggregation, cohort/CLV, affinity
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Raw:** JSON entity files written by the external generator (immutable)
//! - **Validated:** in-memory [`Dataset`] with invariants enforced and bad
//!   records excluded into an [`ErrorReport`](crate::error::ErrorReport)
//! - **Derived:** flat result tables, recomputable from the sources at any
//!   time
//!
//! ## Example
//!
//! ```rust,no_run
//! use cartlens_core::{analytics, Config, RawDataset};
//!
//! let config = Config::load().expect("failed to load config");
//! let raw = RawDataset::load_dir("data/".as_ref()).expect("failed to load dataset");
//! let report = analytics::run(raw, &config).expect("analytics run failed");
//! println!("{} affinity pairs", report.affinity_pairs.len());
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, ErrorReport, RecordError, Result};
pub use ingest::{Dataset, RawDataset};
pub use types::*;

// Public modules
pub mod analytics;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod types;
