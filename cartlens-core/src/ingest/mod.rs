//! Ingestion layer for generated dataset directories
//!
//! The external generator writes one directory per dataset:
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ users.json       │     │                 │     │                  │
//! │ categories.json  │ ──► │   RawDataset    │ ──► │     Dataset      │
//! │ products.json    │     │   (as written)  │     │ (validated,      │
//! │ transactions.json│     │                 │     │  indexed, with   │
//! │ sessions_*.json  │     │                 │     │  an ErrorReport) │
//! └──────────────────┘     └─────────────────┘     └──────────────────┘
//! ```
//!
//! Loading reads the files verbatim; validation enforces the entity
//! invariants, excludes bad records, and accumulates the per-run
//! [`ErrorReport`](crate::error::ErrorReport). Analytics only ever see a
//! validated [`Dataset`].

mod loader;
mod validate;

pub use loader::RawDataset;
pub use validate::Dataset;
