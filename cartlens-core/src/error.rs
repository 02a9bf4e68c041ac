//! Error types for cartlens-core
//!
//! Two layers, per the batch failure semantics:
//!
//! - [`Error`] aborts the whole run. Only configuration problems and an
//!   exceeded error-rate threshold do this.
//! - [`RecordError`] is fatal for a single input record. These accumulate
//!   in an [`ErrorReport`] that is returned alongside successful results;
//!   the run as a whole still succeeds.

use serde::Serialize;
use thiserror::Error;

/// Main error type for the cartlens-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error (fatal, the job does not start)
    #[error("configuration error: {0}")]
    Config(String),

    /// Per-record error rate exceeded the configured abort threshold
    #[error(
        "error rate {rate:.4} ({errors}/{records} records) exceeds abort threshold {threshold}"
    )]
    AbortThresholdExceeded {
        errors: usize,
        records: usize,
        rate: f64,
        threshold: f64,
    },
}

/// Result type alias for cartlens-core
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of input entity a record error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Category,
    Product,
    Session,
    Transaction,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Category => "category",
            EntityKind::Product => "product",
            EntityKind::Session => "session",
            EntityKind::Transaction => "transaction",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A problem with a single input record.
///
/// The offending record is excluded from all aggregates; the run continues.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordError {
    /// Malformed or out-of-range field
    #[error("validation: {entity} {id}: {reason}")]
    Validation {
        entity: EntityKind,
        id: String,
        reason: String,
    },

    /// Dangling foreign key
    #[error("referential integrity: {entity} {id}: {field} references unknown {missing}")]
    ReferentialIntegrity {
        entity: EntityKind,
        id: String,
        field: &'static str,
        missing: String,
    },
}

impl RecordError {
    /// Id of the record the error refers to.
    pub fn record_id(&self) -> &str {
        match self {
            RecordError::Validation { id, .. } => id,
            RecordError::ReferentialIntegrity { id, .. } => id,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, RecordError::Validation { .. })
    }

    pub fn is_referential(&self) -> bool {
        matches!(self, RecordError::ReferentialIntegrity { .. })
    }
}

/// Structured per-run error report.
///
/// Collected during ingestion and surfaced next to the result tables.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorReport {
    /// Errors in input order
    pub errors: Vec<RecordError>,
    /// Total input records inspected (denominator for the error rate)
    pub records_seen: usize,
}

impl ErrorReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one inspected input record.
    pub fn saw_record(&mut self) {
        self.records_seen += 1;
    }

    /// Record an error for the current record.
    pub fn push(&mut self, error: RecordError) {
        tracing::warn!(error = %error, "Record excluded from run");
        self.errors.push(error);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fraction of inspected records that errored, in [0, 1].
    pub fn error_rate(&self) -> f64 {
        if self.records_seen == 0 {
            0.0
        } else {
            self.errors.len() as f64 / self.records_seen as f64
        }
    }

    /// Abort the run if the error rate is over the configured threshold.
    pub fn check_abort(&self, threshold: f64) -> Result<()> {
        let rate = self.error_rate();
        if rate > threshold {
            return Err(Error::AbortThresholdExceeded {
                errors: self.errors.len(),
                records: self.records_seen,
                rate,
                threshold,
            });
        }
        Ok(())
    }
}
