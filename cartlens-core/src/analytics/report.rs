//! Flat result tables.
//!
//! Every analytics component emits rows of named fields, ready for any
//! downstream reporting collaborator. Row ordering is deterministic:
//! re-running the pipeline on unchanged input renders byte-identical
//! tables.

use crate::types::{CohortKey, FunnelStage};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// A row type that can render itself as a CSV line.
pub trait TableRow {
    /// CSV header line, without trailing newline.
    fn header() -> &'static str;
    /// One CSV data line, without trailing newline.
    fn to_csv(&self) -> String;
}

/// Render a whole table as CSV (header + rows, one trailing newline).
pub fn render_csv<R: TableRow>(rows: &[R]) -> String {
    let mut out = String::with_capacity(64 * (rows.len() + 1));
    out.push_str(R::header());
    out.push('\n');
    for row in rows {
        out.push_str(&row.to_csv());
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// How far sessions got through the funnel.
///
/// `sessions` counts sessions whose maximal stage reached at least this
/// stage, so counts are non-increasing down the funnel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelSummaryRow {
    pub stage: FunnelStage,
    pub sessions: u64,
    pub conversion_from_previous: f64,
}

impl TableRow for FunnelSummaryRow {
    fn header() -> &'static str {
        "stage,sessions,conversion_from_previous"
    }

    fn to_csv(&self) -> String {
        format!(
            "{},{},{:.4}",
            self.stage, self.sessions, self.conversion_from_previous
        )
    }
}

/// Popularity and revenue per (time bucket, product or category).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularityRevenueRow {
    /// First day of the time bucket
    pub bucket: NaiveDate,
    /// Product id or category id, depending on the grouping
    pub group_id: String,
    /// Purchase funnel events in the bucket
    pub popularity: u64,
    /// Sum of line totals in the bucket
    pub revenue: Decimal,
}

impl TableRow for PopularityRevenueRow {
    fn header() -> &'static str {
        "bucket,group_id,popularity,revenue"
    }

    fn to_csv(&self) -> String {
        format!(
            "{},{},{},{:.2}",
            self.bucket,
            csv_field(&self.group_id),
            self.popularity,
            self.revenue
        )
    }
}

/// Retention and revenue for one cohort at one elapsed period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortCurveRow {
    pub cohort: CohortKey,
    /// Periods since each member's own registration
    pub elapsed_period: i64,
    pub cohort_size: u64,
    /// Members with at least one transaction in this period
    pub active_users: u64,
    pub retention_fraction: f64,
    /// Cohort revenue in this period divided by cohort size
    pub mean_revenue: Decimal,
}

impl TableRow for CohortCurveRow {
    fn header() -> &'static str {
        "cohort,elapsed_period,cohort_size,active_users,retention_fraction,mean_revenue"
    }

    fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{:.4},{:.2}",
            self.cohort,
            self.elapsed_period,
            self.cohort_size,
            self.active_users,
            self.retention_fraction,
            self.mean_revenue
        )
    }
}

/// Lifetime value for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserClvRow {
    pub user_id: String,
    /// Observed spend through window end
    pub historical_clv: Decimal,
    /// Historical plus linearly projected spend
    pub projected_clv: Decimal,
}

impl TableRow for UserClvRow {
    fn header() -> &'static str {
        "user_id,historical_clv,projected_clv"
    }

    fn to_csv(&self) -> String {
        format!(
            "{},{:.2},{:.2}",
            csv_field(&self.user_id),
            self.historical_clv,
            self.projected_clv
        )
    }
}

/// Average lifetime value per cohort.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortClvRow {
    pub cohort: CohortKey,
    pub users: u64,
    pub avg_historical_clv: Decimal,
    pub avg_projected_clv: Decimal,
}

impl TableRow for CohortClvRow {
    fn header() -> &'static str {
        "cohort,users,avg_historical_clv,avg_projected_clv"
    }

    fn to_csv(&self) -> String {
        format!(
            "{},{},{:.2},{:.2}",
            self.cohort, self.users, self.avg_historical_clv, self.avg_projected_clv
        )
    }
}

/// Co-purchase association statistics for one unordered product pair.
///
/// Confidence is directional and reported both ways; lift is symmetric
/// and computed once per pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffinityPairRow {
    pub product_a: String,
    pub product_b: String,
    pub support: f64,
    pub confidence_a_to_b: f64,
    pub confidence_b_to_a: f64,
    pub lift: f64,
}

impl TableRow for AffinityPairRow {
    fn header() -> &'static str {
        "product_a,product_b,support,confidence_a_to_b,confidence_b_to_a,lift"
    }

    fn to_csv(&self) -> String {
        format!(
            "{},{},{:.4},{:.4},{:.4},{:.4}",
            csv_field(&self.product_a),
            csv_field(&self.product_b),
            self.support,
            self.confidence_a_to_b,
            self.confidence_b_to_a,
            self.lift
        )
    }
}
