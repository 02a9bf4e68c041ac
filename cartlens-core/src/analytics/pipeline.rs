//! Batch pipeline over a validated dataset.
//!
//! ```text
//! ┌──────────────┐   ┌────────────────┐   ┌───────────────────────────┐
//! │  RawDataset  │──►│   validation   │──►│  components, in order:    │
//! │ (loader)     │   │ (ErrorReport,  │   │  funnel → aggregation →   │
//! │              │   │  abort check)  │   │  cohort/CLV → affinity    │
//! └──────────────┘   └────────────────┘   └───────────────────────────┘
//!                                                        │
//!                                                        ▼
//!                                              AnalyticsReport
//!                                         (flat tables + ErrorReport)
//! ```
//!
//! Each component is a pure function over immutable inputs; the pipeline
//! only sequences them, times them, and records what they produced. The
//! whole run is deterministic: unchanged input yields byte-identical
//! tables.

use crate::analytics::affinity;
use crate::analytics::aggregation::{self, GroupBy};
use crate::analytics::cohort;
use crate::analytics::funnel;
use crate::analytics::report::{
    AffinityPairRow, CohortClvRow, CohortCurveRow, FunnelSummaryRow, PopularityRevenueRow,
    UserClvRow,
};
use crate::config::Config;
use crate::error::{Error, ErrorReport, Result};
use crate::ingest::{Dataset, RawDataset};
use crate::types::AnalysisWindow;
use serde::Serialize;
use std::time::Instant;

/// Timing and output size for one pipeline component.
///
/// Surfaced in the report for observability; also logged.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentRun {
    pub component: &'static str,
    pub duration_ms: i64,
    pub rows_produced: usize,
}

/// Validated input sizes the run was computed over.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct InputCounts {
    pub users: usize,
    pub categories: usize,
    pub products: usize,
    pub sessions: usize,
    pub transactions: usize,
}

/// Everything one batch run produces.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub window: AnalysisWindow,
    pub input_counts: InputCounts,

    // Result tables
    pub funnel_summary: Vec<FunnelSummaryRow>,
    pub popularity_revenue: Vec<PopularityRevenueRow>,
    pub revenue_by_category: Vec<PopularityRevenueRow>,
    pub cohort_curves: Vec<CohortCurveRow>,
    pub user_clv: Vec<UserClvRow>,
    pub cohort_clv: Vec<CohortClvRow>,
    pub affinity_pairs: Vec<AffinityPairRow>,

    /// Sessions dropped for having no events (reported, not fatal)
    pub skipped_empty_sessions: usize,
    /// Per-record errors collected during validation
    pub errors: ErrorReport,
    /// Per-component timing
    pub runs: Vec<ComponentRun>,
}

/// Run the full pipeline on a raw dataset.
///
/// The observation window comes from configuration when set, otherwise it
/// is inferred from the data. Fails only on configuration errors or when
/// the per-record error rate exceeds the abort threshold; all other
/// problems surface in the report's error list.
pub fn run(raw: RawDataset, config: &Config) -> Result<AnalyticsReport> {
    config.validate()?;

    let window = match config.window.start {
        Some(start) => AnalysisWindow::from_start(start, config.window.days),
        None => raw.infer_window(config.window.days).ok_or_else(|| {
            Error::Config("cannot infer observation window from an empty dataset".to_string())
        })?,
    };

    run_with_window(raw, config, window)
}

/// Run the full pipeline with an explicit observation window.
pub fn run_with_window(
    raw: RawDataset,
    config: &Config,
    window: AnalysisWindow,
) -> Result<AnalyticsReport> {
    config.validate()?;
    let analytics = &config.analytics;

    tracing::info!(
        window_start = %window.start,
        window_end = %window.end,
        records = raw.record_count(),
        "Starting analytics run"
    );

    let dataset = Dataset::validate(raw, window);
    dataset
        .errors
        .check_abort(analytics.error_abort_threshold)?;

    let mut runs = Vec::new();
    let mut timed = |component: &'static str, rows: usize, started: Instant| {
        let duration_ms = started.elapsed().as_millis() as i64;
        tracing::info!(component, rows, duration_ms, "Component complete");
        runs.push(ComponentRun {
            component,
            duration_ms,
            rows_produced: rows,
        });
    };

    let started = Instant::now();
    let funnel_output = funnel::reconstruct(&dataset, analytics.association_window());
    let funnel_summary = funnel::summarize(&funnel_output);
    timed("funnel", funnel_output.events.len(), started);

    let started = Instant::now();
    let popularity_revenue = aggregation::aggregate(
        &dataset,
        &funnel_output.events,
        analytics.granularity,
        GroupBy::Product,
        analytics.dense_buckets,
    );
    let revenue_by_category = aggregation::aggregate(
        &dataset,
        &funnel_output.events,
        analytics.granularity,
        GroupBy::Category,
        analytics.dense_buckets,
    );
    timed(
        "aggregation",
        popularity_revenue.len() + revenue_by_category.len(),
        started,
    );

    let started = Instant::now();
    let cohort_curves = cohort::cohort_curves(&dataset, analytics.bucket_width());
    let clv = cohort::estimate_clv(
        &dataset,
        analytics.bucket_width(),
        analytics.horizon_periods,
    );
    timed(
        "cohort_clv",
        cohort_curves.len() + clv.users.len() + clv.cohorts.len(),
        started,
    );

    let started = Instant::now();
    let affinity_pairs =
        affinity::affinity_pairs(&dataset.transactions, analytics.min_support_threshold);
    timed("affinity", affinity_pairs.len(), started);

    let input_counts = InputCounts {
        users: dataset.users.len(),
        categories: dataset.categories.len(),
        products: dataset.products.len(),
        sessions: dataset.sessions.len(),
        transactions: dataset.transactions.len(),
    };

    tracing::info!(
        errors = dataset.errors.len(),
        error_rate = dataset.errors.error_rate(),
        "Analytics run complete"
    );

    Ok(AnalyticsReport {
        window,
        input_counts,
        funnel_summary,
        popularity_revenue,
        revenue_by_category,
        cohort_curves,
        user_clv: clv.users,
        cohort_clv: clv.cohorts,
        affinity_pairs,
        skipped_empty_sessions: funnel_output.skipped_empty_sessions,
        errors: dataset.errors,
        runs,
    })
}
