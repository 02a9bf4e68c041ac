//! Analytics components for cartlens
//!
//! Four pure, read-only transformations over a validated dataset:
//!
//! - [`funnel`]: session reconstruction and funnel-stage classification
//! - [`aggregation`]: windowed popularity/revenue tables
//! - [`cohort`]: cohort retention curves and lifetime value
//! - [`affinity`]: co-purchase support/confidence/lift
//!
//! The [`pipeline`] module sequences them into one batch run and returns
//! an [`AnalyticsReport`] with every result table plus the per-record
//! error report. There is no shared mutable state anywhere: components
//! build immutable partial aggregates and combine them with associative
//! merges, so inputs can be partitioned and results merged.

pub mod affinity;
pub mod aggregation;
pub mod cohort;
pub mod funnel;
pub mod pipeline;
pub mod report;

pub use affinity::{affinity_pairs, AffinityCounts};
pub use aggregation::{aggregate, GroupBy, PartialAggregates, SalesAggregate};
pub use cohort::{cohort_curves, estimate_clv, ClvTables};
pub use funnel::{reconstruct, summarize, FunnelOutput};
pub use pipeline::{run, run_with_window, AnalyticsReport, ComponentRun, InputCounts};
pub use report::{
    render_csv, AffinityPairRow, CohortClvRow, CohortCurveRow, FunnelSummaryRow,
    PopularityRevenueRow, TableRow, UserClvRow,
};
