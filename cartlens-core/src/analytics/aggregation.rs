//! Windowed popularity and revenue aggregation.
//!
//! Groups purchase funnel events and transaction line items into
//! (time bucket, product-or-category) cells. Cells are immutable partial
//! aggregates combined with an associative, commutative merge, so
//! partitioned inputs can be aggregated independently and merged.
//!
//! Bucket indices are relative to the observation window start; the
//! reported `bucket` column is the first day of the bucket.

use crate::analytics::report::PopularityRevenueRow;
use crate::ingest::Dataset;
use crate::types::{AnalysisWindow, FunnelEvent, FunnelStage, TimeGranularity};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Which id the aggregation groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Product,
    Category,
}

impl GroupBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::Product => "product",
            GroupBy::Category => "category",
        }
    }
}

/// One aggregation cell: purchase count and revenue.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SalesAggregate {
    pub popularity: u64,
    pub revenue: Decimal,
}

impl SalesAggregate {
    /// Combine two partials. Associative and commutative, so partition
    /// merge order never changes the result.
    pub fn merge(self, other: SalesAggregate) -> SalesAggregate {
        SalesAggregate {
            popularity: self.popularity + other.popularity,
            revenue: self.revenue + other.revenue,
        }
    }
}

/// Partial aggregates over a slice of the input, keyed by
/// (bucket index, group id).
#[derive(Debug, Clone, Default)]
pub struct PartialAggregates {
    cells: BTreeMap<(i64, String), SalesAggregate>,
}

impl PartialAggregates {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&mut self, bucket: i64, group: &str) -> &mut SalesAggregate {
        self.cells
            .entry((bucket, group.to_string()))
            .or_default()
    }

    pub fn add_purchase(&mut self, bucket: i64, group: &str) {
        self.cell(bucket, group).popularity += 1;
    }

    pub fn add_revenue(&mut self, bucket: i64, group: &str, amount: Decimal) {
        self.cell(bucket, group).revenue += amount;
    }

    /// Union two partials, summing overlapping cells.
    pub fn merge(mut self, other: PartialAggregates) -> PartialAggregates {
        for (key, aggregate) in other.cells {
            let merged = self
                .cells
                .remove(&key)
                .unwrap_or_default()
                .merge(aggregate);
            self.cells.insert(key, merged);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Bucket index for a timestamp, relative to the window start.
fn bucket_index(ts: DateTime<Utc>, window_start: DateTime<Utc>, bucket_len: Duration) -> i64 {
    (ts - window_start)
        .num_seconds()
        .div_euclid(bucket_len.num_seconds())
}

/// First day of a bucket.
fn bucket_start(
    bucket: i64,
    window_start: DateTime<Utc>,
    bucket_len: Duration,
) -> chrono::NaiveDate {
    (window_start + Duration::seconds(bucket_len.num_seconds() * bucket)).date_naive()
}

/// Aggregate purchases and revenue over the dataset.
///
/// Popularity comes from purchase funnel events inside the window;
/// revenue comes from validated transaction line items. Rows are sorted
/// by revenue descending, then group id, then bucket, for a
/// deterministic table. Empty cells are omitted unless `dense_buckets`
/// asks for a full calendar per group.
pub fn aggregate(
    dataset: &Dataset,
    funnel_events: &[FunnelEvent],
    granularity: TimeGranularity,
    group_by: GroupBy,
    dense_buckets: bool,
) -> Vec<PopularityRevenueRow> {
    let window = dataset.window;
    let bucket_len = granularity.bucket_len();

    let group_of = |product_id: &str| -> Option<String> {
        match group_by {
            GroupBy::Product => Some(product_id.to_string()),
            GroupBy::Category => dataset
                .products
                .get(product_id)
                .map(|p| p.category_id.clone()),
        }
    };

    let mut partials = PartialAggregates::new();

    for event in funnel_events {
        if event.stage != FunnelStage::Purchase || !window.contains(event.timestamp) {
            continue;
        }
        if let Some(group) = group_of(&event.product_id) {
            let bucket = bucket_index(event.timestamp, window.start, bucket_len);
            partials.add_purchase(bucket, &group);
        }
    }

    for tx in &dataset.transactions {
        let bucket = bucket_index(tx.timestamp, window.start, bucket_len);
        for item in &tx.items {
            if let Some(group) = group_of(&item.product_id) {
                partials.add_revenue(bucket, &group, item.line_total());
            }
        }
    }

    rows_from_partials(partials, window, bucket_len, dense_buckets)
}

fn rows_from_partials(
    mut partials: PartialAggregates,
    window: AnalysisWindow,
    bucket_len: Duration,
    dense_buckets: bool,
) -> Vec<PopularityRevenueRow> {
    if dense_buckets && !partials.is_empty() {
        let window_secs = window.duration().num_seconds();
        let len_secs = bucket_len.num_seconds();
        let n_buckets = (window_secs + len_secs - 1) / len_secs;
        let groups: Vec<String> = partials
            .cells
            .keys()
            .map(|(_, group)| group.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        for group in groups {
            for bucket in 0..n_buckets {
                partials
                    .cells
                    .entry((bucket, group.clone()))
                    .or_default();
            }
        }
    }

    let mut rows: Vec<PopularityRevenueRow> = partials
        .cells
        .into_iter()
        .map(|((bucket, group_id), aggregate)| PopularityRevenueRow {
            bucket: bucket_start(bucket, window.start, bucket_len),
            group_id,
            popularity: aggregate.popularity,
            revenue: aggregate.revenue,
        })
        .collect();

    rows.sort_by(|a, b| {
        b.revenue
            .cmp(&a.revenue)
            .then_with(|| a.group_id.cmp(&b.group_id))
            .then_with(|| a.bucket.cmp(&b.bucket))
    });
    rows
}
