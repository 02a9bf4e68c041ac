//! Cohort retention curves and customer lifetime value.
//!
//! Users are bucketed by acquisition period; curves are computed on the
//! elapsed-period axis, relative to each user's own registration rather
//! than the calendar, so cohorts of different start dates line up on a
//! common "age since acquisition" axis.
//!
//! All monetary sums stay in `Decimal`; averages divide in `Decimal` and
//! round to 2 decimal places at the reporting boundary.

use crate::analytics::report::{CohortClvRow, CohortCurveRow, UserClvRow};
use crate::ingest::Dataset;
use crate::types::{CohortKey, Transaction, User};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

/// Periods since a user's own registration for one timestamp.
fn elapsed_period(ts: DateTime<Utc>, registration: DateTime<Utc>, width: Duration) -> i64 {
    (ts - registration)
        .num_seconds()
        .div_euclid(width.num_seconds())
}

/// Group users by cohort key, in key order.
fn cohorts_of(dataset: &Dataset, width: Duration) -> BTreeMap<CohortKey, Vec<&User>> {
    let mut cohorts: BTreeMap<CohortKey, Vec<&User>> = BTreeMap::new();
    for user in dataset.users.values() {
        let key = CohortKey::from_registration(user.registration_date, dataset.window.start, width);
        cohorts.entry(key).or_default().push(user);
    }
    cohorts
}

/// Transactions grouped per user id.
fn transactions_by_user(dataset: &Dataset) -> BTreeMap<&str, Vec<&Transaction>> {
    let mut by_user: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
    for tx in &dataset.transactions {
        by_user.entry(tx.user_id.as_str()).or_default().push(tx);
    }
    by_user
}

/// Retention and mean-revenue curve per (cohort, elapsed period).
///
/// Each cohort's curve is dense from period 0 through the last period
/// observable inside the window, so flat stretches of zero retention
/// show up as explicit rows.
pub fn cohort_curves(dataset: &Dataset, bucket_width: Duration) -> Vec<CohortCurveRow> {
    let cohorts = cohorts_of(dataset, bucket_width);
    let by_user = transactions_by_user(dataset);

    let mut rows = Vec::new();
    for (cohort, members) in &cohorts {
        let size = members.len() as u64;

        // Last period any member can still be observed in.
        let max_elapsed = members
            .iter()
            .map(|user| {
                let span = (dataset.window.end - user.registration_date).num_seconds() - 1;
                span.div_euclid(bucket_width.num_seconds())
            })
            .max()
            .unwrap_or(-1);
        if max_elapsed < 0 {
            continue;
        }

        // Per-period activity across the cohort
        let mut active: BTreeMap<i64, BTreeSet<&str>> = BTreeMap::new();
        let mut revenue: BTreeMap<i64, Decimal> = BTreeMap::new();
        for user in members {
            for tx in by_user.get(user.id.as_str()).into_iter().flatten() {
                let period = elapsed_period(tx.timestamp, user.registration_date, bucket_width);
                active.entry(period).or_default().insert(user.id.as_str());
                *revenue.entry(period).or_insert(Decimal::ZERO) += tx.total;
            }
        }

        for period in 0..=max_elapsed {
            let active_users = active.get(&period).map(|s| s.len() as u64).unwrap_or(0);
            let period_revenue = revenue.get(&period).copied().unwrap_or(Decimal::ZERO);
            rows.push(CohortCurveRow {
                cohort: *cohort,
                elapsed_period: period,
                cohort_size: size,
                active_users,
                retention_fraction: active_users as f64 / size as f64,
                mean_revenue: (period_revenue / Decimal::from(size)).round_dp(2),
            });
        }
    }

    tracing::info!(
        cohorts = cohorts.len(),
        rows = rows.len(),
        "Cohort curves computed"
    );
    rows
}

/// Per-user and per-cohort-average lifetime value.
#[derive(Debug, Clone, Default)]
pub struct ClvTables {
    pub users: Vec<UserClvRow>,
    pub cohorts: Vec<CohortClvRow>,
}

/// Estimate lifetime value for every user.
///
/// Historical CLV is the sum of all observed transaction totals.
/// Projected CLV linearly extends the average spend per *active* period
/// across `horizon_periods` more periods; users with no transactions
/// project to zero. Projection never subtracts value, so projected ≥
/// historical always holds.
pub fn estimate_clv(
    dataset: &Dataset,
    bucket_width: Duration,
    horizon_periods: u32,
) -> ClvTables {
    let cohorts = cohorts_of(dataset, bucket_width);
    let by_user = transactions_by_user(dataset);

    let mut user_rows = Vec::with_capacity(dataset.users.len());
    let mut cohort_sums: BTreeMap<CohortKey, (u64, Decimal, Decimal)> = BTreeMap::new();

    for (cohort, members) in &cohorts {
        for user in members {
            let mut historical = Decimal::ZERO;
            let mut active_periods: BTreeSet<i64> = BTreeSet::new();
            for tx in by_user.get(user.id.as_str()).into_iter().flatten() {
                historical += tx.total;
                active_periods.insert(elapsed_period(
                    tx.timestamp,
                    user.registration_date,
                    bucket_width,
                ));
            }

            let projected = if active_periods.is_empty() {
                Decimal::ZERO
            } else {
                let per_period = historical / Decimal::from(active_periods.len() as u64);
                historical + per_period * Decimal::from(horizon_periods)
            };

            let historical = historical.round_dp(2);
            let projected = projected.round_dp(2);

            let entry = cohort_sums
                .entry(*cohort)
                .or_insert((0, Decimal::ZERO, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += historical;
            entry.2 += projected;

            user_rows.push(UserClvRow {
                user_id: user.id.clone(),
                historical_clv: historical,
                projected_clv: projected,
            });
        }
    }

    user_rows.sort_by(|a, b| a.user_id.cmp(&b.user_id));

    let cohort_rows = cohort_sums
        .into_iter()
        .map(|(cohort, (users, historical, projected))| CohortClvRow {
            cohort,
            users,
            avg_historical_clv: (historical / Decimal::from(users)).round_dp(2),
            avg_projected_clv: (projected / Decimal::from(users)).round_dp(2),
        })
        .collect();

    ClvTables {
        users: user_rows,
        cohorts: cohort_rows,
    }
}
