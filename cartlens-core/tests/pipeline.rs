//! Integration tests for the full analytics pipeline
//!
//! These tests build a small but realistic dataset (a handful of users,
//! sessions and transactions over a 90-day window) and verify the
//! pipeline's conservation laws, ordering guarantees, and idempotence
//! end to end.

use cartlens_core::analytics::{self, render_csv, GroupBy};
use cartlens_core::types::*;
use cartlens_core::{Config, RawDataset};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn user(id: &str, registered: &str) -> User {
    User {
        id: id.to_string(),
        registration_date: ts(registered),
        geo_data: None,
        last_active: None,
    }
}

fn product(id: &str, category: &str, price: &str) -> Product {
    Product {
        id: id.to_string(),
        name: Some(format!("Product {}", id)),
        category_id: category.to_string(),
        price: price.parse().unwrap(),
        inventory: 100,
        is_active: true,
    }
}

fn event(when: &str, event_type: EventType, product: &str) -> Event {
    Event {
        timestamp: ts(when),
        event_type,
        product_id: product.to_string(),
    }
}

fn transaction(
    id: &str,
    session: Option<&str>,
    user: &str,
    when: &str,
    items: Vec<(&str, i64, &str)>,
) -> Transaction {
    let items: Vec<LineItem> = items
        .into_iter()
        .map(|(product, quantity, unit_price)| LineItem {
            product_id: product.to_string(),
            quantity,
            unit_price: unit_price.parse().unwrap(),
        })
        .collect();
    let total = items.iter().map(LineItem::line_total).sum();
    Transaction {
        id: id.to_string(),
        session_id: session.map(|s| s.to_string()),
        user_id: user.to_string(),
        timestamp: ts(when),
        items,
        total,
    }
}

/// Dataset with browsing-only, cart-abandon, and purchasing sessions,
/// plus an orphan transaction and one empty session.
fn fixture() -> RawDataset {
    RawDataset {
        users: vec![
            user("user_1", "2025-01-01T00:00:00Z"),
            user("user_2", "2025-01-11T00:00:00Z"),
            user("user_3", "2025-02-20T00:00:00Z"),
        ],
        categories: vec![
            Category {
                id: "cat_1".to_string(),
                name: "Outdoors".to_string(),
                parent_id: None,
            },
            Category {
                id: "cat_2".to_string(),
                name: "Camping".to_string(),
                parent_id: Some("cat_1".to_string()),
            },
        ],
        products: vec![
            product("prod_1", "cat_1", "10.00"),
            product("prod_2", "cat_2", "3.00"),
            product("prod_3", "cat_2", "7.50"),
        ],
        sessions: vec![
            // user_1 week 0: full funnel ending in a linked purchase
            Session {
                id: "sess_01".to_string(),
                user_id: "user_1".to_string(),
                started_at: ts("2025-01-03T09:00:00Z"),
                events: vec![
                    event("2025-01-03T09:00:00Z", EventType::View, "prod_1"),
                    event("2025-01-03T09:02:00Z", EventType::AddToCart, "prod_1"),
                    event("2025-01-03T09:05:00Z", EventType::CheckoutStart, "prod_1"),
                    event("2025-01-03T09:06:00Z", EventType::Purchase, "prod_1"),
                ],
            },
            // user_1 week 2: views then an orphan purchase shortly after
            Session {
                id: "sess_02".to_string(),
                user_id: "user_1".to_string(),
                started_at: ts("2025-01-16T18:00:00Z"),
                events: vec![
                    event("2025-01-16T18:00:00Z", EventType::View, "prod_1"),
                    event("2025-01-16T18:03:00Z", EventType::AddToCart, "prod_1"),
                ],
            },
            // user_2: cart abandon
            Session {
                id: "sess_03".to_string(),
                user_id: "user_2".to_string(),
                started_at: ts("2025-01-20T12:00:00Z"),
                events: vec![
                    event("2025-01-20T12:00:00Z", EventType::View, "prod_2"),
                    event("2025-01-20T12:01:00Z", EventType::AddToCart, "prod_2"),
                    event("2025-01-20T12:04:00Z", EventType::RemoveFromCart, "prod_2"),
                ],
            },
            // user_3: browsing only
            Session {
                id: "sess_04".to_string(),
                user_id: "user_3".to_string(),
                started_at: ts("2025-02-21T08:00:00Z"),
                events: vec![event("2025-02-21T08:00:00Z", EventType::View, "prod_3")],
            },
            // dropped with a skip count, not an error
            Session {
                id: "sess_05".to_string(),
                user_id: "user_2".to_string(),
                started_at: ts("2025-02-01T10:00:00Z"),
                events: vec![],
            },
        ],
        transactions: vec![
            transaction(
                "txn_01",
                Some("sess_01"),
                "user_1",
                "2025-01-03T09:06:30Z",
                vec![("prod_1", 1, "10.00")],
            ),
            // Orphan order 10 minutes after sess_02's last event
            transaction(
                "txn_02",
                None,
                "user_1",
                "2025-01-16T18:13:00Z",
                vec![("prod_1", 1, "10.00")],
            ),
            // user_2 co-purchase away from any session window
            transaction(
                "txn_03",
                None,
                "user_2",
                "2025-02-05T15:00:00Z",
                vec![("prod_2", 2, "3.00"), ("prod_3", 1, "7.50")],
            ),
        ],
    }
}

fn config() -> Config {
    let mut config = Config::default();
    config.window.start = Some(ts("2025-01-01T00:00:00Z"));
    config
}

#[test]
fn test_run_succeeds_with_no_errors() {
    let report = analytics::run(fixture(), &config()).unwrap();
    assert!(report.errors.is_empty());
    assert_eq!(report.skipped_empty_sessions, 1);
    assert_eq!(report.input_counts.users, 3);
    assert_eq!(report.input_counts.sessions, 5);
    assert_eq!(report.input_counts.transactions, 3);
}

#[test]
fn test_funnel_stages_are_non_decreasing_per_session() {
    let config = config();
    let window = AnalysisWindow::from_start(ts("2025-01-01T00:00:00Z"), 90);
    let dataset = cartlens_core::Dataset::validate(fixture(), window);
    let output = analytics::reconstruct(&dataset, config.analytics.association_window());

    let mut by_session: BTreeMap<&str, Vec<FunnelStage>> = BTreeMap::new();
    for event in &output.events {
        by_session
            .entry(event.session_id.as_str())
            .or_default()
            .push(event.stage);
    }
    for (session, stages) in by_session {
        for pair in stages.windows(2) {
            assert!(pair[0] <= pair[1], "stage regressed in {}", session);
        }
    }
}

#[test]
fn test_funnel_summary_shape() {
    let report = analytics::run(fixture(), &config()).unwrap();
    let summary = &report.funnel_summary;

    assert_eq!(summary.len(), 4);
    // 4 non-empty sessions, all reaching view
    assert_eq!(summary[0].sessions, 4);
    // sess_01, sess_02, sess_03 reach cart
    assert_eq!(summary[1].sessions, 3);
    // sess_01 checks out; sess_02's orphan purchase implies purchase
    assert_eq!(summary[3].stage, FunnelStage::Purchase);
    assert_eq!(summary[3].sessions, 2);

    // Counts never increase down the funnel
    for pair in summary.windows(2) {
        assert!(pair[0].sessions >= pair[1].sessions);
    }
}

#[test]
fn test_popularity_revenue_conservation() {
    let config = config();
    let window = AnalysisWindow::from_start(ts("2025-01-01T00:00:00Z"), 90);
    let dataset = cartlens_core::Dataset::validate(fixture(), window);
    let output = analytics::reconstruct(&dataset, config.analytics.association_window());
    let rows = analytics::aggregate(
        &dataset,
        &output.events,
        TimeGranularity::Weekly,
        GroupBy::Product,
        false,
    );

    // Popularity over the full window equals the purchase funnel events
    // per product
    let mut purchase_events: BTreeMap<&str, u64> = BTreeMap::new();
    for event in &output.events {
        if event.stage == FunnelStage::Purchase {
            *purchase_events.entry(event.product_id.as_str()).or_insert(0) += 1;
        }
    }
    let mut popularity_totals: BTreeMap<&str, u64> = BTreeMap::new();
    for row in &rows {
        *popularity_totals.entry(row.group_id.as_str()).or_insert(0) += row.popularity;
    }
    for (product, count) in &purchase_events {
        assert_eq!(popularity_totals.get(product), Some(count));
    }

    // Revenue over the full window equals the line-item sums per product
    let mut revenue_expected: BTreeMap<&str, Decimal> = BTreeMap::new();
    for tx in &dataset.transactions {
        for item in &tx.items {
            *revenue_expected
                .entry(item.product_id.as_str())
                .or_insert(Decimal::ZERO) += item.line_total();
        }
    }
    let mut revenue_totals: BTreeMap<&str, Decimal> = BTreeMap::new();
    for row in &rows {
        *revenue_totals
            .entry(row.group_id.as_str())
            .or_insert(Decimal::ZERO) += row.revenue;
    }
    assert_eq!(revenue_totals.len(), revenue_expected.len());
    for (product, expected) in &revenue_expected {
        assert_eq!(revenue_totals.get(product), Some(expected));
    }
}

#[test]
fn test_rows_sorted_by_revenue_descending() {
    let report = analytics::run(fixture(), &config()).unwrap();
    for pair in report.popularity_revenue.windows(2) {
        assert!(pair[0].revenue >= pair[1].revenue);
    }
    for pair in report.revenue_by_category.windows(2) {
        assert!(pair[0].revenue >= pair[1].revenue);
    }
}

#[test]
fn test_cohort_scenario() {
    // user_1 (week 0) buys in week 0 and week 2, nothing in week 1
    let report = analytics::run(fixture(), &config()).unwrap();
    let week0: Vec<_> = report
        .cohort_curves
        .iter()
        .filter(|r| r.cohort == CohortKey(0))
        .collect();

    assert_eq!(week0[0].elapsed_period, 0);
    assert_eq!(week0[0].retention_fraction, 1.0);
    assert_eq!(week0[1].retention_fraction, 0.0);
    assert_eq!(week0[2].retention_fraction, 1.0);

    for row in &report.cohort_curves {
        assert!((0.0..=1.0).contains(&row.retention_fraction));
    }
}

#[test]
fn test_clv_is_at_least_observed_spend() {
    let report = analytics::run(fixture(), &config()).unwrap();

    let mut observed: BTreeMap<&str, Decimal> = BTreeMap::new();
    for tx in fixture().transactions {
        *observed
            .entry(match tx.user_id.as_str() {
                "user_1" => "user_1",
                "user_2" => "user_2",
                other => panic!("unexpected user {}", other),
            })
            .or_insert(Decimal::ZERO) += tx.total;
    }

    assert_eq!(report.user_clv.len(), 3);
    for row in &report.user_clv {
        let spend = observed
            .get(row.user_id.as_str())
            .copied()
            .unwrap_or(Decimal::ZERO);
        assert_eq!(row.historical_clv, spend);
        assert!(row.projected_clv >= row.historical_clv);
    }
}

#[test]
fn test_affinity_lift_symmetry_and_ordering() {
    let report = analytics::run(fixture(), &config()).unwrap();

    // prod_2 and prod_3 co-occur once
    assert_eq!(report.affinity_pairs.len(), 1);
    let pair = &report.affinity_pairs[0];
    assert_eq!(pair.product_a, "prod_2");
    assert_eq!(pair.product_b, "prod_3");

    // lift(A,B) == lift(B,A) by construction; recompute the other
    // direction by hand
    let total = 3.0;
    let lift_ba = pair.confidence_b_to_a / (1.0 / total);
    assert!((pair.lift - lift_ba).abs() < 1e-12);
}

#[test]
fn test_rerun_is_byte_identical() {
    let first = analytics::run(fixture(), &config()).unwrap();
    let second = analytics::run(fixture(), &config()).unwrap();

    assert_eq!(
        render_csv(&first.funnel_summary),
        render_csv(&second.funnel_summary)
    );
    assert_eq!(
        render_csv(&first.popularity_revenue),
        render_csv(&second.popularity_revenue)
    );
    assert_eq!(
        render_csv(&first.revenue_by_category),
        render_csv(&second.revenue_by_category)
    );
    assert_eq!(
        render_csv(&first.cohort_curves),
        render_csv(&second.cohort_curves)
    );
    assert_eq!(render_csv(&first.user_clv), render_csv(&second.user_clv));
    assert_eq!(render_csv(&first.cohort_clv), render_csv(&second.cohort_clv));
    assert_eq!(
        render_csv(&first.affinity_pairs),
        render_csv(&second.affinity_pairs)
    );
}

#[test]
fn test_malformed_records_reported_not_fatal() {
    let mut input = fixture();
    // Stored total disagrees with the line items: validation error
    input.transactions.push(Transaction {
        id: "txn_bad_total".to_string(),
        session_id: None,
        user_id: "user_1".to_string(),
        timestamp: ts("2025-01-10T10:00:00Z"),
        items: vec![
            LineItem {
                product_id: "prod_1".to_string(),
                quantity: 2,
                unit_price: "5.00".parse().unwrap(),
            },
            LineItem {
                product_id: "prod_2".to_string(),
                quantity: 1,
                unit_price: "3.00".parse().unwrap(),
            },
        ],
        total: "10.00".parse().unwrap(),
    });

    let mut config = config();
    config.analytics.error_abort_threshold = 0.5;
    let report = analytics::run(input, &config).unwrap();

    assert_eq!(report.errors.len(), 1);
    assert!(report.errors.errors[0].is_validation());
    assert_eq!(report.errors.errors[0].record_id(), "txn_bad_total");
    // The bad record is excluded: totals match the clean fixture
    assert_eq!(report.input_counts.transactions, 3);
}

#[test]
fn test_dataset_loaded_from_disk_matches_in_memory() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = tmp.path();
    let input = fixture();

    std::fs::write(
        dir.join("users.json"),
        serde_json::to_string(&input.users).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.join("categories.json"),
        serde_json::to_string(&input.categories).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.join("products.json"),
        serde_json::to_string(&input.products).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.join("transactions.json"),
        serde_json::to_string(&input.transactions).unwrap(),
    )
    .unwrap();
    // Split sessions across two chunks, generator style
    std::fs::write(
        dir.join("sessions_0.json"),
        serde_json::to_string(&input.sessions[..2]).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.join("sessions_1.json"),
        serde_json::to_string(&input.sessions[2..]).unwrap(),
    )
    .unwrap();

    let loaded = RawDataset::load_dir(dir).unwrap();
    let from_disk = analytics::run(loaded, &config()).unwrap();
    let in_memory = analytics::run(input, &config()).unwrap();

    assert_eq!(
        render_csv(&from_disk.popularity_revenue),
        render_csv(&in_memory.popularity_revenue)
    );
    assert_eq!(
        render_csv(&from_disk.user_clv),
        render_csv(&in_memory.user_clv)
    );
    assert_eq!(
        render_csv(&from_disk.affinity_pairs),
        render_csv(&in_memory.affinity_pairs)
    );
}
