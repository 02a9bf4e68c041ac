//! Co-purchase association mining.
//!
//! For every unordered pair of distinct products that appear together in
//! at least one transaction's line items:
//!
//! - support      = pair transactions / total transactions
//! - confidence   = pair transactions / transactions with the antecedent
//!   (directional, reported both ways)
//! - lift         = confidence(A→B) / purchase rate of B
//!   (symmetric, computed once per pair)
//!
//! Counts are simple sums, so partial counts over transaction partitions
//! merge associatively.

use crate::analytics::report::AffinityPairRow;
use crate::types::Transaction;
use std::collections::BTreeMap;

/// Mergeable co-occurrence counts over a set of transactions.
#[derive(Debug, Clone, Default)]
pub struct AffinityCounts {
    /// Transactions observed
    pub transactions: u64,
    item_counts: BTreeMap<String, u64>,
    pair_counts: BTreeMap<(String, String), u64>,
}

impl AffinityCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one transaction's distinct products and product pairs.
    pub fn observe(&mut self, tx: &Transaction) {
        self.transactions += 1;

        // Distinct and ordered, so each unordered pair is seen once with
        // a < b and quantities don't double-count.
        let products: Vec<&str> = tx.distinct_products().into_iter().collect();
        for product in &products {
            *self.item_counts.entry(product.to_string()).or_insert(0) += 1;
        }
        for (i, a) in products.iter().enumerate() {
            for b in &products[i + 1..] {
                *self
                    .pair_counts
                    .entry((a.to_string(), b.to_string()))
                    .or_insert(0) += 1;
            }
        }
    }

    /// Combine counts from two partitions. Associative and commutative.
    pub fn merge(mut self, other: AffinityCounts) -> AffinityCounts {
        self.transactions += other.transactions;
        for (item, count) in other.item_counts {
            *self.item_counts.entry(item).or_insert(0) += count;
        }
        for (pair, count) in other.pair_counts {
            *self.pair_counts.entry(pair).or_insert(0) += count;
        }
        self
    }

    /// Turn counts into the affinity table.
    ///
    /// Pairs with support below `min_support` are excluded; the default
    /// threshold of 0.0 keeps every co-occurring pair. Rows are sorted by
    /// lift descending, support descending, then pair id ascending.
    pub fn into_rows(self, min_support: f64) -> Vec<AffinityPairRow> {
        let AffinityCounts {
            transactions,
            item_counts,
            pair_counts,
        } = self;
        if transactions == 0 {
            return Vec::new();
        }
        let total = transactions as f64;

        let mut rows: Vec<AffinityPairRow> = pair_counts
            .into_iter()
            .filter_map(|((a, b), both)| {
                let count_a = item_counts[&a] as f64;
                let count_b = item_counts[&b] as f64;

                let support = both as f64 / total;
                if support < min_support {
                    return None;
                }

                let confidence_a_to_b = both as f64 / count_a;
                let confidence_b_to_a = both as f64 / count_b;
                // conf(A→B) / P(B); algebraically symmetric in A and B
                let lift = confidence_a_to_b / (count_b / total);

                Some(AffinityPairRow {
                    product_a: a,
                    product_b: b,
                    support,
                    confidence_a_to_b,
                    confidence_b_to_a,
                    lift,
                })
            })
            .collect();

        rows.sort_by(|x, y| {
            y.lift
                .total_cmp(&x.lift)
                .then_with(|| y.support.total_cmp(&x.support))
                .then_with(|| x.product_a.cmp(&y.product_a))
                .then_with(|| x.product_b.cmp(&y.product_b))
        });
        rows
    }
}

/// Compute the affinity table for a transaction set.
pub fn affinity_pairs(transactions: &[Transaction], min_support: f64) -> Vec<AffinityPairRow> {
    let mut counts = AffinityCounts::new();
    for tx in transactions {
        counts.observe(tx);
    }
    let rows = counts.into_rows(min_support);
    tracing::info!(
        transactions = transactions.len(),
        pairs = rows.len(),
        min_support,
        "Affinity analysis complete"
    );
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LineItem;
    use chrono::{DateTime, Utc};

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn tx(id: &str, products: &[&str]) -> Transaction {
        let items: Vec<LineItem> = products
            .iter()
            .map(|p| LineItem {
                product_id: p.to_string(),
                quantity: 1,
                unit_price: "1.00".parse().unwrap(),
            })
            .collect();
        let total = items.iter().map(LineItem::line_total).sum();
        Transaction {
            id: id.to_string(),
            session_id: None,
            user_id: "user_1".to_string(),
            timestamp: ts("2025-01-05T12:00:00Z"),
            items,
            total,
        }
    }

    /// A and B co-occur in 4 of 10 transactions, each appearing in 5.
    fn scenario() -> Vec<Transaction> {
        let mut txs = Vec::new();
        for i in 0..4 {
            txs.push(tx(&format!("txn_ab_{}", i), &["prod_a", "prod_b"]));
        }
        txs.push(tx("txn_a_0", &["prod_a"]));
        txs.push(tx("txn_b_0", &["prod_b"]));
        for i in 0..4 {
            txs.push(tx(&format!("txn_other_{}", i), &["prod_z"]));
        }
        txs
    }

    #[test]
    fn test_support_confidence_lift_scenario() {
        let rows = affinity_pairs(&scenario(), 0.0);
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.product_a, "prod_a");
        assert_eq!(row.product_b, "prod_b");
        assert!((row.support - 0.4).abs() < 1e-12);
        assert!((row.confidence_a_to_b - 0.8).abs() < 1e-12);
        assert!((row.confidence_b_to_a - 0.8).abs() < 1e-12);
        assert!((row.lift - 1.6).abs() < 1e-12);
    }

    #[test]
    fn test_lift_is_symmetric() {
        let mut counts = AffinityCounts::new();
        for tx in scenario() {
            counts.observe(&tx);
        }
        let total = counts.transactions as f64;
        let both = counts.pair_counts[&("prod_a".to_string(), "prod_b".to_string())] as f64;
        let count_a = counts.item_counts["prod_a"] as f64;
        let count_b = counts.item_counts["prod_b"] as f64;

        let lift_ab = (both / count_a) / (count_b / total);
        let lift_ba = (both / count_b) / (count_a / total);
        assert!((lift_ab - lift_ba).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_is_one_for_subset() {
        // Every transaction containing A also contains B
        let txs = vec![
            tx("txn_1", &["prod_a", "prod_b"]),
            tx("txn_2", &["prod_a", "prod_b"]),
            tx("txn_3", &["prod_b"]),
        ];
        let rows = affinity_pairs(&txs, 0.0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].confidence_a_to_b, 1.0);
        assert!(rows[0].confidence_b_to_a < 1.0);
    }

    #[test]
    fn test_min_support_threshold_excludes_pairs() {
        let rows = affinity_pairs(&scenario(), 0.5);
        assert!(rows.is_empty());

        // A pair exactly at the threshold is kept
        let rows = affinity_pairs(&scenario(), 0.4);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_quantities_do_not_double_count() {
        let mut order = tx("txn_1", &["prod_a", "prod_b"]);
        order.items.push(LineItem {
            product_id: "prod_a".to_string(),
            quantity: 3,
            unit_price: "1.00".parse().unwrap(),
        });
        order.total = order.computed_total();

        let rows = affinity_pairs(&[order], 0.0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].support, 1.0);
        assert_eq!(rows[0].confidence_a_to_b, 1.0);
    }

    #[test]
    fn test_merge_equals_single_pass() {
        let txs = scenario();
        let mut whole = AffinityCounts::new();
        for tx in &txs {
            whole.observe(tx);
        }

        let mut left = AffinityCounts::new();
        for tx in &txs[..5] {
            left.observe(tx);
        }
        let mut right = AffinityCounts::new();
        for tx in &txs[5..] {
            right.observe(tx);
        }

        let merged = left.merge(right);
        assert_eq!(merged.transactions, whole.transactions);
        assert_eq!(merged.item_counts, whole.item_counts);
        assert_eq!(merged.pair_counts, whole.pair_counts);
    }

    #[test]
    fn test_empty_input() {
        assert!(affinity_pairs(&[], 0.0).is_empty());
    }

    #[test]
    fn test_deterministic_sort_order() {
        // Two pairs with different lifts
        let txs = vec![
            tx("txn_1", &["prod_a", "prod_b"]),
            tx("txn_2", &["prod_a", "prod_b"]),
            tx("txn_3", &["prod_c", "prod_d"]),
            tx("txn_4", &["prod_c"]),
        ];
        let rows = affinity_pairs(&txs, 0.0);
        assert_eq!(rows.len(), 2);
        // Both pairs have lift 2.0; the support tiebreak (0.5 vs 0.25)
        // puts (a,b) first
        assert_eq!(rows[0].product_a, "prod_a");
        assert_eq!(rows[1].product_a, "prod_c");
    }
}
