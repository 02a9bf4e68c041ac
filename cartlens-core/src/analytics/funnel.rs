//! Session reconstruction and funnel classification.
//!
//! Turns each session's raw event sequence into ordered
//! [`FunnelEvent`]s with a monotonically non-decreasing stage, and
//! summarizes how far sessions got through the funnel.
//!
//! ## Purchase corroboration
//!
//! A session only reaches the `purchase` stage when a transaction backs
//! it up: either the transaction names the session directly, or it is an
//! orphan order by the same user whose timestamp falls inside
//! `[session start, last event + association window]`. In both cases the
//! transaction's line items must intersect the products the session
//! interacted with. Uncorroborated `purchase` events stay at the stage
//! the session had already reached.
//!
//! ## Stage monotonicity
//!
//! Repeated events of the same type do not advance the stage, and an
//! event that would regress it (a view after checkout) is recorded at the
//! stage already reached, never below it.

use crate::analytics::report::FunnelSummaryRow;
use crate::ingest::Dataset;
use crate::types::{FunnelEvent, FunnelStage, Session, Transaction};
use chrono::Duration;
use std::collections::BTreeMap;

/// Everything the reconstructor derives from one dataset.
#[derive(Debug, Clone, Default)]
pub struct FunnelOutput {
    /// All funnel events, grouped per session in session-id order
    pub events: Vec<FunnelEvent>,
    /// Maximal stage reached per session
    pub session_stages: BTreeMap<String, FunnelStage>,
    /// Sessions dropped because they contained no events
    pub skipped_empty_sessions: usize,
}

impl FunnelOutput {
    /// Sessions whose maximal stage reached at least `stage`.
    pub fn sessions_reaching(&self, stage: FunnelStage) -> u64 {
        self.session_stages.values().filter(|s| **s >= stage).count() as u64
    }
}

/// Reconstruct funnels for every session in the dataset.
pub fn reconstruct(dataset: &Dataset, association_window: Duration) -> FunnelOutput {
    // Transactions indexed once: direct session links, and orphan orders
    // per user for window-based association.
    let mut by_session: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
    let mut orphans_by_user: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
    for tx in &dataset.transactions {
        match &tx.session_id {
            Some(session_id) => by_session.entry(session_id).or_default().push(tx),
            None => orphans_by_user.entry(&tx.user_id).or_default().push(tx),
        }
    }

    let mut output = FunnelOutput::default();

    for session in &dataset.sessions {
        if session.events.is_empty() {
            output.skipped_empty_sessions += 1;
            tracing::debug!(session = %session.id, "Skipping session with no events");
            continue;
        }

        let associated = associated_transactions(
            session,
            &by_session,
            &orphans_by_user,
            association_window,
        );
        let purchased = !associated.is_empty();

        let mut stage = FunnelStage::View;
        for event in &session.events {
            // Raw purchase events never advance the stage on their own;
            // the purchase stage enters below, through the corroborating
            // transaction's line items.
            let reached = FunnelStage::from_event_type(event.event_type).unwrap_or(stage);
            stage = stage.max(reached);
            output.events.push(FunnelEvent {
                user_id: session.user_id.clone(),
                session_id: session.id.clone(),
                stage,
                timestamp: event.timestamp,
                product_id: event.product_id.clone(),
            });
        }

        // One purchase funnel event per associated line item, stamped at
        // the transaction time. Popularity counts these.
        for tx in &associated {
            for item in &tx.items {
                output.events.push(FunnelEvent {
                    user_id: session.user_id.clone(),
                    session_id: session.id.clone(),
                    stage: FunnelStage::Purchase,
                    timestamp: tx.timestamp,
                    product_id: item.product_id.clone(),
                });
            }
        }

        let max_stage = if purchased { FunnelStage::Purchase } else { stage };
        output.session_stages.insert(session.id.clone(), max_stage);
    }

    tracing::info!(
        sessions = output.session_stages.len(),
        funnel_events = output.events.len(),
        skipped_empty = output.skipped_empty_sessions,
        "Funnel reconstruction complete"
    );

    output
}

fn associated_transactions<'a>(
    session: &Session,
    by_session: &BTreeMap<&str, Vec<&'a Transaction>>,
    orphans_by_user: &BTreeMap<&str, Vec<&'a Transaction>>,
    association_window: Duration,
) -> Vec<&'a Transaction> {
    let interacted = session.interacted_products();
    let intersects = |tx: &Transaction| {
        tx.items
            .iter()
            .any(|item| interacted.contains(item.product_id.as_str()))
    };

    let mut associated: Vec<&Transaction> = Vec::new();

    if let Some(direct) = by_session.get(session.id.as_str()) {
        associated.extend(direct.iter().filter(|tx| intersects(tx)).copied());
    }

    if let Some(orphans) = orphans_by_user.get(session.user_id.as_str()) {
        let not_before = session.started_at;
        let not_after = session.last_activity() + association_window;
        associated.extend(
            orphans
                .iter()
                .filter(|tx| {
                    tx.timestamp >= not_before && tx.timestamp <= not_after && intersects(tx)
                })
                .copied(),
        );
    }

    associated.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    associated
}

/// Summarize a reconstruction into the funnel table: one row per stage,
/// counting sessions that reached at least that stage.
pub fn summarize(output: &FunnelOutput) -> Vec<FunnelSummaryRow> {
    let mut rows = Vec::with_capacity(FunnelStage::ALL.len());
    let mut previous: Option<u64> = None;
    for stage in FunnelStage::ALL {
        let sessions = output.sessions_reaching(stage);
        let conversion = match previous {
            None => 1.0,
            Some(0) => 0.0,
            Some(prev) => sessions as f64 / prev as f64,
        };
        rows.push(FunnelSummaryRow {
            stage,
            sessions,
            conversion_from_previous: conversion,
        });
        previous = Some(sessions);
    }
    rows
}
