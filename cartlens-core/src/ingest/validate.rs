//! Entity validation and indexing.
//!
//! One pass per entity kind, in dependency order (users and categories
//! first, transactions last). A failed record is excluded and reported;
//! the run only aborts later if the overall error rate breaches the
//! configured threshold.

use crate::error::{EntityKind, ErrorReport, RecordError};
use crate::ingest::RawDataset;
use crate::types::{AnalysisWindow, Category, Product, Session, Transaction, User};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// A validated dataset, indexed by id where analytics need lookups.
///
/// Sessions and transactions are held in deterministic order (session id;
/// transaction timestamp then id) so that downstream tables are
/// byte-identical across runs.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub window: AnalysisWindow,
    pub users: BTreeMap<String, User>,
    pub categories: BTreeMap<String, Category>,
    pub products: BTreeMap<String, Product>,
    pub sessions: Vec<Session>,
    pub transactions: Vec<Transaction>,
    pub errors: ErrorReport,
}

impl Dataset {
    /// Validate a raw dataset against the entity invariants.
    ///
    /// Never fails: malformed and dangling records are excluded and
    /// collected into `errors`; deciding whether the error rate is fatal
    /// is the pipeline's call.
    pub fn validate(raw: RawDataset, window: AnalysisWindow) -> Dataset {
        let mut errors = ErrorReport::new();

        let users = validate_users(raw.users, &mut errors);
        let categories = validate_categories(raw.categories, &mut errors);
        let products = validate_products(raw.products, &categories, &mut errors);
        let mut sessions = validate_sessions(raw.sessions, &users, &products, &mut errors);
        let mut transactions =
            validate_transactions(raw.transactions, &users, &products, window, &mut errors);

        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        transactions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        tracing::info!(
            users = users.len(),
            categories = categories.len(),
            products = products.len(),
            sessions = sessions.len(),
            transactions = transactions.len(),
            errors = errors.len(),
            "Dataset validated"
        );

        Dataset {
            window,
            users,
            categories,
            products,
            sessions,
            transactions,
            errors,
        }
    }
}

fn validate_users(users: Vec<User>, errors: &mut ErrorReport) -> BTreeMap<String, User> {
    let mut out = BTreeMap::new();
    for user in users {
        errors.saw_record();
        if out.contains_key(&user.id) {
            errors.push(RecordError::Validation {
                entity: EntityKind::User,
                id: user.id,
                reason: "duplicate user id".to_string(),
            });
            continue;
        }
        out.insert(user.id.clone(), user);
    }
    out
}

fn validate_categories(
    categories: Vec<Category>,
    errors: &mut ErrorReport,
) -> BTreeMap<String, Category> {
    let mut all = BTreeMap::new();
    for category in categories {
        errors.saw_record();
        if all.contains_key(&category.id) {
            errors.push(RecordError::Validation {
                entity: EntityKind::Category,
                id: category.id,
                reason: "duplicate category id".to_string(),
            });
            continue;
        }
        all.insert(category.id.clone(), category);
    }

    // Walk each parent chain; a chain that revisits a node is a cycle,
    // a chain that leaves the map is a dangling parent. Either way the
    // starting category is excluded.
    let mut out = BTreeMap::new();
    'outer: for (id, category) in &all {
        let mut seen = std::collections::BTreeSet::new();
        seen.insert(id.as_str());
        let mut cursor = category.parent_id.as_deref();
        while let Some(parent_id) = cursor {
            if !seen.insert(parent_id) {
                errors.push(RecordError::Validation {
                    entity: EntityKind::Category,
                    id: id.clone(),
                    reason: "parent chain forms a cycle".to_string(),
                });
                continue 'outer;
            }
            match all.get(parent_id) {
                Some(parent) => cursor = parent.parent_id.as_deref(),
                None => {
                    errors.push(RecordError::ReferentialIntegrity {
                        entity: EntityKind::Category,
                        id: id.clone(),
                        field: "parent_id",
                        missing: parent_id.to_string(),
                    });
                    continue 'outer;
                }
            }
        }
        out.insert(id.clone(), category.clone());
    }
    out
}

fn validate_products(
    products: Vec<Product>,
    categories: &BTreeMap<String, Category>,
    errors: &mut ErrorReport,
) -> BTreeMap<String, Product> {
    let mut out = BTreeMap::new();
    for product in products {
        errors.saw_record();
        if out.contains_key(&product.id) {
            errors.push(RecordError::Validation {
                entity: EntityKind::Product,
                id: product.id,
                reason: "duplicate product id".to_string(),
            });
            continue;
        }
        if product.price <= Decimal::ZERO {
            errors.push(RecordError::Validation {
                entity: EntityKind::Product,
                id: product.id,
                reason: format!("price must be positive, got {}", product.price),
            });
            continue;
        }
        if product.inventory < 0 {
            errors.push(RecordError::Validation {
                entity: EntityKind::Product,
                id: product.id,
                reason: format!("inventory must be non-negative, got {}", product.inventory),
            });
            continue;
        }
        if !categories.contains_key(&product.category_id) {
            errors.push(RecordError::ReferentialIntegrity {
                entity: EntityKind::Product,
                id: product.id,
                field: "category_id",
                missing: product.category_id.clone(),
            });
            continue;
        }
        out.insert(product.id.clone(), product);
    }
    out
}

fn validate_sessions(
    sessions: Vec<Session>,
    users: &BTreeMap<String, User>,
    products: &BTreeMap<String, Product>,
    errors: &mut ErrorReport,
) -> Vec<Session> {
    let mut seen_ids = std::collections::BTreeSet::new();
    let mut out = Vec::new();

    'outer: for session in sessions {
        errors.saw_record();
        if !seen_ids.insert(session.id.clone()) {
            errors.push(RecordError::Validation {
                entity: EntityKind::Session,
                id: session.id,
                reason: "duplicate session id".to_string(),
            });
            continue;
        }
        let Some(user) = users.get(&session.user_id) else {
            errors.push(RecordError::ReferentialIntegrity {
                entity: EntityKind::Session,
                id: session.id.clone(),
                field: "user_id",
                missing: session.user_id.clone(),
            });
            continue;
        };

        let mut prev = None;
        for event in &session.events {
            if event.timestamp < user.registration_date {
                errors.push(RecordError::Validation {
                    entity: EntityKind::Session,
                    id: session.id.clone(),
                    reason: "event precedes the user's registration".to_string(),
                });
                continue 'outer;
            }
            if let Some(prev) = prev {
                if event.timestamp < prev {
                    errors.push(RecordError::Validation {
                        entity: EntityKind::Session,
                        id: session.id.clone(),
                        reason: "event timestamps are not non-decreasing".to_string(),
                    });
                    continue 'outer;
                }
            }
            prev = Some(event.timestamp);

            if !products.contains_key(&event.product_id) {
                errors.push(RecordError::ReferentialIntegrity {
                    entity: EntityKind::Session,
                    id: session.id.clone(),
                    field: "events.product_id",
                    missing: event.product_id.clone(),
                });
                continue 'outer;
            }
        }

        out.push(session);
    }
    out
}

fn validate_transactions(
    transactions: Vec<Transaction>,
    users: &BTreeMap<String, User>,
    products: &BTreeMap<String, Product>,
    window: AnalysisWindow,
    errors: &mut ErrorReport,
) -> Vec<Transaction> {
    let mut seen_ids = std::collections::BTreeSet::new();
    let mut out = Vec::new();

    'outer: for tx in transactions {
        errors.saw_record();
        if !seen_ids.insert(tx.id.clone()) {
            errors.push(RecordError::Validation {
                entity: EntityKind::Transaction,
                id: tx.id,
                reason: "duplicate transaction id".to_string(),
            });
            continue;
        }
        let Some(user) = users.get(&tx.user_id) else {
            errors.push(RecordError::ReferentialIntegrity {
                entity: EntityKind::Transaction,
                id: tx.id.clone(),
                field: "user_id",
                missing: tx.user_id.clone(),
            });
            continue;
        };
        if !window.contains(tx.timestamp) {
            errors.push(RecordError::Validation {
                entity: EntityKind::Transaction,
                id: tx.id.clone(),
                reason: format!("timestamp {} outside the observation window", tx.timestamp),
            });
            continue;
        }
        if tx.timestamp < user.registration_date {
            errors.push(RecordError::Validation {
                entity: EntityKind::Transaction,
                id: tx.id.clone(),
                reason: "transaction precedes the user's registration".to_string(),
            });
            continue;
        }
        if tx.items.is_empty() {
            errors.push(RecordError::Validation {
                entity: EntityKind::Transaction,
                id: tx.id.clone(),
                reason: "transaction has no line items".to_string(),
            });
            continue;
        }
        for item in &tx.items {
            if item.quantity <= 0 {
                errors.push(RecordError::Validation {
                    entity: EntityKind::Transaction,
                    id: tx.id.clone(),
                    reason: format!("line item quantity must be positive, got {}", item.quantity),
                });
                continue 'outer;
            }
            if item.unit_price <= Decimal::ZERO {
                errors.push(RecordError::Validation {
                    entity: EntityKind::Transaction,
                    id: tx.id.clone(),
                    reason: format!("line item unit price must be positive, got {}", item.unit_price),
                });
                continue 'outer;
            }
            if !products.contains_key(&item.product_id) {
                errors.push(RecordError::ReferentialIntegrity {
                    entity: EntityKind::Transaction,
                    id: tx.id.clone(),
                    field: "items.product_id",
                    missing: item.product_id.clone(),
                });
                continue 'outer;
            }
        }
        let computed = tx.computed_total();
        if computed != tx.total {
            errors.push(RecordError::Validation {
                entity: EntityKind::Transaction,
                id: tx.id.clone(),
                reason: format!("total {} does not match line items sum {}", tx.total, computed),
            });
            continue;
        }

        // A dangling session reference is tolerated: the transaction is
        // still revenue, it just never associates with a funnel.
        if let Some(session_id) = &tx.session_id {
            tracing::trace!(transaction = %tx.id, session = %session_id, "Session-linked transaction");
        }

        out.push(tx);
    }
    out
}
