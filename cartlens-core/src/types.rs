//! Core domain types for cartlens
//!
//! These types are the canonical entity model over which all analytics
//! run. The external dataset generator writes them as JSON; the serde
//! derives here define that wire schema (snake_case field names,
//! RFC 3339 timestamps).
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **User** | A registered shopper; owns Sessions and Transactions |
//! | **Category** | A node in the product category tree (acyclic) |
//! | **Product** | A catalog item with a constant price for the window |
//! | **Session** | One visit: an ordered sequence of browsing Events |
//! | **Event** | A timestamped interaction with a product |
//! | **Transaction** | A completed order with line items |
//! | **FunnelEvent** | Derived: an Event tagged with its funnel stage |
//! | **CohortKey** | Derived: a user's acquisition-period bucket |
//!
//! Source entities are immutable once loaded; derived entities are
//! transient outputs, recomputable from the sources at any time.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================
// Observation window
// ============================================

/// The fixed span over which all entities and analytics are defined.
///
/// `end` is exclusive. Every transaction timestamp must fall inside the
/// window; registrations may predate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AnalysisWindow {
    /// Window starting at `start` and spanning `days` days.
    pub fn from_start(start: DateTime<Utc>, days: u32) -> Self {
        Self {
            start,
            end: start + Duration::days(days as i64),
        }
    }

    /// Window ending at `end` (exclusive) and spanning `days` days.
    pub fn from_end(end: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: end - Duration::days(days as i64),
            end,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

// ============================================
// Users
// ============================================

/// Coarse location attributes carried by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoData {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// A registered shopper.
///
/// Invariant: `registration_date` is not later than any event or
/// transaction referencing this user (validated at ingestion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    #[serde(rename = "user_id")]
    pub id: String,
    /// Acquisition timestamp; basis for cohort assignment
    pub registration_date: DateTime<Utc>,
    /// Optional demographic attributes
    #[serde(default)]
    pub geo_data: Option<GeoData>,
    /// Most recent activity, if the generator tracked it
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
}

// ============================================
// Categories and products
// ============================================

/// A node in the category tree.
///
/// The parent references form a forest; cycles are rejected at ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Unique identifier
    #[serde(rename = "category_id")]
    pub id: String,
    pub name: String,
    /// Parent category, `None` for roots
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// A catalog item.
///
/// Price is constant for the analysis window; there is no historical
/// price tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique identifier
    #[serde(rename = "product_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Category this product belongs to
    pub category_id: String,
    /// Current price; must be positive
    #[serde(alias = "base_price")]
    pub price: Decimal,
    /// Units in stock; must be non-negative
    #[serde(alias = "current_stock")]
    pub inventory: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

// ============================================
// Sessions and events
// ============================================

/// What a shopper did at one moment in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    View,
    AddToCart,
    RemoveFromCart,
    CheckoutStart,
    Purchase,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::View => "view",
            EventType::AddToCart => "add_to_cart",
            EventType::RemoveFromCart => "remove_from_cart",
            EventType::CheckoutStart => "checkout_start",
            EventType::Purchase => "purchase",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(EventType::View),
            "add_to_cart" => Ok(EventType::AddToCart),
            "remove_from_cart" => Ok(EventType::RemoveFromCart),
            "checkout_start" => Ok(EventType::CheckoutStart),
            "purchase" => Ok(EventType::Purchase),
            _ => Err(format!("unknown event type: {}", s)),
        }
    }
}

/// A single interaction within a session. Immutable, read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub product_id: String,
}

/// One visit by one user: an ordered sequence of events.
///
/// Invariant: event timestamps are non-decreasing; a session belongs to
/// exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    #[serde(rename = "session_id")]
    pub id: String,
    /// Owning user
    pub user_id: String,
    #[serde(rename = "start_time")]
    pub started_at: DateTime<Utc>,
    pub events: Vec<Event>,
}

impl Session {
    /// Timestamp of the last event, or the session start for empty sessions.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.events
            .last()
            .map(|e| e.timestamp)
            .unwrap_or(self.started_at)
    }

    /// Distinct products interacted with, in id order.
    pub fn interacted_products(&self) -> std::collections::BTreeSet<&str> {
        self.events.iter().map(|e| e.product_id.as_str()).collect()
    }
}

// ============================================
// Transactions
// ============================================

/// One purchased product within a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    /// Units purchased; must be positive
    pub quantity: i64,
    /// Price per unit at sale time
    pub unit_price: Decimal,
}

impl LineItem {
    /// quantity × unit price
    pub fn line_total(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price
    }
}

/// A completed order.
///
/// Invariant: `total` equals the sum of line totals; the timestamp falls
/// inside the observation window and is not before the owning user's
/// registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier
    #[serde(rename = "transaction_id")]
    pub id: String,
    /// Originating session, `None` for orders placed outside any
    /// recorded session
    #[serde(default)]
    pub session_id: Option<String>,
    /// Owning user
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub items: Vec<LineItem>,
    /// Order total; must equal the sum of line totals
    pub total: Decimal,
}

impl Transaction {
    /// Sum of line totals.
    pub fn computed_total(&self) -> Decimal {
        self.items.iter().map(LineItem::line_total).sum()
    }

    /// Distinct products in this order, in id order.
    pub fn distinct_products(&self) -> std::collections::BTreeSet<&str> {
        self.items.iter().map(|i| i.product_id.as_str()).collect()
    }
}

// ============================================
// Derived: funnel
// ============================================

/// The furthest point a session can reach, in order.
///
/// Stage progression within a session is monotonic non-decreasing; the
/// derived ordering below is load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    View,
    Cart,
    Checkout,
    Purchase,
}

impl FunnelStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelStage::View => "view",
            FunnelStage::Cart => "cart",
            FunnelStage::Checkout => "checkout",
            FunnelStage::Purchase => "purchase",
        }
    }

    /// All stages in funnel order.
    pub const ALL: [FunnelStage; 4] = [
        FunnelStage::View,
        FunnelStage::Cart,
        FunnelStage::Checkout,
        FunnelStage::Purchase,
    ];

    /// Stage an event type reaches on its own.
    ///
    /// `Purchase` events are not classified here: a purchase stage needs a
    /// corroborating transaction, which is the session reconstructor's
    /// call. `remove_from_cart` is a cart interaction and classifies at
    /// `Cart`.
    pub fn from_event_type(event_type: EventType) -> Option<FunnelStage> {
        match event_type {
            EventType::View => Some(FunnelStage::View),
            EventType::AddToCart | EventType::RemoveFromCart => Some(FunnelStage::Cart),
            EventType::CheckoutStart => Some(FunnelStage::Checkout),
            EventType::Purchase => None,
        }
    }
}

impl std::fmt::Display for FunnelStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An event tagged with the funnel stage the session had reached at that
/// point. Produced by the session reconstructor; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelEvent {
    pub user_id: String,
    pub session_id: String,
    pub stage: FunnelStage,
    pub timestamp: DateTime<Utc>,
    /// Product the underlying event or line item referenced
    pub product_id: String,
}

// ============================================
// Derived: cohorts
// ============================================

/// Acquisition-period bucket for a user.
///
/// `floor((registration − window start) / bucket width)`. Users acquired
/// before the window start get negative keys; the formula is applied
/// verbatim rather than clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CohortKey(pub i64);

impl CohortKey {
    pub fn from_registration(
        registration: DateTime<Utc>,
        window_start: DateTime<Utc>,
        bucket_width: Duration,
    ) -> Self {
        let offset = (registration - window_start).num_seconds();
        CohortKey(offset.div_euclid(bucket_width.num_seconds()))
    }
}

impl std::fmt::Display for CohortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================
// Time granularity
// ============================================

/// Bucket size for windowed aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeGranularity {
    Daily,
    Weekly,
}

impl TimeGranularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeGranularity::Daily => "daily",
            TimeGranularity::Weekly => "weekly",
        }
    }

    /// Length of one bucket.
    pub fn bucket_len(&self) -> Duration {
        match self {
            TimeGranularity::Daily => Duration::days(1),
            TimeGranularity::Weekly => Duration::days(7),
        }
    }
}

impl std::str::FromStr for TimeGranularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(TimeGranularity::Daily),
            "weekly" => Ok(TimeGranularity::Weekly),
            _ => Err(format!("unknown granularity: {}", s)),
        }
    }
}
