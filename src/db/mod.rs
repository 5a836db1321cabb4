//! Backing store access.
//!
//! The monitors and the aggregator only see the three traits below.
//! [`PgStore`] talks to Postgres through sqlx; [`MemoryStore`] keeps
//! everything behind a tokio `RwLock` for tests and database-less runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Alert, AlertFilter, AlertType, Notification, RepresentativeMessage, Severity, Visit,
};

pub mod memory;
pub mod postgres;
pub mod queries;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type DbPool = Pool<Postgres>;

pub async fn init_pool(database_url: &str, max_connections: u32) -> anyhow::Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Rejected by a uniqueness rule (same id, or an open alert for the same visit and type).
    Duplicate,
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Whether `insert_alert` itself rejects a second unresolved alert for the
    /// same (visit, type). When false, callers check with `find_open_alert` first.
    fn enforces_unique_open_alerts(&self) -> bool;

    async fn insert_alert(&self, alert: &Alert) -> Result<InsertOutcome>;

    async fn find_open_alert(&self, visit_id: Uuid, alert_type: AlertType)
        -> Result<Option<Alert>>;

    async fn get_alert(&self, id: Uuid) -> Result<Alert>;

    /// Alerts matching `filter`, newest first.
    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>>;

    async fn mark_read(&self, id: Uuid) -> Result<Alert>;

    /// Returns how many alerts changed.
    async fn mark_all_read(&self) -> Result<u64>;

    /// Resolving twice keeps the first resolver and time.
    async fn resolve(&self, id: Uuid, resolver: &str, at: DateTime<Utc>) -> Result<Alert>;

    async fn escalate(&self, id: Uuid, severity: Severity) -> Result<Alert>;

    async fn delete_alert(&self, id: Uuid) -> Result<()>;

    async fn enqueue_notifications(&self, notifications: &[Notification]) -> Result<()>;
}

#[async_trait]
pub trait VisitStore: Send + Sync {
    /// Visits not in a terminal status, in a stable order.
    async fn open_visits(&self) -> Result<Vec<Visit>>;

    /// Switches flags on. A `false` argument leaves the stored flag as it is.
    async fn set_visit_flags(&self, id: Uuid, is_late: bool, exceeds_time_limit: bool)
        -> Result<()>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Unread messages that have not produced an alert yet, oldest first.
    async fn pending_messages(&self) -> Result<Vec<RepresentativeMessage>>;

    async fn mark_message_alerted(&self, id: Uuid) -> Result<()>;
}
