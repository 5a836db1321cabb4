//! Unified alert view for the dashboard.
//!
//! Alerts from every monitor and from operators live in the same store; the
//! aggregator lists them newest first, applies filters, runs operator
//! mutations and projects statistics over the current set.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::db::{AlertStore, InsertOutcome};
use crate::error::{Error, Result};
use crate::models::{Alert, AlertFilter, AlertType, NewAlert, Severity};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl SeverityCounts {
    fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Low => self.low += 1,
            Severity::Medium => self.medium += 1,
            Severity::High => self.high += 1,
            Severity::Critical => self.critical += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertStats {
    pub total: usize,
    pub unread: usize,
    pub read: usize,
    pub unresolved: usize,
    pub resolved: usize,
    pub by_severity: SeverityCounts,
    pub by_type: BTreeMap<AlertType, usize>,
    /// Created since midnight UTC of `now`.
    pub today: usize,
    /// Created in the seven days up to `now`.
    pub this_week: usize,
}

impl AlertStats {
    pub fn from_alerts(alerts: &[Alert], now: DateTime<Utc>) -> Self {
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or(now);
        let week_start = now - Duration::days(7);

        let mut stats = AlertStats {
            total: alerts.len(),
            ..AlertStats::default()
        };

        for alert in alerts {
            if alert.is_read {
                stats.read += 1;
            } else {
                stats.unread += 1;
            }
            if alert.is_resolved {
                stats.resolved += 1;
            } else {
                stats.unresolved += 1;
            }
            stats.by_severity.add(alert.severity);
            *stats.by_type.entry(alert.alert_type).or_default() += 1;

            if alert.created_at <= now {
                if alert.created_at >= day_start {
                    stats.today += 1;
                }
                if alert.created_at > week_start {
                    stats.this_week += 1;
                }
            }
        }

        stats
    }
}

pub struct AlertAggregator {
    store: Arc<dyn AlertStore>,
}

impl AlertAggregator {
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: Uuid) -> Result<Alert> {
        self.store.get_alert(id).await
    }

    pub async fn list(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let mut alerts = self.store.list_alerts(filter).await?;
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(alerts)
    }

    pub async fn list_active(&self) -> Result<Vec<Alert>> {
        self.list(&AlertFilter::active()).await
    }

    pub async fn list_resolved(&self) -> Result<Vec<Alert>> {
        self.list(&AlertFilter::resolved()).await
    }

    pub async fn unread_count(&self) -> Result<usize> {
        let filter = AlertFilter {
            read: Some(false),
            ..AlertFilter::default()
        };
        Ok(self.store.list_alerts(&filter).await?.len())
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> Result<AlertStats> {
        let alerts = self.store.list_alerts(&AlertFilter::default()).await?;
        Ok(AlertStats::from_alerts(&alerts, now))
    }

    /// Operator-created alert.
    pub async fn raise(&self, new_alert: NewAlert, now: DateTime<Utc>) -> Result<Alert> {
        let alert = new_alert.into_alert(now);
        match self.store.insert_alert(&alert).await? {
            InsertOutcome::Inserted => {
                info!(alert_id = %alert.id, alert_type = %alert.alert_type, "Manual alert raised");
                Ok(alert)
            }
            // an open alert already covers this visit and type
            InsertOutcome::Duplicate => match alert.visit_id {
                Some(visit_id) => self
                    .store
                    .find_open_alert(visit_id, alert.alert_type)
                    .await?
                    .ok_or_else(|| Error::not_found("alert", alert.id)),
                None => Err(Error::not_found("alert", alert.id)),
            },
        }
    }

    pub async fn mark_read(&self, id: Uuid) -> Result<Alert> {
        self.store.mark_read(id).await
    }

    pub async fn mark_all_read(&self) -> Result<u64> {
        self.store.mark_all_read().await
    }

    pub async fn resolve(&self, id: Uuid, resolver: &str, now: DateTime<Utc>) -> Result<Alert> {
        let alert = self.store.resolve(id, resolver, now).await?;
        info!(alert_id = %id, resolved_by = ?alert.resolved_by, "Alert resolved");
        Ok(alert)
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        self.store.delete_alert(id).await?;
        info!(alert_id = %id, "Alert deleted");
        Ok(())
    }
}
