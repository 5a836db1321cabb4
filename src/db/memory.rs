use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{AlertStore, InsertOutcome, MessageStore, VisitStore};
use crate::error::{Error, Result};
use crate::models::{
    Alert, AlertFilter, AlertType, Notification, RepresentativeMessage, Severity, Visit,
};

#[derive(Default)]
struct Tables {
    visits: Vec<Visit>,
    alerts: Vec<Alert>,
    messages: Vec<RepresentativeMessage>,
    notifications: Vec<Notification>,
}

/// In-process store. Every operation takes the single lock, so the
/// open-alert uniqueness check and the insert are one atomic step.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unique_open_alerts: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            unique_open_alerts: true,
        }
    }

    /// A store that accepts any insert with a fresh id, like a table with no
    /// open-alert index.
    pub fn without_unique_constraint() -> Self {
        Self {
            unique_open_alerts: false,
            ..Self::new()
        }
    }

    pub async fn insert_visit(&self, visit: Visit) {
        self.tables.write().await.visits.push(visit);
    }

    pub async fn insert_message(&self, message: RepresentativeMessage) {
        self.tables.write().await.messages.push(message);
    }

    pub async fn visit(&self, id: Uuid) -> Option<Visit> {
        self.tables
            .read()
            .await
            .visits
            .iter()
            .find(|v| v.id == id)
            .cloned()
    }

    /// Replaces a stored visit, e.g. after an operator status change.
    pub async fn update_visit(&self, visit: Visit) -> Result<()> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .visits
            .iter_mut()
            .find(|v| v.id == visit.id)
            .ok_or_else(|| Error::not_found("visit", visit.id))?;
        *slot = visit;
        Ok(())
    }

    pub async fn message(&self, id: Uuid) -> Option<RepresentativeMessage> {
        self.tables
            .read()
            .await
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.tables.read().await.notifications.clone()
    }

    async fn update_alert<F>(&self, id: Uuid, f: F) -> Result<Alert>
    where
        F: FnOnce(&mut Alert) + Send,
    {
        let mut tables = self.tables.write().await;
        let alert = tables
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::not_found("alert", id))?;
        f(alert);
        Ok(alert.clone())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    fn enforces_unique_open_alerts(&self) -> bool {
        self.unique_open_alerts
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<InsertOutcome> {
        let mut tables = self.tables.write().await;

        let id_taken = tables.alerts.iter().any(|a| a.id == alert.id);
        let open_twin = self.unique_open_alerts
            && alert.visit_id.is_some()
            && !alert.is_resolved
            && tables.alerts.iter().any(|a| {
                !a.is_resolved && a.visit_id == alert.visit_id && a.alert_type == alert.alert_type
            });

        if id_taken || open_twin {
            return Ok(InsertOutcome::Duplicate);
        }
        tables.alerts.push(alert.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn find_open_alert(
        &self,
        visit_id: Uuid,
        alert_type: AlertType,
    ) -> Result<Option<Alert>> {
        Ok(self
            .tables
            .read()
            .await
            .alerts
            .iter()
            .filter(|a| {
                !a.is_resolved && a.visit_id == Some(visit_id) && a.alert_type == alert_type
            })
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn get_alert(&self, id: Uuid) -> Result<Alert> {
        self.tables
            .read()
            .await
            .alerts
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("alert", id))
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let mut alerts: Vec<Alert> = self
            .tables
            .read()
            .await
            .alerts
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(alerts)
    }

    async fn mark_read(&self, id: Uuid) -> Result<Alert> {
        self.update_alert(id, |a| a.mark_read()).await
    }

    async fn mark_all_read(&self) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;
        for alert in tables.alerts.iter_mut().filter(|a| !a.is_read) {
            alert.mark_read();
            changed += 1;
        }
        Ok(changed)
    }

    async fn resolve(&self, id: Uuid, resolver: &str, at: DateTime<Utc>) -> Result<Alert> {
        let resolver = resolver.to_string();
        self.update_alert(id, move |a| a.resolve(&resolver, at)).await
    }

    async fn escalate(&self, id: Uuid, severity: Severity) -> Result<Alert> {
        self.update_alert(id, move |a| a.severity = severity).await
    }

    async fn delete_alert(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        let before = tables.alerts.len();
        tables.alerts.retain(|a| a.id != id);
        if tables.alerts.len() == before {
            return Err(Error::not_found("alert", id));
        }
        Ok(())
    }

    async fn enqueue_notifications(&self, notifications: &[Notification]) -> Result<()> {
        self.tables
            .write()
            .await
            .notifications
            .extend_from_slice(notifications);
        Ok(())
    }
}

#[async_trait]
impl VisitStore for MemoryStore {
    async fn open_visits(&self) -> Result<Vec<Visit>> {
        Ok(self
            .tables
            .read()
            .await
            .visits
            .iter()
            .filter(|v| !v.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn set_visit_flags(
        &self,
        id: Uuid,
        is_late: bool,
        exceeds_time_limit: bool,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let visit = tables
            .visits
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| Error::not_found("visit", id))?;
        visit.is_late |= is_late;
        visit.exceeds_time_limit |= exceeds_time_limit;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn pending_messages(&self) -> Result<Vec<RepresentativeMessage>> {
        Ok(self
            .tables
            .read()
            .await
            .messages
            .iter()
            .filter(|m| !m.is_read && !m.alert_raised)
            .cloned()
            .collect())
    }

    async fn mark_message_alerted(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        let message = tables
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::not_found("message", id))?;
        message.alert_raised = true;
        Ok(())
    }
}
