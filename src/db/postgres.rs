use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{queries, AlertStore, DbPool, InsertOutcome, MessageStore, VisitStore};
use crate::error::{Error, Result};
use crate::models::alert::AlertRow;
use crate::models::message::MessageRow;
use crate::models::visit::VisitRow;
use crate::models::{
    Alert, AlertFilter, AlertType, Notification, RepresentativeMessage, Severity, Visit,
};

pub struct PgStore {
    pool: DbPool,
    unique_open_alerts: bool,
}

impl PgStore {
    /// Creates the alert tables if needed and tries to install the open-alert
    /// unique index. Without the index, duplicate suppression falls back to
    /// check-then-insert.
    pub async fn new(pool: DbPool) -> Result<Self> {
        sqlx::query(queries::CREATE_ALERTS_TABLE)
            .execute(&pool)
            .await?;
        sqlx::query(queries::CREATE_NOTIFICATIONS_TABLE)
            .execute(&pool)
            .await?;

        let unique_open_alerts = match sqlx::query(queries::CREATE_OPEN_ALERT_UNIQUE_INDEX)
            .execute(&pool)
            .await
        {
            Ok(_) => {
                info!("Open alert unique index in place");
                true
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Could not create open alert unique index, using check-then-insert"
                );
                false
            }
        };

        Ok(Self {
            pool,
            unique_open_alerts,
        })
    }

    async fn fetch_alert(&self, sql: &str, id: Uuid) -> Result<Alert> {
        let row: Option<AlertRow> = sqlx::query_as(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Alert::try_from(row),
            None => Err(Error::not_found("alert", id)),
        }
    }
}

#[async_trait]
impl AlertStore for PgStore {
    fn enforces_unique_open_alerts(&self) -> bool {
        self.unique_open_alerts
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<InsertOutcome> {
        let result = sqlx::query(queries::INSERT_ALERT)
            .bind(alert.id)
            .bind(alert.alert_type.as_str())
            .bind(alert.severity.as_str())
            .bind(&alert.title)
            .bind(&alert.message)
            .bind(alert.visit_id)
            .bind(alert.message_id)
            .bind(alert.is_read)
            .bind(alert.is_resolved)
            .bind(alert.resolved_by.as_deref())
            .bind(alert.resolved_at)
            .bind(alert.created_at)
            .bind(alert.metadata.as_ref().map(Json))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn find_open_alert(
        &self,
        visit_id: Uuid,
        alert_type: AlertType,
    ) -> Result<Option<Alert>> {
        let row: Option<AlertRow> = sqlx::query_as(&queries::select_open_alert_for_visit())
            .bind(visit_id)
            .bind(alert_type.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Alert::try_from).transpose()
    }

    async fn get_alert(&self, id: Uuid) -> Result<Alert> {
        self.fetch_alert(&queries::select_alert_by_id(), id).await
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let rows: Vec<AlertRow> = sqlx::query_as(&queries::select_alerts_filtered())
            .bind(filter.resolved)
            .bind(filter.read)
            .bind(filter.severity.map(|s| s.as_str()))
            .bind(filter.alert_type.map(|t| t.as_str()))
            .bind(filter.visit_id)
            .bind(filter.created_from)
            .bind(filter.created_until)
            .fetch_all(&self.pool)
            .await?;

        decode_alerts(rows)
    }

    async fn mark_read(&self, id: Uuid) -> Result<Alert> {
        self.fetch_alert(&queries::update_alert_read(), id).await
    }

    async fn mark_all_read(&self) -> Result<u64> {
        let result = sqlx::query(queries::UPDATE_ALL_ALERTS_READ)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn resolve(&self, id: Uuid, resolver: &str, at: DateTime<Utc>) -> Result<Alert> {
        let row: Option<AlertRow> = sqlx::query_as(&queries::update_alert_resolved())
            .bind(id)
            .bind(resolver)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Alert::try_from(row),
            None => Err(Error::not_found("alert", id)),
        }
    }

    async fn escalate(&self, id: Uuid, severity: Severity) -> Result<Alert> {
        let row: Option<AlertRow> = sqlx::query_as(&queries::update_alert_severity())
            .bind(id)
            .bind(severity.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Alert::try_from(row),
            None => Err(Error::not_found("alert", id)),
        }
    }

    async fn delete_alert(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(queries::DELETE_ALERT)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("alert", id));
        }
        Ok(())
    }

    async fn enqueue_notifications(&self, notifications: &[Notification]) -> Result<()> {
        if notifications.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for n in notifications {
            sqlx::query(queries::INSERT_NOTIFICATION)
                .bind(n.id)
                .bind(n.alert_id)
                .bind(n.audience.as_str())
                .bind(n.channel.as_str())
                .bind(n.created_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}

#[async_trait]
impl VisitStore for PgStore {
    async fn open_visits(&self) -> Result<Vec<Visit>> {
        let rows: Vec<VisitRow> = sqlx::query_as(queries::SELECT_OPEN_VISITS)
            .fetch_all(&self.pool)
            .await?;

        let mut visits = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match Visit::try_from(row) {
                Ok(visit) => visits.push(visit),
                Err(e) => warn!(visit_id = %id, error = %e, "Skipping undecodable visit row"),
            }
        }
        Ok(visits)
    }

    async fn set_visit_flags(
        &self,
        id: Uuid,
        is_late: bool,
        exceeds_time_limit: bool,
    ) -> Result<()> {
        let result = sqlx::query(queries::UPDATE_VISIT_FLAGS)
            .bind(id)
            .bind(is_late)
            .bind(exceeds_time_limit)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("visit", id));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn pending_messages(&self) -> Result<Vec<RepresentativeMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(queries::SELECT_PENDING_MESSAGES)
            .fetch_all(&self.pool)
            .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match RepresentativeMessage::try_from(row) {
                Ok(msg) => messages.push(msg),
                Err(e) => warn!(message_id = %id, error = %e, "Skipping undecodable message row"),
            }
        }
        Ok(messages)
    }

    async fn mark_message_alerted(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(queries::UPDATE_MESSAGE_ALERTED)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("message", id));
        }
        Ok(())
    }
}

/// Converts listed rows. One bad row fails the whole listing.
fn decode_alerts(rows: Vec<AlertRow>) -> Result<Vec<Alert>> {
    rows.into_iter()
        .map(|row| {
            let id = row.alert_id;
            Alert::try_from(row).map_err(|e| {
                warn!(alert_id = %id, error = %e, "Undecodable alert row");
                e
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(severity: &str) -> AlertRow {
        AlertRow {
            alert_id: Uuid::new_v4(),
            alert_type: "late_arrival".to_string(),
            severity: severity.to_string(),
            title: "Late arrival".to_string(),
            message: "late".to_string(),
            visit_id: Some(Uuid::new_v4()),
            message_id: None,
            is_read: false,
            is_resolved: false,
            resolved_by: None,
            resolved_at: None,
            created_at: Utc::now(),
            metadata: None,
        }
    }

    #[test]
    fn listing_decodes_every_row() {
        let alerts = decode_alerts(vec![row("high"), row("critical")]).unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[1].severity, Severity::Critical);
        assert_eq!(alerts[0].alert_type, AlertType::LateArrival);
    }

    #[test]
    fn undecodable_row_fails_the_listing() {
        let err = decode_alerts(vec![row("high"), row("urgent")]).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }
}
