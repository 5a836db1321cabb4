//! One polling pass over a source table.
//!
//! A sweep fetches its candidates, handles them one by one in fetch order and
//! reports what it did. Per-item failures are logged and counted; they never
//! abort the batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::db::{AlertStore, InsertOutcome, MessageStore, VisitStore};
use crate::error::{bounded, Error, Result};
use crate::models::{
    Alert, AlertMetadata, AlertType, NewAlert, Notification, RepresentativeMessage, Severity, Visit,
};
use crate::processor::lateness::{self, Verdict};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub raised: usize,
    pub escalated: usize,
    pub duplicates: usize,
    pub flagged: usize,
    /// Items that failed validation.
    pub skipped: usize,
    /// Items whose store calls failed or timed out.
    pub failed: usize,
    pub fetch_failed: bool,
}

impl SweepReport {
    fn record_failure(&mut self, err: &Error) {
        match err {
            Error::Validation { .. } | Error::Decode { .. } => self.skipped += 1,
            _ => self.failed += 1,
        }
    }
}

#[async_trait]
pub trait Sweep: Send + Sync {
    async fn sweep(&self, now: DateTime<Utc>) -> SweepReport;
}

/// Queues notifications for a new alert. Failures are logged, the alert stays.
async fn notify(
    alerts: &dyn AlertStore,
    config: &MonitorConfig,
    alert: &Alert,
    now: DateTime<Utc>,
    limit: Duration,
) {
    let notifications = Notification::fan_out(config, alert, now);
    if notifications.is_empty() {
        return;
    }
    match bounded(
        "enqueue_notifications",
        limit,
        alerts.enqueue_notifications(&notifications),
    )
    .await
    {
        Ok(()) => debug!(alert_id = %alert.id, count = notifications.len(), "Notifications queued"),
        Err(e) => warn!(alert_id = %alert.id, error = %e, "Failed to queue notifications"),
    }
}

/// Lateness and duration checks over all open visits.
pub struct VisitSweep {
    visits: Arc<dyn VisitStore>,
    alerts: Arc<dyn AlertStore>,
    config: MonitorConfig,
    raises: Vec<AlertType>,
    store_timeout: Duration,
}

impl VisitSweep {
    /// Raises both late-arrival and time-exceeded alerts.
    pub fn new(
        visits: Arc<dyn VisitStore>,
        alerts: Arc<dyn AlertStore>,
        config: MonitorConfig,
        store_timeout: Duration,
    ) -> Self {
        Self {
            visits,
            alerts,
            config,
            raises: vec![AlertType::LateArrival, AlertType::TimeExceeded],
            store_timeout,
        }
    }

    /// Restricts the sweep to the given alert types; flags of other types are left alone.
    pub fn raising(mut self, types: &[AlertType]) -> Self {
        self.raises = types.to_vec();
        self
    }

    async fn process_visit(
        &self,
        visit: &Visit,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<()> {
        let verdict = lateness::evaluate(
            visit,
            now,
            self.config.grace_period_minutes,
            self.config.escalation_threshold_minutes,
        )?;

        let late = verdict.is_late && self.raises.contains(&AlertType::LateArrival);
        let exceeded =
            verdict.exceeds_time_limit && self.raises.contains(&AlertType::TimeExceeded);

        if late {
            self.raise_for_visit(visit, AlertType::LateArrival, &verdict, now, report)
                .await?;
        }
        if exceeded {
            self.raise_for_visit(visit, AlertType::TimeExceeded, &verdict, now, report)
                .await?;
        }

        // flags are sticky, only ever switched on here
        let is_late = visit.is_late || late;
        let exceeds_time_limit = visit.exceeds_time_limit || exceeded;
        if is_late != visit.is_late || exceeds_time_limit != visit.exceeds_time_limit {
            bounded(
                "set_visit_flags",
                self.store_timeout,
                self.visits
                    .set_visit_flags(visit.id, is_late, exceeds_time_limit),
            )
            .await?;
            report.flagged += 1;
        }

        Ok(())
    }

    async fn raise_for_visit(
        &self,
        visit: &Visit,
        alert_type: AlertType,
        verdict: &Verdict,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<()> {
        let severity = verdict.severity.unwrap_or(Severity::High);
        let limit = self.store_timeout;

        if !self.alerts.enforces_unique_open_alerts() {
            let existing = bounded(
                "find_open_alert",
                limit,
                self.alerts.find_open_alert(visit.id, alert_type),
            )
            .await?;
            if let Some(existing) = existing {
                report.duplicates += 1;
                return self.escalate_if_needed(&existing, severity, report).await;
            }
        }

        let alert = NewAlert::new(alert_type, severity, visit_message(visit, alert_type, verdict))
            .for_visit(visit.id)
            .with_metadata(visit_metadata(visit, verdict))
            .into_alert(now);

        match bounded("insert_alert", limit, self.alerts.insert_alert(&alert)).await? {
            InsertOutcome::Inserted => {
                report.raised += 1;
                info!(
                    alert_id = %alert.id,
                    visit_id = %visit.id,
                    alert_type = %alert_type,
                    severity = %severity,
                    "Raised visit alert"
                );
                notify(self.alerts.as_ref(), &self.config, &alert, now, limit).await;
            }
            InsertOutcome::Duplicate => {
                report.duplicates += 1;
                let existing = bounded(
                    "find_open_alert",
                    limit,
                    self.alerts.find_open_alert(visit.id, alert_type),
                )
                .await?;
                if let Some(existing) = existing {
                    self.escalate_if_needed(&existing, severity, report).await?;
                }
            }
        }

        Ok(())
    }

    async fn escalate_if_needed(
        &self,
        existing: &Alert,
        severity: Severity,
        report: &mut SweepReport,
    ) -> Result<()> {
        if existing.severity >= severity {
            return Ok(());
        }
        bounded(
            "escalate",
            self.store_timeout,
            self.alerts.escalate(existing.id, severity),
        )
        .await?;
        report.escalated += 1;
        info!(
            alert_id = %existing.id,
            from = %existing.severity,
            to = %severity,
            "Escalated alert"
        );
        Ok(())
    }
}

fn visit_message(visit: &Visit, alert_type: AlertType, verdict: &Verdict) -> String {
    match alert_type {
        AlertType::TimeExceeded => format!(
            "Visit {} by {} exceeded its allowed {} min by {} min",
            visit.id,
            visit.delegate_name,
            visit.allowed_duration_minutes.unwrap_or_default(),
            verdict.overdue_minutes
        ),
        _ => format!(
            "Visit {} by {} has not started, {} min past the grace period",
            visit.id, visit.delegate_name, verdict.overdue_minutes
        ),
    }
}

fn visit_metadata(visit: &Visit, verdict: &Verdict) -> AlertMetadata {
    AlertMetadata {
        driver: Some(visit.delegate_name.clone()),
        vehicle: None,
        location: visit.customer_address.clone(),
        extra: json!({
            "delegate_id": visit.delegate_id,
            "customer_name": visit.customer_name,
            "scheduled_start_time": visit.scheduled_start_time,
            "overdue_minutes": verdict.overdue_minutes,
        }),
    }
}

#[async_trait]
impl Sweep for VisitSweep {
    async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let visits = match bounded("open_visits", self.store_timeout, self.visits.open_visits())
            .await
        {
            Ok(visits) => visits,
            Err(e) => {
                error!(error = %e, transient = e.is_transient(), "Failed to fetch open visits");
                report.fetch_failed = true;
                return report;
            }
        };

        for visit in &visits {
            report.scanned += 1;
            if let Err(e) = self.process_visit(visit, now, &mut report).await {
                warn!(visit_id = %visit.id, error = %e, "Visit skipped this cycle");
                report.record_failure(&e);
            }
        }

        report
    }
}

/// Raises one alert per unread representative message.
pub struct MessageSweep {
    messages: Arc<dyn MessageStore>,
    alerts: Arc<dyn AlertStore>,
    config: MonitorConfig,
    store_timeout: Duration,
}

impl MessageSweep {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        alerts: Arc<dyn AlertStore>,
        config: MonitorConfig,
        store_timeout: Duration,
    ) -> Self {
        Self {
            messages,
            alerts,
            config,
            store_timeout,
        }
    }

    async fn process_message(
        &self,
        message: &RepresentativeMessage,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<()> {
        let limit = self.store_timeout;
        let alert = NewAlert::new(
            AlertType::Message,
            message.priority.severity(),
            format!("{}: {}", message.delegate_name, message.subject),
        )
        .for_message(message.id)
        .with_title(format!("Message from {}", message.delegate_name))
        .with_metadata(AlertMetadata {
            driver: Some(message.delegate_name.clone()),
            extra: json!({ "priority": message.priority.as_str() }),
            ..AlertMetadata::default()
        })
        .into_alert_with_id(message.alert_id(), now);

        match bounded("insert_alert", limit, self.alerts.insert_alert(&alert)).await? {
            InsertOutcome::Inserted => {
                report.raised += 1;
                info!(alert_id = %alert.id, message_id = %message.id, "Raised message alert");
                notify(self.alerts.as_ref(), &self.config, &alert, now, limit).await;
            }
            // an earlier cycle wrote the alert but not the flag
            InsertOutcome::Duplicate => report.duplicates += 1,
        }

        bounded(
            "mark_message_alerted",
            limit,
            self.messages.mark_message_alerted(message.id),
        )
        .await
    }
}

#[async_trait]
impl Sweep for MessageSweep {
    async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let messages = match bounded(
            "pending_messages",
            self.store_timeout,
            self.messages.pending_messages(),
        )
        .await
        {
            Ok(messages) => messages,
            Err(e) => {
                error!(
                    error = %e,
                    transient = e.is_transient(),
                    "Failed to fetch pending messages"
                );
                report.fetch_failed = true;
                return report;
            }
        };

        for message in &messages {
            report.scanned += 1;
            if let Err(e) = self.process_message(message, now, &mut report).await {
                warn!(message_id = %message.id, error = %e, "Message skipped this cycle");
                report.record_failure(&e);
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{AlertFilter, MessagePriority, VisitStatus};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, h, m, 0).unwrap()
    }

    fn config() -> MonitorConfig {
        MonitorConfig {
            grace_period_minutes: 10,
            escalation_threshold_minutes: 15,
            ..MonitorConfig::default()
        }
    }

    fn visit_sweep(store: &Arc<MemoryStore>) -> VisitSweep {
        VisitSweep::new(store.clone(), store.clone(), config(), Duration::from_secs(1))
    }

    async fn open_alerts(store: &MemoryStore) -> Vec<Alert> {
        store.list_alerts(&AlertFilter::active()).await.unwrap()
    }

    #[tokio::test]
    async fn late_visit_raises_one_high_alert() {
        let store = Arc::new(MemoryStore::new());
        let visit = Visit::scheduled("Lucia", at(11, 0), 45);
        store.insert_visit(visit.clone()).await;

        let report = visit_sweep(&store).sweep(at(11, 12)).await;
        assert_eq!(report.raised, 1);
        assert_eq!(report.flagged, 1);

        let alerts = open_alerts(&store).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::LateArrival);
        assert_eq!(alerts[0].severity, Severity::High);
        assert_eq!(alerts[0].visit_id, Some(visit.id));
        assert!(alerts[0].message.contains(&visit.id.to_string()));
        assert!(alerts[0].message.contains("Lucia"));
        assert!(store.visit(visit.id).await.unwrap().is_late);

        // polled again before resolution
        let report = visit_sweep(&store).sweep(at(11, 20)).await;
        assert_eq!(report.raised, 0);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.flagged, 0);
        assert_eq!(open_alerts(&store).await.len(), 1);
    }

    #[tokio::test]
    async fn repeated_sweeps_are_idempotent_without_store_constraint() {
        let store = Arc::new(MemoryStore::without_unique_constraint());
        for name in ["Lucia", "Tomas", "Irene"] {
            store.insert_visit(Visit::scheduled(name, at(9, 0), 30)).await;
        }
        store
            .insert_visit(Visit::scheduled("Pedro", at(9, 0), 30).started_at(at(9, 0)))
            .await;

        let sweep = visit_sweep(&store);
        let first = sweep.sweep(at(9, 40)).await;
        let second = sweep.sweep(at(9, 41)).await;

        assert_eq!(first.raised, 4);
        assert_eq!(second.raised, 0);
        assert_eq!(second.duplicates, 4);

        let alerts = open_alerts(&store).await;
        assert_eq!(alerts.len(), 4);
        let mut keys: Vec<_> = alerts.iter().map(|a| (a.visit_id, a.alert_type)).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 4);
    }

    #[tokio::test]
    async fn overrunning_visit_raises_time_exceeded() {
        let store = Arc::new(MemoryStore::new());
        let visit = Visit::scheduled("Pablo", at(10, 0), 60).started_at(at(10, 0));
        store.insert_visit(visit.clone()).await;

        let report = visit_sweep(&store).sweep(at(11, 5)).await;
        assert_eq!(report.raised, 1);

        let stored = store.visit(visit.id).await.unwrap();
        assert!(stored.exceeds_time_limit);
        assert!(!stored.is_late);

        let alerts = open_alerts(&store).await;
        assert_eq!(alerts[0].alert_type, AlertType::TimeExceeded);
    }

    #[tokio::test]
    async fn escalates_existing_alert_instead_of_duplicating() {
        for store in [MemoryStore::new(), MemoryStore::without_unique_constraint()] {
            let store = Arc::new(store);
            store.insert_visit(Visit::scheduled("Lucia", at(11, 0), 45)).await;
            let sweep = visit_sweep(&store);

            sweep.sweep(at(11, 12)).await;
            let report = sweep.sweep(at(11, 40)).await;
            assert_eq!(report.escalated, 1);
            assert_eq!(report.raised, 0);

            let alerts = open_alerts(&store).await;
            assert_eq!(alerts.len(), 1);
            assert_eq!(alerts[0].severity, Severity::Critical);

            // no further change once critical
            assert_eq!(sweep.sweep(at(12, 0)).await.escalated, 0);
        }
    }

    #[tokio::test]
    async fn resolved_alert_allows_a_new_one() {
        let store = Arc::new(MemoryStore::new());
        store.insert_visit(Visit::scheduled("Lucia", at(11, 0), 45)).await;
        let sweep = visit_sweep(&store);

        sweep.sweep(at(11, 12)).await;
        let first = open_alerts(&store).await.remove(0);
        store.resolve(first.id, "dispatcher", at(11, 15)).await.unwrap();

        assert_eq!(sweep.sweep(at(11, 30)).await.raised, 1);
        let all = store.list_alerts(&AlertFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|a| a.id == first.id && a.is_resolved));
    }

    #[tokio::test]
    async fn late_only_sweep_leaves_duration_alone() {
        let store = Arc::new(MemoryStore::new());
        let running = Visit::scheduled("Pablo", at(10, 0), 60).started_at(at(10, 0));
        store.insert_visit(running.clone()).await;

        let report = visit_sweep(&store)
            .raising(&[AlertType::LateArrival])
            .sweep(at(12, 0))
            .await;

        assert_eq!(report.raised, 0);
        assert!(!store.visit(running.id).await.unwrap().exceeds_time_limit);
    }

    #[tokio::test]
    async fn malformed_visit_does_not_stop_the_batch() {
        let store = Arc::new(MemoryStore::new());
        let mut broken = Visit::scheduled("Nadie", at(8, 0), 30);
        broken.scheduled_start_time = None;
        store.insert_visit(broken).await;
        store.insert_visit(Visit::scheduled("Lucia", at(8, 0), 30)).await;

        let report = visit_sweep(&store).sweep(at(9, 0)).await;
        assert_eq!(report.scanned, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.raised, 1);
    }

    /// Fails flag writes for one visit id.
    struct FlakyVisits {
        inner: Arc<MemoryStore>,
        poisoned: Uuid,
    }

    #[async_trait]
    impl VisitStore for FlakyVisits {
        async fn open_visits(&self) -> Result<Vec<Visit>> {
            self.inner.open_visits().await
        }

        async fn set_visit_flags(&self, id: Uuid, is_late: bool, exceeds: bool) -> Result<()> {
            if id == self.poisoned {
                return Err(Error::Timeout {
                    operation: "set_visit_flags",
                    elapsed: Duration::from_secs(1),
                });
            }
            self.inner.set_visit_flags(id, is_late, exceeds).await
        }
    }

    #[tokio::test]
    async fn write_failure_on_one_visit_is_counted_and_skipped() {
        let store = Arc::new(MemoryStore::new());
        let bad = Visit::scheduled("Lucia", at(8, 0), 30);
        let good = Visit::scheduled("Tomas", at(8, 0), 30);
        store.insert_visit(bad.clone()).await;
        store.insert_visit(good.clone()).await;

        let visits = Arc::new(FlakyVisits {
            inner: store.clone(),
            poisoned: bad.id,
        });
        let sweep = VisitSweep::new(visits, store.clone(), config(), Duration::from_secs(1));

        let report = sweep.sweep(at(9, 0)).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.raised, 2);
        assert!(store.visit(good.id).await.unwrap().is_late);
        assert!(!store.visit(bad.id).await.unwrap().is_late);
    }

    /// Hangs on flag writes for one visit id.
    struct StalledVisits {
        inner: Arc<MemoryStore>,
        stalled: Uuid,
    }

    #[async_trait]
    impl VisitStore for StalledVisits {
        async fn open_visits(&self) -> Result<Vec<Visit>> {
            self.inner.open_visits().await
        }

        async fn set_visit_flags(&self, id: Uuid, is_late: bool, exceeds: bool) -> Result<()> {
            if id == self.stalled {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.inner.set_visit_flags(id, is_late, exceeds).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_call_times_out_and_batch_continues() {
        let store = Arc::new(MemoryStore::new());
        let stalled = Visit::scheduled("Lucia", at(8, 0), 30);
        let good = Visit::scheduled("Tomas", at(8, 0), 30);
        store.insert_visit(stalled.clone()).await;
        store.insert_visit(good.clone()).await;

        let visits = Arc::new(StalledVisits {
            inner: store.clone(),
            stalled: stalled.id,
        });
        let sweep = VisitSweep::new(visits, store.clone(), config(), Duration::from_millis(50));

        let report = sweep.sweep(at(9, 0)).await;
        assert_eq!(report.scanned, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.raised, 2);
        assert_eq!(report.flagged, 1);
        assert!(!store.visit(stalled.id).await.unwrap().is_late);
        assert!(store.visit(good.id).await.unwrap().is_late);
    }

    #[tokio::test]
    async fn out_of_range_thresholds_skip_visits() {
        let store = Arc::new(MemoryStore::new());
        store.insert_visit(Visit::scheduled("Lucia", at(8, 0), 30)).await;
        store
            .insert_visit(Visit::scheduled("Pablo", at(8, 0), 30).started_at(at(8, 0)))
            .await;
        let cfg = MonitorConfig {
            grace_period_minutes: i64::MAX,
            escalation_threshold_minutes: i64::MAX,
            ..config()
        };
        let sweep = VisitSweep::new(store.clone(), store.clone(), cfg, Duration::from_secs(1));

        let report = sweep.sweep(at(9, 0)).await;
        assert_eq!(report.scanned, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.raised, 0);
        assert!(open_alerts(&store).await.is_empty());
    }

    #[tokio::test]
    async fn visit_started_between_cycles_is_checked_for_overrun() {
        let store = Arc::new(MemoryStore::new());
        let visit = Visit::scheduled("Lucia", at(8, 0), 30);
        store.insert_visit(visit.clone()).await;
        let sweep = visit_sweep(&store);

        assert_eq!(sweep.sweep(at(8, 20)).await.raised, 1);

        // operator marks the visit started
        let started = store.visit(visit.id).await.unwrap().started_at(at(8, 25));
        store.update_visit(started).await.unwrap();

        let report = sweep.sweep(at(9, 0)).await;
        assert_eq!(report.raised, 1);
        assert_eq!(report.flagged, 1);

        let stored = store.visit(visit.id).await.unwrap();
        assert!(stored.is_late);
        assert!(stored.exceeds_time_limit);

        let mut types: Vec<_> = open_alerts(&store).await.iter().map(|a| a.alert_type).collect();
        types.sort();
        assert_eq!(types, vec![AlertType::LateArrival, AlertType::TimeExceeded]);
    }

    struct DownVisits;

    #[async_trait]
    impl VisitStore for DownVisits {
        async fn open_visits(&self) -> Result<Vec<Visit>> {
            Err(Error::Timeout {
                operation: "open_visits",
                elapsed: Duration::from_secs(1),
            })
        }

        async fn set_visit_flags(&self, _: Uuid, _: bool, _: bool) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn fetch_failure_ends_cycle_quietly() {
        let store = Arc::new(MemoryStore::new());
        let sweep = VisitSweep::new(Arc::new(DownVisits), store, config(), Duration::from_secs(1));
        let report = sweep.sweep(at(9, 0)).await;
        assert!(report.fetch_failed);
        assert_eq!(report.scanned, 0);
    }

    #[tokio::test]
    async fn terminal_visits_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        let mut visit = Visit::scheduled("Lucia", at(8, 0), 30);
        visit.status = VisitStatus::Cancelled;
        store.insert_visit(visit).await;

        let report = visit_sweep(&store).sweep(at(12, 0)).await;
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn new_alerts_queue_notifications() {
        let store = Arc::new(MemoryStore::new());
        store.insert_visit(Visit::scheduled("Lucia", at(8, 0), 30)).await;
        let cfg = MonitorConfig {
            notify_supervisors: false,
            email_enabled: true,
            ..config()
        };
        let sweep = VisitSweep::new(store.clone(), store.clone(), cfg, Duration::from_secs(1));

        sweep.sweep(at(9, 0)).await;
        sweep.sweep(at(9, 1)).await;

        // admins x (in_app, email), only for the first raise
        assert_eq!(store.notifications().await.len(), 2);
    }

    #[tokio::test]
    async fn each_message_raises_exactly_one_alert() {
        let store = Arc::new(MemoryStore::new());
        let urgent = RepresentativeMessage::new(
            "Rosa",
            "Truck broke down",
            MessagePriority::Urgent,
            at(9, 0),
        );
        let normal = RepresentativeMessage::new(
            "Rosa",
            "Running low on forms",
            MessagePriority::Normal,
            at(9, 5),
        );
        store.insert_message(urgent.clone()).await;
        store.insert_message(normal.clone()).await;

        let sweep =
            MessageSweep::new(store.clone(), store.clone(), config(), Duration::from_secs(1));
        let report = sweep.sweep(at(9, 10)).await;
        assert_eq!(report.raised, 2);
        assert!(store.message(urgent.id).await.unwrap().alert_raised);

        let again = sweep.sweep(at(9, 11)).await;
        assert_eq!(again.scanned, 0);

        let alerts = store.list_alerts(&AlertFilter::default()).await.unwrap();
        assert_eq!(alerts.len(), 2);
        let urgent_alert = alerts.iter().find(|a| a.message_id == Some(urgent.id)).unwrap();
        assert_eq!(urgent_alert.severity, Severity::Critical);
        assert_eq!(urgent_alert.alert_type, AlertType::Message);
        assert!(urgent_alert.message.contains("Truck broke down"));
        assert_eq!(urgent_alert.title, "Message from Rosa");
    }

    /// Accepts the alert but never manages to set the message flag.
    struct StickyMessages(Arc<MemoryStore>);

    #[async_trait]
    impl MessageStore for StickyMessages {
        async fn pending_messages(&self) -> Result<Vec<RepresentativeMessage>> {
            self.0.pending_messages().await
        }

        async fn mark_message_alerted(&self, id: Uuid) -> Result<()> {
            Err(Error::not_found("message", id))
        }
    }

    #[tokio::test]
    async fn message_alert_is_not_duplicated_when_flag_write_fails() {
        let store = Arc::new(MemoryStore::new());
        let message =
            RepresentativeMessage::new("Rosa", "Gate closed", MessagePriority::High, at(9, 0));
        store.insert_message(message).await;
        let sweep = MessageSweep::new(
            Arc::new(StickyMessages(store.clone())),
            store.clone(),
            config(),
            Duration::from_secs(1),
        );

        assert_eq!(sweep.sweep(at(9, 1)).await.failed, 1);
        let second = sweep.sweep(at(9, 2)).await;
        assert_eq!(second.raised, 0);
        assert_eq!(second.duplicates, 1);
        assert_eq!(store.list_alerts(&AlertFilter::default()).await.unwrap().len(), 1);
    }
}
