use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(Error::Decode {
                field: "alert.severity",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    LateArrival,
    TimeExceeded,
    System,
    Message,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::LateArrival => "late_arrival",
            AlertType::TimeExceeded => "time_exceeded",
            AlertType::System => "system",
            AlertType::Message => "message",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AlertType::LateArrival => "Late arrival",
            AlertType::TimeExceeded => "Visit time exceeded",
            AlertType::System => "System alert",
            AlertType::Message => "Representative message",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "late_arrival" => Ok(AlertType::LateArrival),
            "time_exceeded" => Ok(AlertType::TimeExceeded),
            "system" => Ok(AlertType::System),
            "message" => Ok(AlertType::Message),
            other => Err(Error::Decode {
                field: "alert.alert_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Optional context attached to an alert for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub extra: Value,
}

/// One notification instance.
///
/// `is_read` and `is_resolved` are independent: an alert can be resolved while
/// still unread. Nothing ever flips `is_resolved` back to false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub visit_id: Option<Uuid>,
    pub message_id: Option<Uuid>,
    pub is_read: bool,
    pub is_resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<AlertMetadata>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        !self.is_resolved
    }

    pub fn mark_read(&mut self) {
        self.is_read = true;
    }

    /// Resolves the alert once; a second call keeps the first resolver and time.
    pub fn resolve(&mut self, resolver: &str, at: DateTime<Utc>) {
        if self.is_resolved {
            return;
        }
        self.is_resolved = true;
        self.resolved_by = Some(resolver.to_string());
        self.resolved_at = Some(at);
    }
}

/// Input for creating an alert, from a monitor or an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub visit_id: Option<Uuid>,
    #[serde(default)]
    pub message_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: Option<AlertMetadata>,
}

impl NewAlert {
    pub fn new(alert_type: AlertType, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            alert_type,
            severity,
            message: message.into(),
            title: None,
            visit_id: None,
            message_id: None,
            metadata: None,
        }
    }

    pub fn for_visit(mut self, visit_id: Uuid) -> Self {
        self.visit_id = Some(visit_id);
        self
    }

    pub fn for_message(mut self, message_id: Uuid) -> Self {
        self.message_id = Some(message_id);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_metadata(mut self, metadata: AlertMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Builds the stored alert with a fresh id.
    pub fn into_alert(self, created_at: DateTime<Utc>) -> Alert {
        self.into_alert_with_id(Uuid::new_v4(), created_at)
    }

    pub fn into_alert_with_id(self, id: Uuid, created_at: DateTime<Utc>) -> Alert {
        Alert {
            id,
            title: self
                .title
                .unwrap_or_else(|| self.alert_type.title().to_string()),
            alert_type: self.alert_type,
            severity: self.severity,
            message: self.message,
            visit_id: self.visit_id,
            message_id: self.message_id,
            is_read: false,
            is_resolved: false,
            resolved_by: None,
            resolved_at: None,
            created_at,
            metadata: self.metadata,
        }
    }
}

/// Listing filter; `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertFilter {
    pub resolved: Option<bool>,
    pub read: Option<bool>,
    pub severity: Option<Severity>,
    pub alert_type: Option<AlertType>,
    pub visit_id: Option<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_until: Option<DateTime<Utc>>,
}

impl AlertFilter {
    pub fn active() -> Self {
        Self {
            resolved: Some(false),
            ..Self::default()
        }
    }

    pub fn resolved() -> Self {
        Self {
            resolved: Some(true),
            ..Self::default()
        }
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        self.resolved.map_or(true, |r| alert.is_resolved == r)
            && self.read.map_or(true, |r| alert.is_read == r)
            && self.severity.map_or(true, |s| alert.severity == s)
            && self.alert_type.map_or(true, |t| alert.alert_type == t)
            && self.visit_id.map_or(true, |v| alert.visit_id == Some(v))
            && self.created_from.map_or(true, |from| alert.created_at >= from)
            && self.created_until.map_or(true, |until| alert.created_at < until)
    }
}

#[derive(Debug, FromRow)]
pub struct AlertRow {
    pub alert_id: Uuid,
    pub alert_type: String, // enum in DB, map to String
    pub severity: String,
    pub title: String,
    pub message: String,
    pub visit_id: Option<Uuid>,
    pub message_id: Option<Uuid>,
    pub is_read: bool,
    pub is_resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<Json<AlertMetadata>>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = Error;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.alert_id,
            alert_type: row.alert_type.parse()?,
            severity: row.severity.parse()?,
            title: row.title,
            message: row.message,
            visit_id: row.visit_id,
            message_id: row.message_id,
            is_read: row.is_read,
            is_resolved: row.is_resolved,
            resolved_by: row.resolved_by,
            resolved_at: row.resolved_at,
            created_at: row.created_at,
            metadata: row.metadata.map(|Json(m)| m),
        })
    }
}
