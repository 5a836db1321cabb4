use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Late,
}

impl VisitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::Scheduled => "scheduled",
            VisitStatus::InProgress => "in_progress",
            VisitStatus::Completed => "completed",
            VisitStatus::Cancelled => "cancelled",
            VisitStatus::Late => "late",
        }
    }

    /// Completed and cancelled visits are never polled again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VisitStatus::Completed | VisitStatus::Cancelled)
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisitStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(VisitStatus::Scheduled),
            "in_progress" => Ok(VisitStatus::InProgress),
            "completed" => Ok(VisitStatus::Completed),
            "cancelled" => Ok(VisitStatus::Cancelled),
            "late" => Ok(VisitStatus::Late),
            other => Err(Error::Decode {
                field: "visit.status",
                value: other.to_string(),
            }),
        }
    }
}

/// A scheduled delegate-to-customer visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: Uuid,
    pub delegate_id: Uuid,
    pub delegate_name: String,
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub customer_address: Option<String>,
    pub scheduled_start_time: Option<DateTime<Utc>>,
    pub scheduled_end_time: Option<DateTime<Utc>>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub allowed_duration_minutes: Option<i32>,
    pub status: VisitStatus,
    pub is_late: bool,
    pub exceeds_time_limit: bool,
    pub priority: Option<String>,
    pub notes: Option<String>,
}

impl Visit {
    /// A bare scheduled visit; the remaining fields are filled in by the caller.
    pub fn scheduled(
        delegate_name: impl Into<String>,
        scheduled_start_time: DateTime<Utc>,
        allowed_duration_minutes: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            delegate_id: Uuid::new_v4(),
            delegate_name: delegate_name.into(),
            customer_id: None,
            customer_name: None,
            customer_address: None,
            scheduled_start_time: Some(scheduled_start_time),
            scheduled_end_time: None,
            actual_start_time: None,
            actual_end_time: None,
            allowed_duration_minutes: Some(allowed_duration_minutes),
            status: VisitStatus::Scheduled,
            is_late: false,
            exceeds_time_limit: false,
            priority: None,
            notes: None,
        }
    }

    /// Marks the visit as started at `at`.
    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.actual_start_time = Some(at);
        self.status = VisitStatus::InProgress;
        self
    }
}

#[derive(Debug, FromRow)]
pub struct VisitRow {
    pub id: Uuid,
    pub delegate_id: Uuid,
    pub delegate_name: String,
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub customer_address: Option<String>,
    pub scheduled_start_time: Option<DateTime<Utc>>,
    pub scheduled_end_time: Option<DateTime<Utc>>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub allowed_duration_minutes: Option<i32>,
    pub status: String, // enum in DB, map to String
    pub is_late: bool,
    pub exceeds_time_limit: bool,
    pub priority: Option<String>,
    pub notes: Option<String>,
}

impl TryFrom<VisitRow> for Visit {
    type Error = Error;

    fn try_from(row: VisitRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: row.status.parse()?,
            id: row.id,
            delegate_id: row.delegate_id,
            delegate_name: row.delegate_name,
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            customer_address: row.customer_address,
            scheduled_start_time: row.scheduled_start_time,
            scheduled_end_time: row.scheduled_end_time,
            actual_start_time: row.actual_start_time,
            actual_end_time: row.actual_end_time,
            allowed_duration_minutes: row.allowed_duration_minutes,
            is_late: row.is_late,
            exceeds_time_limit: row.exceeds_time_limit,
            priority: row.priority,
            notes: row.notes,
        })
    }
}
