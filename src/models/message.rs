use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;
use crate::models::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl MessagePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessagePriority::Low => "low",
            MessagePriority::Normal => "normal",
            MessagePriority::High => "high",
            MessagePriority::Urgent => "urgent",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            MessagePriority::Low => Severity::Low,
            MessagePriority::Normal => Severity::Medium,
            MessagePriority::High => Severity::High,
            MessagePriority::Urgent => Severity::Critical,
        }
    }
}

impl FromStr for MessagePriority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(MessagePriority::Low),
            "normal" => Ok(MessagePriority::Normal),
            "high" => Ok(MessagePriority::High),
            "urgent" => Ok(MessagePriority::Urgent),
            other => Err(Error::Decode {
                field: "message.priority",
                value: other.to_string(),
            }),
        }
    }
}

/// A message sent by a field representative to the back office.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentativeMessage {
    pub id: Uuid,
    pub delegate_id: Uuid,
    pub delegate_name: String,
    pub subject: String,
    pub body: String,
    pub priority: MessagePriority,
    pub is_read: bool,
    pub alert_raised: bool,
    pub created_at: DateTime<Utc>,
}

impl RepresentativeMessage {
    pub fn new(
        delegate_name: impl Into<String>,
        subject: impl Into<String>,
        priority: MessagePriority,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            delegate_id: Uuid::new_v4(),
            delegate_name: delegate_name.into(),
            subject: subject.into(),
            body: String::new(),
            priority,
            is_read: false,
            alert_raised: false,
            created_at,
        }
    }

    /// Stable alert id for this message, so a re-raise collides on the primary key.
    pub fn alert_id(&self) -> Uuid {
        Uuid::new_v5(&self.id, b"representative-message-alert")
    }
}

#[derive(Debug, FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub delegate_id: Uuid,
    pub delegate_name: String,
    pub subject: String,
    pub body: String,
    pub priority: String,
    pub is_read: bool,
    pub alert_raised: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for RepresentativeMessage {
    type Error = Error;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            priority: row.priority.parse()?,
            id: row.id,
            delegate_id: row.delegate_id,
            delegate_name: row.delegate_name,
            subject: row.subject,
            body: row.body,
            is_read: row.is_read,
            alert_raised: row.alert_raised,
            created_at: row.created_at,
        })
    }
}
