use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::models::Alert;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Admins,
    Supervisors,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Admins => "admins",
            Audience::Supervisors => "supervisors",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    InApp,
    Push,
    Email,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::InApp => "in_app",
            Channel::Push => "push",
            Channel::Email => "email",
        }
    }
}

/// A queued delivery request for a freshly raised alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub audience: Audience,
    pub channel: Channel,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// One notification per enabled audience and channel. In-app is always on.
    pub fn fan_out(config: &MonitorConfig, alert: &Alert, now: DateTime<Utc>) -> Vec<Self> {
        let mut audiences = Vec::with_capacity(2);
        if config.notify_admins {
            audiences.push(Audience::Admins);
        }
        if config.notify_supervisors {
            audiences.push(Audience::Supervisors);
        }

        let mut channels = vec![Channel::InApp];
        if config.push_enabled {
            channels.push(Channel::Push);
        }
        if config.email_enabled {
            channels.push(Channel::Email);
        }

        audiences
            .iter()
            .flat_map(|&audience| {
                channels.iter().map(move |&channel| Notification {
                    id: Uuid::new_v4(),
                    alert_id: alert.id,
                    audience,
                    channel,
                    created_at: now,
                })
            })
            .collect()
    }
}
