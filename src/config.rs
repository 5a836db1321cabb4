use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for grace and escalation thresholds: one year.
pub const MAX_THRESHOLD_MINUTES: i64 = 525_600;

/// Per-monitor knobs, passed in when the monitor is built.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub grace_period_minutes: i64,
    pub escalation_threshold_minutes: i64,
    pub poll_interval_minutes: u64,
    pub notify_admins: bool,
    pub notify_supervisors: bool,
    pub push_enabled: bool,
    pub email_enabled: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_period_minutes: 10,
            escalation_threshold_minutes: 15,
            poll_interval_minutes: 1,
            notify_admins: true,
            notify_supervisors: true,
            push_enabled: false,
            email_enabled: false,
        }
    }
}

impl MonitorConfig {
    /// Reads `<PREFIX>_GRACE_MINUTES`, `<PREFIX>_POLL_MINUTES`, ... falling back to `defaults`.
    pub fn from_env(prefix: &str, defaults: MonitorConfig) -> Self {
        let key = |name: &str| format!("{}_{}", prefix, name);

        Self {
            enabled: env_or(&key("ENABLED"), defaults.enabled),
            grace_period_minutes: env_or(&key("GRACE_MINUTES"), defaults.grace_period_minutes)
                .clamp(0, MAX_THRESHOLD_MINUTES),
            escalation_threshold_minutes: env_or(
                &key("ESCALATION_MINUTES"),
                defaults.escalation_threshold_minutes,
            )
            .clamp(0, MAX_THRESHOLD_MINUTES),
            // a zero period would spin; clamp to one minute
            poll_interval_minutes: env_or(&key("POLL_MINUTES"), defaults.poll_interval_minutes)
                .max(1),
            notify_admins: env_or(&key("NOTIFY_ADMINS"), defaults.notify_admins),
            notify_supervisors: env_or(&key("NOTIFY_SUPERVISORS"), defaults.notify_supervisors),
            push_enabled: env_or(&key("PUSH_ENABLED"), defaults.push_enabled),
            email_enabled: env_or(&key("EMAIL_ENABLED"), defaults.email_enabled),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes * 60)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub store_timeout_secs: u64,
    pub log_level: String,
    pub late_visits: MonitorConfig,
    pub visit_sync: MonitorConfig,
    pub messages: MonitorConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let db_host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
        let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
        let db_name = env::var("DB_DATABASE").unwrap_or_else(|_| "delivery_ops".to_string());
        let db_user = env::var("DB_USER").unwrap_or_else(|_| "delivery".to_string());
        let db_pwd = env::var("DB_PWD").unwrap_or_else(|_| "delivery".to_string());

        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            db_user, db_pwd, db_host, db_port, db_name
        );

        let db_max_connections = env_or("DB_MAX_CONNECTIONS", 10);
        let store_timeout_secs = env_or("STORE_TIMEOUT_SECS", 10u64).max(1);
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let late_visits = MonitorConfig::from_env("LATE_VISITS", MonitorConfig::default());
        let visit_sync = MonitorConfig::from_env(
            "VISIT_SYNC",
            MonitorConfig {
                poll_interval_minutes: 5,
                ..MonitorConfig::default()
            },
        );
        let messages = MonitorConfig::from_env(
            "MESSAGES",
            MonitorConfig {
                notify_supervisors: false,
                ..MonitorConfig::default()
            },
        );

        Ok(Self {
            database_url,
            db_max_connections,
            store_timeout_secs,
            log_level,
            late_visits,
            visit_sync,
            messages,
        })
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

/// Parses an env var, keeping `default` when it is unset or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
