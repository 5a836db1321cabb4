pub const CREATE_ALERTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS alerts (
    alert_id uuid PRIMARY KEY,
    alert_type text NOT NULL,
    severity text NOT NULL,
    title text NOT NULL,
    message text NOT NULL,
    visit_id uuid NULL,
    message_id uuid NULL,
    is_read boolean NOT NULL DEFAULT false,
    is_resolved boolean NOT NULL DEFAULT false,
    resolved_by text NULL,
    resolved_at timestamptz NULL,
    created_at timestamptz NOT NULL DEFAULT NOW(),
    metadata jsonb NULL
);
"#;

pub const CREATE_NOTIFICATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS alert_notifications (
    notification_id uuid PRIMARY KEY,
    alert_id uuid NOT NULL,
    audience text NOT NULL,
    channel text NOT NULL,
    created_at timestamptz NOT NULL,
    delivered_at timestamptz NULL
);
"#;

/// At most one unresolved alert per (visit, type).
pub const CREATE_OPEN_ALERT_UNIQUE_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS alerts_one_open_per_visit_type
ON alerts (visit_id, alert_type)
WHERE is_resolved = false AND visit_id IS NOT NULL;
"#;

const ALERT_COLUMNS: &str = "alert_id, alert_type, severity, title, message, visit_id, message_id, \
     is_read, is_resolved, resolved_by, resolved_at, created_at, metadata";

pub const INSERT_ALERT: &str = r#"
INSERT INTO alerts (
    alert_id, alert_type, severity, title, message, visit_id, message_id,
    is_read, is_resolved, resolved_by, resolved_at, created_at, metadata
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
ON CONFLICT DO NOTHING;
"#;

pub fn select_open_alert_for_visit() -> String {
    format!(
        "SELECT {ALERT_COLUMNS} FROM alerts \
         WHERE visit_id = $1 AND alert_type = $2 AND is_resolved = false \
         ORDER BY created_at DESC LIMIT 1"
    )
}

pub fn select_alert_by_id() -> String {
    format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE alert_id = $1")
}

pub fn select_alerts_filtered() -> String {
    format!(
        "SELECT {ALERT_COLUMNS} FROM alerts \
         WHERE ($1::bool IS NULL OR is_resolved = $1) \
           AND ($2::bool IS NULL OR is_read = $2) \
           AND ($3::text IS NULL OR severity = $3) \
           AND ($4::text IS NULL OR alert_type = $4) \
           AND ($5::uuid IS NULL OR visit_id = $5) \
           AND ($6::timestamptz IS NULL OR created_at >= $6) \
           AND ($7::timestamptz IS NULL OR created_at < $7) \
         ORDER BY created_at DESC, alert_id DESC"
    )
}

pub fn update_alert_read() -> String {
    format!("UPDATE alerts SET is_read = true WHERE alert_id = $1 RETURNING {ALERT_COLUMNS}")
}

pub const UPDATE_ALL_ALERTS_READ: &str = r#"
UPDATE alerts SET is_read = true WHERE is_read = false;
"#;

/// Resolution sticks: an already resolved row keeps its resolver and time.
pub fn update_alert_resolved() -> String {
    format!(
        "UPDATE alerts \
         SET resolved_by = CASE WHEN is_resolved THEN resolved_by ELSE $2 END, \
             resolved_at = CASE WHEN is_resolved THEN resolved_at ELSE $3 END, \
             is_resolved = true \
         WHERE alert_id = $1 RETURNING {ALERT_COLUMNS}"
    )
}

pub fn update_alert_severity() -> String {
    format!("UPDATE alerts SET severity = $2 WHERE alert_id = $1 RETURNING {ALERT_COLUMNS}")
}

pub const DELETE_ALERT: &str = r#"
DELETE FROM alerts WHERE alert_id = $1;
"#;

pub const INSERT_NOTIFICATION: &str = r#"
INSERT INTO alert_notifications (notification_id, alert_id, audience, channel, created_at)
VALUES ($1, $2, $3, $4, $5);
"#;

pub const SELECT_OPEN_VISITS: &str = r#"
SELECT id, delegate_id, delegate_name, customer_id, customer_name, customer_address,
       scheduled_start_time, scheduled_end_time, actual_start_time, actual_end_time,
       allowed_duration_minutes, status, is_late, exceeds_time_limit, priority, notes
FROM visits
WHERE status NOT IN ('completed', 'cancelled')
ORDER BY scheduled_start_time ASC NULLS LAST, id ASC;
"#;

pub const UPDATE_VISIT_FLAGS: &str = r#"
UPDATE visits
SET is_late = is_late OR $2,
    exceeds_time_limit = exceeds_time_limit OR $3
WHERE id = $1;
"#;

pub const SELECT_PENDING_MESSAGES: &str = r#"
SELECT id, delegate_id, delegate_name, subject, body, priority, is_read, alert_raised, created_at
FROM representative_messages
WHERE is_read = false AND alert_raised = false
ORDER BY created_at ASC, id ASC;
"#;

pub const UPDATE_MESSAGE_ALERTED: &str = r#"
UPDATE representative_messages SET alert_raised = true WHERE id = $1;
"#;
