//! Lateness evaluation for a single visit.
//!
//! Pure function of the visit, the clock and two thresholds. Overdue time is
//! measured past the deadline: `scheduled_start + grace` for arrivals,
//! `actual_start + allowed_duration` for running visits.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{Severity, Visit, VisitStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub is_late: bool,
    pub exceeds_time_limit: bool,
    pub severity: Option<Severity>,
    pub overdue_minutes: i64,
}

impl Verdict {
    const ON_TIME: Verdict = Verdict {
        is_late: false,
        exceeds_time_limit: false,
        severity: None,
        overdue_minutes: 0,
    };

    pub fn is_positive(&self) -> bool {
        self.is_late || self.exceeds_time_limit
    }
}

pub fn evaluate(
    visit: &Visit,
    now: DateTime<Utc>,
    grace_period_minutes: i64,
    escalation_threshold_minutes: i64,
) -> Result<Verdict> {
    let escalation = minutes(visit, escalation_threshold_minutes, "escalation threshold")?;

    match (visit.actual_start_time, visit.actual_end_time) {
        // finished, nothing to watch
        (Some(_), Some(_)) => Ok(Verdict::ON_TIME),
        (Some(started), None) => {
            let allowed = match visit.allowed_duration_minutes {
                Some(m) if m > 0 => m,
                _ => {
                    return Err(Error::validation(
                        "visit",
                        visit.id,
                        "started visit has no positive allowed duration",
                    ))
                }
            };
            let deadline = offset(visit, started, i64::from(allowed), "allowed duration")?;
            Ok(overdue_verdict(now, deadline, escalation)
                .map(|(severity, overdue_minutes)| Verdict {
                    exceeds_time_limit: true,
                    severity: Some(severity),
                    overdue_minutes,
                    ..Verdict::ON_TIME
                })
                .unwrap_or(Verdict::ON_TIME))
        }
        (None, _) => {
            if visit.status != VisitStatus::Scheduled {
                return Ok(Verdict::ON_TIME);
            }
            let scheduled = visit.scheduled_start_time.ok_or_else(|| {
                Error::validation("visit", visit.id, "scheduled visit has no scheduled start")
            })?;
            let deadline = offset(visit, scheduled, grace_period_minutes, "grace period")?;
            Ok(overdue_verdict(now, deadline, escalation)
                .map(|(severity, overdue_minutes)| Verdict {
                    is_late: true,
                    severity: Some(severity),
                    overdue_minutes,
                    ..Verdict::ON_TIME
                })
                .unwrap_or(Verdict::ON_TIME))
        }
    }
}

fn minutes(visit: &Visit, value: i64, what: &str) -> Result<Duration> {
    Duration::try_minutes(value).ok_or_else(|| {
        Error::validation("visit", visit.id, format!("{what} of {value} min is out of range"))
    })
}

/// `from + value` minutes, or a validation error when the instant is unrepresentable.
fn offset(visit: &Visit, from: DateTime<Utc>, value: i64, what: &str) -> Result<DateTime<Utc>> {
    from.checked_add_signed(minutes(visit, value, what)?).ok_or_else(|| {
        Error::validation("visit", visit.id, format!("{what} of {value} min overflows"))
    })
}

/// Severity and whole minutes overdue, or `None` when `now` has not passed `deadline`.
fn overdue_verdict(
    now: DateTime<Utc>,
    deadline: DateTime<Utc>,
    escalation: Duration,
) -> Option<(Severity, i64)> {
    if now <= deadline {
        return None;
    }
    let overdue = now - deadline;
    let severity = if overdue > escalation {
        Severity::Critical
    } else {
        Severity::High
    };
    Some((severity, overdue.num_minutes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, h, m, 0).unwrap()
    }

    #[test]
    fn late_once_grace_period_has_passed() {
        let visit = Visit::scheduled("Marta", at(11, 0), 45);

        let v = evaluate(&visit, at(11, 12), 10, 15).unwrap();
        assert!(v.is_late);
        assert!(!v.exceeds_time_limit);
        assert_eq!(v.severity, Some(Severity::High));
        assert_eq!(v.overdue_minutes, 2);
    }

    #[test]
    fn grace_boundary_is_not_late() {
        let visit = Visit::scheduled("Marta", at(11, 0), 45);
        let v = evaluate(&visit, at(11, 10), 10, 15).unwrap();
        assert_eq!(v, Verdict::ON_TIME);
        assert!(!v.is_positive());
    }

    #[test]
    fn escalates_to_critical_past_threshold() {
        let visit = Visit::scheduled("Marta", at(11, 0), 45);
        // deadline 11:10, 15 minutes past is still high, 16 is critical
        assert_eq!(
            evaluate(&visit, at(11, 25), 10, 15).unwrap().severity,
            Some(Severity::High)
        );
        assert_eq!(
            evaluate(&visit, at(11, 26), 10, 15).unwrap().severity,
            Some(Severity::Critical)
        );
    }

    #[test]
    fn any_late_scheduled_visit_is_flagged() {
        for grace in [0, 5, 10, 30, 90] {
            for extra in [1, 7, 60, 600] {
                let visit = Visit::scheduled("Marta", at(8, 0), 30);
                let now = at(8, 0) + Duration::minutes(grace + extra);
                assert!(evaluate(&visit, now, grace, 15).unwrap().is_late);
            }
        }
    }

    #[test]
    fn only_scheduled_status_can_be_late() {
        let mut visit = Visit::scheduled("Marta", at(11, 0), 45);
        visit.status = VisitStatus::Late;
        assert!(!evaluate(&visit, at(12, 0), 10, 15).unwrap().is_late);
    }

    #[test]
    fn started_visit_exceeds_allowed_duration() {
        let visit = Visit::scheduled("Pablo", at(10, 0), 60).started_at(at(10, 0));

        let v = evaluate(&visit, at(11, 5), 10, 15).unwrap();
        assert!(v.exceeds_time_limit);
        assert!(!v.is_late);
        assert_eq!(v.severity, Some(Severity::High));

        let v = evaluate(&visit, at(11, 30), 10, 15).unwrap();
        assert_eq!(v.severity, Some(Severity::Critical));

        assert!(!evaluate(&visit, at(10, 59), 10, 15).unwrap().is_positive());
    }

    #[test]
    fn any_overrunning_visit_is_flagged() {
        for allowed in [15, 30, 60, 120] {
            for extra in [1, 10, 240] {
                let visit = Visit::scheduled("Pablo", at(7, 0), allowed).started_at(at(7, 0));
                let now = at(7, 0) + Duration::minutes(i64::from(allowed) + extra);
                assert!(evaluate(&visit, now, 10, 15).unwrap().exceeds_time_limit);
            }
        }
    }

    #[test]
    fn finished_visit_is_never_flagged() {
        let mut visit = Visit::scheduled("Pablo", at(10, 0), 60).started_at(at(10, 0));
        visit.actual_end_time = Some(at(12, 0));
        assert_eq!(evaluate(&visit, at(13, 0), 10, 15).unwrap(), Verdict::ON_TIME);
    }

    #[test]
    fn malformed_visits_fail_validation() {
        let mut visit = Visit::scheduled("Marta", at(11, 0), 45);
        visit.scheduled_start_time = None;
        let err = evaluate(&visit, at(12, 0), 10, 15).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let mut visit = Visit::scheduled("Marta", at(11, 0), 45).started_at(at(11, 0));
        visit.allowed_duration_minutes = Some(0);
        assert!(evaluate(&visit, at(12, 0), 10, 15).is_err());
    }

    #[test]
    fn out_of_range_thresholds_fail_validation() {
        let visit = Visit::scheduled("Marta", at(11, 0), 45);

        let err = evaluate(&visit, at(12, 0), 10, i64::MAX).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let err = evaluate(&visit, at(12, 0), 1_000_000_000_000, 15).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let err = evaluate(&visit, at(12, 0), i64::MIN, 15).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
