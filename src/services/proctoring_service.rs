use crate::error::{Error, Result};
use crate::models::session_report::{SessionReport, ViolationKind};
use crate::utils::clock::{Clock, SystemClock};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ProctoringEvent {
    pub attempt_id: Uuid,
    pub kind: ViolationKind,
    pub count: i32,
}

/// Producer side of the event queue. Detection traffic is fire-and-forget:
/// a full queue drops the event with a warning instead of blocking the
/// request path.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ProctoringEvent>,
}

impl EventSink {
    pub fn push(&self, event: ProctoringEvent) {
        if let Err(err) = self.tx.try_send(event) {
            tracing::warn!(error = %err, "proctoring event dropped, queue full or closed");
        }
    }
}

pub fn event_channel(capacity: usize) -> (EventSink, mpsc::Receiver<ProctoringEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSink { tx }, rx)
}

/// Thresholds above which a session stops counting as a valid test.
#[derive(Debug, Clone, Copy)]
pub struct ValidityPolicy {
    pub tab_switch_limit: i32,
    pub window_switch_limit: i32,
    pub face_visibility_limit: i32,
}

impl Default for ValidityPolicy {
    fn default() -> Self {
        Self {
            tab_switch_limit: 3,
            window_switch_limit: 3,
            face_visibility_limit: 5,
        }
    }
}

impl ValidityPolicy {
    /// Any detected second person or mobile device invalidates outright;
    /// the remaining counters invalidate only past their limits.
    pub fn judge(&self, report: &SessionReport) -> (bool, Option<String>) {
        let mut reasons = Vec::new();

        if report.multiple_people > 0 {
            reasons.push(format!(
                "multiple people detected {} time(s)",
                report.multiple_people
            ));
        }
        if report.mobile_detected > 0 {
            reasons.push(format!(
                "a mobile device was detected {} time(s)",
                report.mobile_detected
            ));
        }
        if report.tab_switches > self.tab_switch_limit {
            reasons.push(format!(
                "tab switches exceeded the limit ({} > {})",
                report.tab_switches, self.tab_switch_limit
            ));
        }
        if report.window_switches > self.window_switch_limit {
            reasons.push(format!(
                "window switches exceeded the limit ({} > {})",
                report.window_switches, self.window_switch_limit
            ));
        }
        if report.face_visibility_issues > self.face_visibility_limit {
            reasons.push(format!(
                "face visibility issues exceeded the limit ({} > {})",
                report.face_visibility_issues, self.face_visibility_limit
            ));
        }

        if reasons.is_empty() {
            (true, None)
        } else {
            (false, Some(reasons.join("; ")))
        }
    }
}

/// What a session lookup can come back with. A non-proctored test is an
/// informational outcome, not an error.
#[derive(Debug, Clone)]
pub enum SessionView {
    NotProctored,
    Report(SessionReport),
}

#[derive(Clone)]
pub struct ProctoringService {
    pool: PgPool,
    policy: ValidityPolicy,
    clock: Arc<dyn Clock>,
}

impl ProctoringService {
    pub fn new(pool: PgPool, policy: ValidityPolicy) -> Self {
        Self {
            pool,
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    /// Adds one counter increment. The report row is created lazily on
    /// the first event; the increment is a single statement, so rapid
    /// concurrent events never lose counts.
    pub async fn record_event(&self, event: &ProctoringEvent) -> Result<SessionReport> {
        if event.count < 1 {
            return Err(Error::Validation(
                "Event count must be at least 1".to_string(),
            ));
        }

        let state = sqlx::query_as::<_, (bool, bool)>(
            r#"
            SELECT a.completed, t.proctored
            FROM attempts a JOIN tests t ON a.test_id = t.id
            WHERE a.id = $1
            "#,
        )
        .bind(event.attempt_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((completed, proctored)) = state else {
            return Err(Error::NotFound("Attempt not found".to_string()));
        };
        if !proctored {
            return Err(Error::Validation(
                "This test is not proctored; events are not accepted".to_string(),
            ));
        }
        if completed {
            return Err(Error::InvalidState(
                "The session has ended; events are no longer accepted".to_string(),
            ));
        }

        let column = event.kind.column();
        let sql = format!(
            r#"
            INSERT INTO session_reports (attempt_id, {column}, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (attempt_id) DO UPDATE
            SET {column} = session_reports.{column} + EXCLUDED.{column}
            WHERE session_reports.finalized = FALSE
            RETURNING *
            "#
        );

        let report = sqlx::query_as::<_, SessionReport>(&sql)
            .bind(event.attempt_id)
            .bind(event.count)
            .bind(self.clock.now())
            .fetch_optional(&self.pool)
            .await?;

        report.ok_or_else(|| {
            Error::InvalidState("The session report is finalized".to_string())
        })
    }

    /// Freezes the report and stamps the verdict. Idempotent: a report
    /// that is already frozen comes back unchanged. Returns None when the
    /// session never produced an event.
    pub async fn finalize(&self, attempt_id: Uuid) -> Result<Option<SessionReport>> {
        let Some(report) = self.get_report(attempt_id).await? else {
            return Ok(None);
        };
        if report.finalized {
            return Ok(Some(report));
        }

        let (is_valid, invalid_reason) = self.policy.judge(&report);
        let frozen = sqlx::query_as::<_, SessionReport>(
            r#"
            UPDATE session_reports
            SET finalized = TRUE, is_valid = $2, invalid_reason = $3, finalized_at = $4
            WHERE attempt_id = $1
            RETURNING *
            "#,
        )
        .bind(attempt_id)
        .bind(is_valid)
        .bind(invalid_reason)
        .bind(self.clock.now())
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(frozen))
    }

    pub async fn get_report(&self, attempt_id: Uuid) -> Result<Option<SessionReport>> {
        let report = sqlx::query_as::<_, SessionReport>(
            r#"SELECT * FROM session_reports WHERE attempt_id = $1"#,
        )
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(report)
    }

    /// Session view for an attempt the caller already owns. Proctored
    /// attempts with no events yet show a zeroed report; after submission
    /// that zeroed report reads as finalized and vacuously valid.
    pub async fn get_session_view(
        &self,
        attempt_id: Uuid,
        attempt_completed: bool,
        proctored: bool,
    ) -> Result<SessionView> {
        if !proctored {
            return Ok(SessionView::NotProctored);
        }

        let report = match self.get_report(attempt_id).await? {
            Some(report) => report,
            None => {
                let mut empty = SessionReport::empty(attempt_id, self.clock.now());
                if attempt_completed {
                    empty.finalized = true;
                    empty.is_valid = Some(true);
                }
                empty
            }
        };

        Ok(SessionView::Report(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn report() -> SessionReport {
        SessionReport::empty(Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn a_clean_report_is_valid() {
        let policy = ValidityPolicy::default();
        let (is_valid, reason) = policy.judge(&report());
        assert!(is_valid);
        assert!(reason.is_none());
    }

    #[test]
    fn any_mobile_detection_invalidates() {
        let policy = ValidityPolicy::default();
        let mut r = report();
        r.mobile_detected = 1;
        let (is_valid, reason) = policy.judge(&r);
        assert!(!is_valid);
        assert!(reason.unwrap().contains("mobile device"));
    }

    #[test]
    fn any_second_person_invalidates() {
        let policy = ValidityPolicy::default();
        let mut r = report();
        r.multiple_people = 2;
        let (is_valid, reason) = policy.judge(&r);
        assert!(!is_valid);
        assert!(reason.unwrap().contains("multiple people"));
    }

    #[test]
    fn switch_counters_invalidate_only_past_their_limits() {
        let policy = ValidityPolicy {
            tab_switch_limit: 3,
            window_switch_limit: 3,
            face_visibility_limit: 5,
        };

        let mut at_limit = report();
        at_limit.tab_switches = 3;
        at_limit.window_switches = 3;
        at_limit.face_visibility_issues = 5;
        assert!(policy.judge(&at_limit).0);

        let mut over = report();
        over.tab_switches = 4;
        let (is_valid, reason) = policy.judge(&over);
        assert!(!is_valid);
        assert!(reason.unwrap().contains("tab switches"));
    }

    #[test]
    fn multiple_breaches_are_joined_into_one_reason() {
        let policy = ValidityPolicy::default();
        let mut r = report();
        r.mobile_detected = 1;
        r.multiple_people = 1;
        let (_, reason) = policy.judge(&r);
        let reason = reason.unwrap();
        assert!(reason.contains("mobile device"));
        assert!(reason.contains("multiple people"));
        assert!(reason.contains("; "));
    }

    #[tokio::test]
    async fn a_full_queue_drops_instead_of_blocking() {
        let (sink, mut rx) = event_channel(1);
        let event = ProctoringEvent {
            attempt_id: Uuid::new_v4(),
            kind: ViolationKind::TabSwitch,
            count: 1,
        };
        sink.push(event.clone());
        sink.push(event.clone());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.count, 1);
        assert!(rx.try_recv().is_err());
    }
}
