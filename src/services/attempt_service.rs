use crate::error::{Error, Result};
use crate::models::attempt::Attempt;
use crate::models::test::Test;
use crate::services::grading_service::GradingService;
use crate::services::proctoring_service::ProctoringService;
use crate::utils::clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Why a student may not start a new attempt right now. Reasons carry
/// their data so the UI can render something specific.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockedReason {
    MaxAttemptsReached { used: i64, max: i32 },
    NotYetOpen { opens_at: DateTime<Utc> },
    WindowClosed { closed_at: DateTime<Utc> },
}

impl BlockedReason {
    pub fn message(&self) -> String {
        match self {
            BlockedReason::MaxAttemptsReached { used, max } => {
                format!("Maximum attempts reached ({} of {})", used, max)
            }
            BlockedReason::NotYetOpen { opens_at } => {
                format!("This test opens at {}", opens_at.to_rfc3339())
            }
            BlockedReason::WindowClosed { closed_at } => {
                format!("This test closed at {}", closed_at.to_rfc3339())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Resume(Attempt),
    StartNew,
    Blocked(BlockedReason),
}

/// Gate decision for one (student, test) pair. An open attempt always
/// resumes, ahead of attempt limits and the time window, so a student
/// mid-attempt can finish even after the window closes for new starts.
pub fn resolve(test: &Test, prior: &[Attempt], now: DateTime<Utc>) -> Resolution {
    if let Some(open) = prior.iter().find(|a| !a.completed) {
        return Resolution::Resume(open.clone());
    }

    let used = prior.iter().filter(|a| a.completed).count() as i64;
    if used >= test.max_attempts as i64 {
        return Resolution::Blocked(BlockedReason::MaxAttemptsReached {
            used,
            max: test.max_attempts,
        });
    }

    if now < test.start_time {
        return Resolution::Blocked(BlockedReason::NotYetOpen {
            opens_at: test.start_time,
        });
    }

    if now > test.end_time {
        return Resolution::Blocked(BlockedReason::WindowClosed {
            closed_at: test.end_time,
        });
    }

    Resolution::StartNew
}

#[derive(Clone)]
pub struct AttemptService {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl AttemptService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub async fn resolve_for_student(&self, test: &Test, student_id: Uuid) -> Result<Resolution> {
        let prior = self.list_attempts(test.id, student_id).await?;
        Ok(resolve(test, &prior, self.clock.now()))
    }

    pub async fn list_attempts(&self, test_id: Uuid, student_id: Uuid) -> Result<Vec<Attempt>> {
        let attempts = sqlx::query_as::<_, Attempt>(
            r#"SELECT * FROM attempts WHERE test_id = $1 AND student_id = $2 ORDER BY attempt_number"#,
        )
        .bind(test_id)
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }

    /// Scoped fetch. A cross-student id resolves to NotFound, never to a
    /// permission error.
    pub async fn get_attempt_for_student(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
    ) -> Result<Attempt> {
        let attempt = sqlx::query_as::<_, Attempt>(
            r#"SELECT * FROM attempts WHERE id = $1 AND student_id = $2"#,
        )
        .bind(attempt_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Attempt not found".to_string()))?;
        Ok(attempt)
    }

    /// Atomic check-then-insert: the attempt number is computed in the
    /// INSERT itself and the partial unique index on non-terminal rows
    /// turns a concurrent duplicate into a Conflict.
    pub async fn create_attempt(&self, test: &Test, student_id: Uuid) -> Result<Attempt> {
        let now = self.clock.now();
        let result = sqlx::query_as::<_, Attempt>(
            r#"
            INSERT INTO attempts (id, test_id, student_id, attempt_number, started_at, completed)
            SELECT $1, $2, $3, (COUNT(*) + 1)::int, $4, FALSE
            FROM attempts WHERE test_id = $2 AND student_id = $3
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(test.id)
        .bind(student_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(attempt) => Ok(attempt),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(Error::Conflict(
                "An attempt for this test is already in progress".to_string(),
            )),
            Err(other) => Err(other.into()),
        }
    }

    /// Scores and closes an open attempt. Safe to call again after
    /// completion: the terminal state is returned unchanged, so a
    /// double-submit never errors and never rescores.
    pub async fn submit(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        test_service: &crate::services::test_service::TestService,
        answer_service: &crate::services::answer_service::AnswerService,
        proctoring_service: &ProctoringService,
    ) -> Result<Attempt> {
        let attempt = self.get_attempt_for_student(attempt_id, student_id).await?;
        if attempt.completed {
            return Ok(attempt);
        }

        let test = test_service.get_test_by_id(attempt.test_id).await?;
        let questions = test_service.get_questions(attempt.test_id).await?;
        let answers = answer_service.list_answers(attempt.id).await?;
        let score = GradingService::score_attempt(&questions, &answers);

        let now = self.clock.now();
        let updated = sqlx::query_as::<_, Attempt>(
            r#"
            UPDATE attempts
            SET completed = TRUE, submitted_at = $2, score = $3
            WHERE id = $1 AND completed = FALSE
            RETURNING *
            "#,
        )
        .bind(attempt.id)
        .bind(now)
        .bind(score)
        .fetch_optional(&self.pool)
        .await?;

        let attempt = match updated {
            Some(attempt) => attempt,
            // lost a submit race; the other call's terminal state stands
            None => self.get_attempt_for_student(attempt_id, student_id).await?,
        };

        if test.proctored {
            proctoring_service.finalize(attempt.id).await?;
        }

        Ok(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn test_fixture(start: DateTime<Utc>, end: DateTime<Utc>, max_attempts: i32) -> Test {
        Test {
            id: Uuid::new_v4(),
            title: "Gating".to_string(),
            total_marks: 10,
            start_time: start,
            end_time: end,
            max_attempts,
            duration_minutes: None,
            proctored: false,
            published: true,
            created_by: None,
            created_at: start,
            updated_at: start,
        }
    }

    fn attempt_fixture(test: &Test, number: i32, completed: bool) -> Attempt {
        Attempt {
            id: Uuid::new_v4(),
            test_id: test.id,
            student_id: Uuid::new_v4(),
            attempt_number: number,
            started_at: test.start_time,
            submitted_at: completed.then(|| test.start_time),
            completed,
            score: completed.then_some(0),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn window_gates_new_starts() {
        let start = t0() + Duration::hours(1);
        let end = t0() + Duration::hours(2);
        let test = test_fixture(start, end, 3);

        match resolve(&test, &[], t0()) {
            Resolution::Blocked(BlockedReason::NotYetOpen { opens_at }) => {
                assert_eq!(opens_at, start)
            }
            other => panic!("expected NotYetOpen, got {:?}", other),
        }

        let mid_window = t0() + Duration::minutes(90);
        assert!(matches!(resolve(&test, &[], mid_window), Resolution::StartNew));

        match resolve(&test, &[], t0() + Duration::hours(3)) {
            Resolution::Blocked(BlockedReason::WindowClosed { closed_at }) => {
                assert_eq!(closed_at, end)
            }
            other => panic!("expected WindowClosed, got {:?}", other),
        }
    }

    #[test]
    fn max_attempts_blocks_before_window_checks() {
        let test = test_fixture(t0(), t0() + Duration::hours(1), 2);
        let prior = vec![
            attempt_fixture(&test, 1, true),
            attempt_fixture(&test, 2, true),
        ];

        // even before the window opens the limit is the reported reason
        match resolve(&test, &prior, t0() - Duration::hours(1)) {
            Resolution::Blocked(BlockedReason::MaxAttemptsReached { used, max }) => {
                assert_eq!((used, max), (2, 2));
            }
            other => panic!("expected MaxAttemptsReached, got {:?}", other),
        }
    }

    #[test]
    fn open_attempt_resumes_ahead_of_everything() {
        let test = test_fixture(t0(), t0() + Duration::hours(1), 1);
        let open = attempt_fixture(&test, 1, false);
        let prior = vec![open.clone()];

        // the window has closed and the limit is exhausted, resume still wins
        let after_close = t0() + Duration::hours(5);
        match resolve(&test, &prior, after_close) {
            Resolution::Resume(found) => assert_eq!(found.id, open.id),
            other => panic!("expected Resume, got {:?}", other),
        }
    }

    #[test]
    fn completed_attempts_under_the_limit_allow_a_new_start() {
        let test = test_fixture(t0(), t0() + Duration::hours(1), 3);
        let prior = vec![attempt_fixture(&test, 1, true)];
        let mid_window = t0() + Duration::minutes(30);
        assert!(matches!(resolve(&test, &prior, mid_window), Resolution::StartNew));
    }
}
