use crate::error::{Error, Result};
use crate::models::attempt::Attempt;
use crate::models::result::TestResult;
use crate::models::session_report::SessionReport;
use crate::models::test::Test;
use crate::services::proctoring_service::ProctoringService;
use crate::services::test_service::TestService;
use sqlx::PgPool;
use uuid::Uuid;

/// Folds an attempt, its test and an optional session report into the
/// display projection. No report means vacuously valid; a zero-mark test
/// reports 0% instead of dividing by zero. Clamping applies to the
/// displayed percentage only, the stored score is passed through as is.
pub fn project(test: &Test, attempt: &Attempt, report: Option<&SessionReport>) -> TestResult {
    let score = attempt.score.unwrap_or(0);
    let percentage = if test.total_marks == 0 {
        0.0
    } else {
        (100.0 * score as f64 / test.total_marks as f64).clamp(0.0, 100.0)
    };

    TestResult {
        attempt_id: attempt.id,
        test_id: test.id,
        test_title: test.title.clone(),
        student_id: attempt.student_id,
        attempt_number: attempt.attempt_number,
        score,
        total_marks: test.total_marks,
        percentage,
        submitted_at: attempt.submitted_at,
        is_valid_test: report.and_then(|r| r.is_valid).unwrap_or(true),
        completed: attempt.completed,
    }
}

#[derive(Clone)]
pub struct ResultService {
    pool: PgPool,
}

impl ResultService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn fetch_result(
        &self,
        attempt_id: Uuid,
        student_id: Option<Uuid>,
        test_service: &TestService,
        proctoring_service: &ProctoringService,
    ) -> Result<TestResult> {
        let attempt = match student_id {
            Some(student_id) => sqlx::query_as::<_, Attempt>(
                r#"SELECT * FROM attempts WHERE id = $1 AND student_id = $2"#,
            )
            .bind(attempt_id)
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?,
            None => sqlx::query_as::<_, Attempt>(r#"SELECT * FROM attempts WHERE id = $1"#)
                .bind(attempt_id)
                .fetch_optional(&self.pool)
                .await?,
        }
        .ok_or_else(|| Error::NotFound("Attempt not found".to_string()))?;

        if !attempt.completed {
            return Err(Error::InvalidState(
                "This attempt has not been submitted yet".to_string(),
            ));
        }

        let test = test_service.get_test_by_id(attempt.test_id).await?;
        let report = proctoring_service.get_report(attempt.id).await?;
        Ok(project(&test, &attempt, report.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fixtures(total_marks: i32, score: i32) -> (Test, Attempt) {
        let now = Utc::now();
        let test = Test {
            id: Uuid::new_v4(),
            title: "Projection".to_string(),
            total_marks,
            start_time: now,
            end_time: now + chrono::Duration::hours(1),
            max_attempts: 1,
            duration_minutes: None,
            proctored: true,
            published: true,
            created_by: None,
            created_at: now,
            updated_at: now,
        };
        let attempt = Attempt {
            id: Uuid::new_v4(),
            test_id: test.id,
            student_id: Uuid::new_v4(),
            attempt_number: 1,
            started_at: now,
            submitted_at: Some(now),
            completed: true,
            score: Some(score),
        };
        (test, attempt)
    }

    #[test]
    fn no_report_means_vacuously_valid() {
        let (test, attempt) = fixtures(10, 7);
        let result = project(&test, &attempt, None);
        assert!(result.is_valid_test);
        assert_eq!(result.score, 7);
        assert!((result.percentage - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn an_invalid_report_flows_through() {
        let (test, attempt) = fixtures(10, 9);
        let mut report = SessionReport::empty(attempt.id, Utc::now());
        report.finalized = true;
        report.is_valid = Some(false);
        report.invalid_reason = Some("a mobile device was detected 1 time(s)".to_string());

        let result = project(&test, &attempt, Some(&report));
        assert!(!result.is_valid_test);
    }

    #[test]
    fn zero_total_marks_reports_zero_percent() {
        let (test, attempt) = fixtures(0, 0);
        let result = project(&test, &attempt, None);
        assert_eq!(result.percentage, 0.0);
    }

    #[test]
    fn negative_scores_clamp_to_zero_percent_for_display() {
        let (test, attempt) = fixtures(10, -3);
        let result = project(&test, &attempt, None);
        assert_eq!(result.percentage, 0.0);
        // the raw score is untouched
        assert_eq!(result.score, -3);
    }
}
