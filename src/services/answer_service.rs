use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::attempt::Attempt;
use crate::models::question::{AnswerValue, Question};
use crate::utils::clock::{Clock, SystemClock};
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Rejects a value whose shape does not fit the question, e.g. a set of
/// letters sent for a single-choice question.
pub fn validate_value(question: &Question, value: &AnswerValue) -> Result<()> {
    if question.kind() != value.kind() {
        return Err(Error::Validation(format!(
            "Expected a {} answer for this question, got {}",
            question.kind(),
            value.kind()
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct AnswerService {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl AnswerService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    /// Upsert: saving twice for the same question overwrites the earlier
    /// value. Only open attempts accept writes.
    pub async fn save_answer(
        &self,
        attempt: &Attempt,
        question_id: Uuid,
        value: AnswerValue,
    ) -> Result<Answer> {
        if attempt.completed {
            return Err(Error::InvalidState(
                "This attempt has been submitted; answers can no longer change".to_string(),
            ));
        }

        let question = sqlx::query_as::<_, Question>(
            r#"SELECT * FROM questions WHERE id = $1 AND test_id = $2"#,
        )
        .bind(question_id)
        .bind(attempt.test_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Question not found".to_string()))?;

        validate_value(&question, &value)?;

        // guarded by the attempt row so a write racing a submit cannot
        // land after the attempt froze
        let answer = sqlx::query_as::<_, Answer>(
            r#"
            INSERT INTO answers (attempt_id, question_id, value, answered_at)
            SELECT $1, $2, $3, $4
            WHERE EXISTS (SELECT 1 FROM attempts WHERE id = $1 AND completed = FALSE)
            ON CONFLICT (attempt_id, question_id)
            DO UPDATE SET value = EXCLUDED.value, answered_at = EXCLUDED.answered_at
            RETURNING *
            "#,
        )
        .bind(attempt.id)
        .bind(question.id)
        .bind(Json(value))
        .bind(self.clock.now())
        .fetch_optional(&self.pool)
        .await?;

        answer.ok_or_else(|| {
            Error::InvalidState(
                "This attempt has been submitted; answers can no longer change".to_string(),
            )
        })
    }

    /// Answers in question order, for scoring and resume pre-fill.
    pub async fn list_answers(&self, attempt_id: Uuid) -> Result<Vec<Answer>> {
        let answers = sqlx::query_as::<_, Answer>(
            r#"
            SELECT ans.* FROM answers ans
            JOIN questions q ON ans.question_id = q.id
            WHERE ans.attempt_id = $1
            ORDER BY q.position
            "#,
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }
}
