use crate::dto::manage_dto::{CreateQuestion, CreateTestPayload};
use crate::error::{Error, Result};
use crate::models::question::{AnswerValue, Question};
use crate::models::test::Test;
use crate::utils::clock::{Clock, SystemClock};
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Structural checks on a new test and its question set. Everything here
/// is a ValidationError before any row is written.
pub fn validate_payload(payload: &CreateTestPayload) -> Result<()> {
    if payload.start_time >= payload.end_time {
        return Err(Error::Validation(
            "Test start time must be before its end time".to_string(),
        ));
    }
    if payload.max_attempts < 1 {
        return Err(Error::Validation(
            "A test must allow at least one attempt".to_string(),
        ));
    }
    if payload.questions.is_empty() {
        return Err(Error::Validation(
            "A test needs at least one question".to_string(),
        ));
    }

    for (idx, q) in payload.questions.iter().enumerate() {
        validate_question(q).map_err(|err| match err {
            Error::Validation(msg) => Error::Validation(format!("Question {}: {}", idx + 1, msg)),
            other => other,
        })?;
    }

    Ok(())
}

fn validate_question(q: &CreateQuestion) -> Result<()> {
    if q.marks < 0 {
        return Err(Error::Validation("Marks cannot be negative".to_string()));
    }
    if q.negative_marks < 0 {
        return Err(Error::Validation(
            "Negative marks cannot be negative".to_string(),
        ));
    }

    match &q.answer_key {
        AnswerValue::SingleChoice(_) => require_four_options(q),
        AnswerValue::MultiChoice(correct) => {
            if correct.is_empty() {
                return Err(Error::Validation(
                    "A multi-choice key needs at least one correct option".to_string(),
                ));
            }
            require_four_options(q)
        }
        AnswerValue::FreeText(reference) => {
            if q.options.is_some() {
                return Err(Error::Validation(
                    "A free-text question does not take options".to_string(),
                ));
            }
            if reference.trim().is_empty() {
                return Err(Error::Validation(
                    "A free-text key needs a reference answer".to_string(),
                ));
            }
            Ok(())
        }
    }
}

fn require_four_options(q: &CreateQuestion) -> Result<()> {
    let options = q
        .options
        .as_ref()
        .ok_or_else(|| Error::Validation("A choice question needs its options".to_string()))?;
    if options.len() != 4 {
        return Err(Error::Validation(
            "A choice question needs exactly four options".to_string(),
        ));
    }
    if options.iter().any(|o| o.trim().is_empty()) {
        return Err(Error::Validation("Options cannot be empty".to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct TestService {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl TestService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    /// Inserts the test and its questions in one transaction. The total
    /// is the sum of the question marks.
    pub async fn create_test(
        &self,
        payload: CreateTestPayload,
        created_by: Uuid,
    ) -> Result<(Test, Vec<Question>)> {
        validate_payload(&payload)?;

        let now = self.clock.now();
        let total_marks: i32 = payload.questions.iter().map(|q| q.marks).sum();
        let mut tx = self.pool.begin().await?;

        let test = sqlx::query_as::<_, Test>(
            r#"
            INSERT INTO tests (
                id, title, total_marks, start_time, end_time, max_attempts,
                duration_minutes, proctored, published, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, $9, $10, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&payload.title)
        .bind(total_marks)
        .bind(payload.start_time)
        .bind(payload.end_time)
        .bind(payload.max_attempts)
        .bind(payload.duration_minutes)
        .bind(payload.proctored)
        .bind(created_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let mut questions = Vec::with_capacity(payload.questions.len());
        for (position, q) in payload.questions.into_iter().enumerate() {
            let CreateQuestion {
                prompt,
                marks,
                negative_marks,
                options,
                answer_key,
            } = q;
            let question = sqlx::query_as::<_, Question>(
                r#"
                INSERT INTO questions (
                    id, test_id, position, prompt, marks, negative_marks, options, answer_key
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(test.id)
            .bind(position as i32)
            .bind(prompt)
            .bind(marks)
            .bind(negative_marks)
            .bind(options.map(Json))
            .bind(Json(answer_key))
            .fetch_one(&mut *tx)
            .await?;
            questions.push(question);
        }

        tx.commit().await?;
        Ok((test, questions))
    }

    /// Idempotent; publishing twice leaves the test published.
    pub async fn publish_test(&self, test_id: Uuid) -> Result<Test> {
        let test = sqlx::query_as::<_, Test>(
            r#"UPDATE tests SET published = TRUE, updated_at = $2 WHERE id = $1 RETURNING *"#,
        )
        .bind(test_id)
        .bind(self.clock.now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Test not found".to_string()))?;
        Ok(test)
    }

    pub async fn get_test_by_id(&self, test_id: Uuid) -> Result<Test> {
        let test = sqlx::query_as::<_, Test>(r#"SELECT * FROM tests WHERE id = $1"#)
            .bind(test_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Test not found".to_string()))?;
        Ok(test)
    }

    /// Student-facing lookup. Unpublished tests stay invisible.
    pub async fn get_published_test(&self, test_id: Uuid) -> Result<Test> {
        let test =
            sqlx::query_as::<_, Test>(r#"SELECT * FROM tests WHERE id = $1 AND published"#)
                .bind(test_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| Error::NotFound("Test not found".to_string()))?;
        Ok(test)
    }

    /// Full rows including answer keys; student responses must go
    /// through `QuestionView` instead.
    pub async fn get_questions(&self, test_id: Uuid) -> Result<Vec<Question>> {
        let questions = sqlx::query_as::<_, Question>(
            r#"SELECT * FROM questions WHERE test_id = $1 ORDER BY position"#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::OptionLetter;
    use chrono::{Duration, Utc};

    fn choice_question() -> CreateQuestion {
        CreateQuestion {
            prompt: "2 + 2?".to_string(),
            marks: 4,
            negative_marks: 1,
            options: Some(vec![
                "1".to_string(),
                "2".to_string(),
                "3".to_string(),
                "4".to_string(),
            ]),
            answer_key: AnswerValue::SingleChoice(OptionLetter::D),
        }
    }

    fn payload() -> CreateTestPayload {
        let now = Utc::now();
        CreateTestPayload {
            title: "Midterm".to_string(),
            start_time: now,
            end_time: now + Duration::hours(2),
            max_attempts: 2,
            duration_minutes: Some(60),
            proctored: true,
            questions: vec![choice_question()],
        }
    }

    #[test]
    fn a_well_formed_payload_passes() {
        assert!(validate_payload(&payload()).is_ok());
    }

    #[test]
    fn inverted_window_is_rejected() {
        let mut p = payload();
        p.end_time = p.start_time - Duration::minutes(1);
        assert!(matches!(validate_payload(&p), Err(Error::Validation(_))));
    }

    #[test]
    fn zero_max_attempts_is_rejected() {
        let mut p = payload();
        p.max_attempts = 0;
        assert!(matches!(validate_payload(&p), Err(Error::Validation(_))));
    }

    #[test]
    fn choice_questions_need_four_non_empty_options() {
        let mut p = payload();
        p.questions[0].options = Some(vec!["1".to_string(), "2".to_string()]);
        assert!(matches!(validate_payload(&p), Err(Error::Validation(_))));

        let mut p = payload();
        p.questions[0].options.as_mut().unwrap()[2] = "  ".to_string();
        assert!(matches!(validate_payload(&p), Err(Error::Validation(_))));
    }

    #[test]
    fn multi_choice_key_must_not_be_empty() {
        let mut p = payload();
        p.questions[0].answer_key = AnswerValue::MultiChoice(Default::default());
        assert!(matches!(validate_payload(&p), Err(Error::Validation(_))));
    }

    #[test]
    fn free_text_takes_a_reference_and_no_options() {
        let mut p = payload();
        p.questions[0].options = None;
        p.questions[0].answer_key = AnswerValue::FreeText("Paris".to_string());
        assert!(validate_payload(&p).is_ok());

        p.questions[0].answer_key = AnswerValue::FreeText("   ".to_string());
        assert!(matches!(validate_payload(&p), Err(Error::Validation(_))));
    }

    #[test]
    fn validation_errors_name_the_offending_question() {
        let mut p = payload();
        p.questions.push(CreateQuestion {
            options: None,
            ..choice_question()
        });
        let err = validate_payload(&p).unwrap_err();
        match err {
            Error::Validation(msg) => assert!(msg.starts_with("Question 2:")),
            other => panic!("expected Validation, got {:?}", other),
        }
    }
}
