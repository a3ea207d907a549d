use crate::models::question::{AnswerValue, Question};
use crate::models::test::Test;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTestPayload {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_attempts: i32,
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub proctored: bool,
    pub questions: Vec<CreateQuestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateQuestion {
    pub prompt: String,
    pub marks: i32,
    #[serde(default)]
    pub negative_marks: i32,
    pub options: Option<Vec<String>>,
    pub answer_key: AnswerValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestWithQuestions {
    pub test: Test,
    pub questions: Vec<Question>,
}
