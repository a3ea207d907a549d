use crate::models::answer::Answer;
use crate::models::attempt::Attempt;
use crate::models::question::{AnswerValue, Question, QuestionKind};
use crate::models::result::TestResult;
use crate::models::session_report::SessionReport;
use crate::services::attempt_service::BlockedReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Question as a student sees it: everything needed to render, nothing
/// that gives the key away.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub id: Uuid,
    pub position: i32,
    pub prompt: String,
    pub kind: QuestionKind,
    pub marks: i32,
    pub negative_marks: i32,
    pub options: Option<Vec<String>>,
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            position: q.position,
            prompt: q.prompt.clone(),
            kind: q.kind(),
            marks: q.marks,
            negative_marks: q.negative_marks,
            options: q.options.as_ref().map(|o| o.0.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerEcho {
    pub question_id: Uuid,
    pub value: AnswerValue,
    pub answered_at: DateTime<Utc>,
}

impl From<&Answer> for AnswerEcho {
    fn from(a: &Answer) -> Self {
        Self {
            question_id: a.question_id,
            value: a.value.0.clone(),
            answered_at: a.answered_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    Resumed,
    Started,
    Blocked,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartOrResumeResponse {
    pub status: ResolutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<Attempt>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<QuestionView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub answers: Vec<AnswerEcho>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked: Option<BlockedReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveAnswerRequest {
    pub answer: AnswerValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveAnswerResponse {
    pub saved: bool,
    pub question_id: Uuid,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProctoringEventRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProctoringEventResponse {
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitTestResponse {
    #[serde(flatten)]
    pub result: TestResult,
    pub message: String,
}

/// `proctored: false` with no report is the documented empty state for
/// non-proctored attempts; the UI renders it as information, not failure.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub proctored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SessionReport>,
}
