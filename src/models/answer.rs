use crate::models::question::AnswerValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Answer {
    pub attempt_id: Uuid,
    pub question_id: Uuid,
    pub value: Json<AnswerValue>,
    pub answered_at: DateTime<Utc>,
}
