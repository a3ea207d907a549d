use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Display-ready projection of a submitted attempt. Derived on read,
/// never stored.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub attempt_id: Uuid,
    pub test_id: Uuid,
    pub test_title: String,
    pub student_id: Uuid,
    pub attempt_number: i32,
    pub score: i32,
    pub total_marks: i32,
    pub percentage: f64,
    pub submitted_at: Option<DateTime<Utc>>,
    pub is_valid_test: bool,
    pub completed: bool,
}
