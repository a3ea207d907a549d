use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OptionLetter {
    A,
    B,
    C,
    D,
}

impl fmt::Display for OptionLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OptionLetter::A => "A",
            OptionLetter::B => "B",
            OptionLetter::C => "C",
            OptionLetter::D => "D",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    MultiChoice,
    FreeText,
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuestionKind::SingleChoice => "single_choice",
            QuestionKind::MultiChoice => "multi_choice",
            QuestionKind::FreeText => "free_text",
        };
        f.write_str(s)
    }
}

/// Shared shape for answer keys and submitted answers. Matching on the
/// variant replaces any per-type optional-field guessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    SingleChoice(OptionLetter),
    MultiChoice(BTreeSet<OptionLetter>),
    FreeText(String),
}

impl AnswerValue {
    pub fn kind(&self) -> QuestionKind {
        match self {
            AnswerValue::SingleChoice(_) => QuestionKind::SingleChoice,
            AnswerValue::MultiChoice(_) => QuestionKind::MultiChoice,
            AnswerValue::FreeText(_) => QuestionKind::FreeText,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: Uuid,
    pub test_id: Uuid,
    pub position: i32,
    pub prompt: String,
    pub marks: i32,
    pub negative_marks: i32,
    pub options: Option<Json<Vec<String>>>,
    pub answer_key: Json<AnswerValue>,
}

impl Question {
    pub fn kind(&self) -> QuestionKind {
        self.answer_key.kind()
    }
}
