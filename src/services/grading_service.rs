use crate::models::answer::Answer;
use crate::models::question::{AnswerValue, Question};
use std::collections::HashMap;
use uuid::Uuid;

pub struct GradingService;

impl GradingService {
    /// Sum of per-question scores for a full attempt. Unanswered
    /// questions contribute zero.
    pub fn score_attempt(questions: &[Question], answers: &[Answer]) -> i32 {
        let by_question: HashMap<Uuid, &AnswerValue> = answers
            .iter()
            .map(|a| (a.question_id, &a.value.0))
            .collect();

        questions
            .iter()
            .map(|q| Self::score_question(q, by_question.get(&q.id).copied()))
            .sum()
    }

    pub fn score_question(question: &Question, given: Option<&AnswerValue>) -> i32 {
        let Some(given) = given else {
            return 0;
        };

        match (&question.answer_key.0, given) {
            (AnswerValue::SingleChoice(correct), AnswerValue::SingleChoice(selected)) => {
                if selected == correct {
                    question.marks
                } else {
                    -question.negative_marks
                }
            }
            (AnswerValue::MultiChoice(correct), AnswerValue::MultiChoice(selected)) => {
                // all-or-nothing; an empty saved set counts as unanswered
                if selected.is_empty() {
                    0
                } else if selected == correct {
                    question.marks
                } else {
                    -question.negative_marks
                }
            }
            (AnswerValue::FreeText(reference), AnswerValue::FreeText(submitted)) => {
                let submitted = Self::normalize_free_text(submitted);
                if submitted.is_empty() {
                    0
                } else if submitted == Self::normalize_free_text(reference) {
                    question.marks
                } else {
                    -question.negative_marks
                }
            }
            // the store rejects mismatched shapes, so nothing to award
            _ => 0,
        }
    }

    /// Lowercases and strips whitespace, `-` and `_` so cosmetic
    /// differences never fail a free-text answer.
    pub fn normalize_free_text(s: &str) -> String {
        s.chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect()
    }
}
