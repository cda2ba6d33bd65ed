// src/session/scoring.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::question::{OptionKey, Question, Section};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    Incorrect,
    Unanswered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionVerdict {
    pub question_id: i64,
    pub section_type: Section,
    pub question_text: String,
    pub selected: Option<OptionKey>,
    /// Text behind the selected letter, `None` when unanswered or the slot is empty.
    pub selected_text: Option<String>,
    pub correct_option: String,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub score: i32,
    pub total: usize,
    pub verdicts: Vec<QuestionVerdict>,
}

/// Scores an attempt.
///
/// The selected letter is resolved to its option text, which must equal
/// `correct_option` exactly (case-sensitive, untrimmed). Unanswered questions
/// are incorrect. Answers for ids outside `questions` are ignored.
pub fn score_attempt(questions: &[Question], answers: &HashMap<i64, OptionKey>) -> ScoreReport {
    let verdicts: Vec<QuestionVerdict> = questions
        .iter()
        .map(|q| {
            let selected = answers.get(&q.id).copied();
            let selected_text = selected.and_then(|key| q.option_text(key));

            let verdict = match (selected, selected_text) {
                (None, _) => Verdict::Unanswered,
                (Some(_), Some(text)) if text == q.correct_option => Verdict::Correct,
                (Some(_), _) => Verdict::Incorrect,
            };

            QuestionVerdict {
                question_id: q.id,
                section_type: q.section_type,
                question_text: q.question_text.clone(),
                selected,
                selected_text: selected_text.map(str::to_string),
                correct_option: q.correct_option.clone(),
                verdict,
            }
        })
        .collect();

    let score = verdicts
        .iter()
        .filter(|v| v.verdict == Verdict::Correct)
        .count() as i32;

    ScoreReport {
        score,
        total: questions.len(),
        verdicts,
    }
}
