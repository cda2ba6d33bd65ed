// src/session/store.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::AppError,
    models::question::{OptionKey, Question},
};

/// Identity a student enters before starting a test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub name: String,
    pub email: String,
}

impl Student {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.email.is_empty()
    }
}

/// State of one student's in-progress test.
///
/// The serialized shape is exactly `{testId, student, attemptNo, questions, answers}` and
/// round-trips through [`StudentTestStore::to_snapshot`] / [`StudentTestStore::from_snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentTestStore {
    test_id: Option<i64>,
    student: Student,
    attempt_no: Option<i32>,
    questions: Vec<Question>,
    answers: HashMap<i64, OptionKey>,
}

impl StudentTestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn test_id(&self) -> Option<i64> {
        self.test_id
    }

    pub fn student(&self) -> &Student {
        &self.student
    }

    pub fn attempt_no(&self) -> Option<i32> {
        self.attempt_no
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &HashMap<i64, OptionKey> {
        &self.answers
    }

    pub fn answer(&self, question_id: i64) -> Option<OptionKey> {
        self.answers.get(&question_id).copied()
    }

    pub fn question(&self, question_id: i64) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn set_test(&mut self, test_id: i64) {
        self.test_id = Some(test_id);
    }

    pub fn set_student(&mut self, name: impl Into<String>, email: impl Into<String>) {
        self.student = Student::new(name, email);
    }

    pub fn set_attempt_no(&mut self, attempt_no: i32) {
        self.attempt_no = Some(attempt_no);
    }

    pub fn set_questions(&mut self, questions: Vec<Question>) {
        self.questions = questions;
    }

    /// Records or overwrites the answer for one question.
    pub fn set_answer(&mut self, question_id: i64, option: OptionKey) {
        self.answers.insert(question_id, option);
    }

    pub fn reset_test(&mut self) {
        *self = Self::default();
    }

    pub fn to_snapshot(&self) -> Result<Value, AppError> {
        serde_json::to_value(self)
            .map_err(|e| AppError::InternalServerError(format!("failed to serialize store: {e}")))
    }

    pub fn from_snapshot(snapshot: Value) -> Result<Self, AppError> {
        serde_json::from_value(snapshot)
            .map_err(|e| AppError::InternalServerError(format!("corrupt session store: {e}")))
    }
}
