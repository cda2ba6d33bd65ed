// src/session/mod.rs

//! Student attempt sessions.
//!
//! An [`AttemptSession`] is loaded from the repository at the start of every request,
//! mutated in memory and saved back before the response is sent.

pub mod gate;
pub mod navigator;
pub mod scoring;
pub mod store;

use serde::Serialize;

use crate::{
    config::SECTION_ORDER,
    error::AppError,
    models::{
        question::{OptionKey, PublicQuestion, Question, Section},
        result::NewTestResult,
    },
};
use navigator::{ForwardAction, SectionNavigator, Step};
use scoring::{ScoreReport, score_attempt};
use store::{Student, StudentTestStore};

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptSession {
    pub store: StudentTestStore,
    pub navigator: SectionNavigator,
    /// Set once the result write has been issued; never cleared except by reset.
    pub submitted: bool,
}

/// Result of [`AttemptSession::submit`].
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub report: ScoreReport,
    /// Present only the first time a session with a complete identity is submitted.
    pub result: Option<NewTestResult>,
}

impl AttemptSession {
    /// Builds a fresh session for a permitted attempt.
    pub fn start(
        test_id: i64,
        student: Student,
        attempt_no: i32,
        questions: Vec<Question>,
    ) -> Result<Self, AppError> {
        let navigator = SectionNavigator::new(&SECTION_ORDER, &questions)?;

        let mut store = StudentTestStore::new();
        store.set_student(student.name, student.email);
        store.set_test(test_id);
        store.set_attempt_no(attempt_no);
        store.set_questions(questions);

        Ok(Self {
            store,
            navigator,
            submitted: false,
        })
    }

    /// Rebuilds a session from its persisted parts.
    pub fn restore(
        store: StudentTestStore,
        navigator: Option<SectionNavigator>,
        submitted: bool,
    ) -> Result<Self, AppError> {
        let navigator = match navigator {
            Some(nav) => nav,
            None => SectionNavigator::new(&SECTION_ORDER, store.questions())?,
        };
        Ok(Self {
            store,
            navigator,
            submitted,
        })
    }

    fn ensure_open(&self) -> Result<(), AppError> {
        if self.submitted {
            return Err(AppError::Conflict("Test has already been submitted".to_string()));
        }
        if self.store.test_id().is_none() {
            return Err(AppError::Conflict("No test in progress".to_string()));
        }
        Ok(())
    }

    /// Records an answer. Does not move the cursor.
    pub fn select(&mut self, question_id: i64, option: OptionKey) -> Result<(), AppError> {
        self.ensure_open()?;
        if self.store.question(question_id).is_none() {
            return Err(AppError::BadRequest(format!(
                "Question {question_id} is not part of this test"
            )));
        }
        self.store.set_answer(question_id, option);
        Ok(())
    }

    pub fn next(&mut self) -> Result<Step, AppError> {
        self.ensure_open()?;
        Ok(self.navigator.next())
    }

    pub fn previous(&mut self) -> Result<bool, AppError> {
        self.ensure_open()?;
        Ok(self.navigator.previous())
    }

    pub fn jump_to(&mut self, number: usize) -> Result<(), AppError> {
        self.ensure_open()?;
        self.navigator.jump_to(number)
    }

    /// Scores the attempt and arms the one-shot result latch.
    ///
    /// Only allowed from the last question of the final section. Calling it again on a
    /// submitted session returns the same report without a second write.
    pub fn submit(&mut self) -> Result<Submission, AppError> {
        if !self.submitted {
            if self.store.test_id().is_none() {
                return Err(AppError::Conflict("No test in progress".to_string()));
            }
            if self.navigator.forward_action() != ForwardAction::Submit {
                return Err(AppError::Conflict(
                    "Finish the final section before submitting".to_string(),
                ));
            }
        }

        let report = self.report();
        let result = match (self.submitted, self.result_payload(report.score)) {
            (false, Some(payload)) => {
                self.submitted = true;
                Some(payload)
            }
            _ => None,
        };

        Ok(Submission { report, result })
    }

    fn result_payload(&self, score: i32) -> Option<NewTestResult> {
        let student = self.store.student();
        let test_id = self.store.test_id()?;
        if !student.is_complete() {
            return None;
        }
        Some(NewTestResult {
            student_name: student.name.clone(),
            email: student.email.clone(),
            score,
            test_id,
            attempt_no: self.store.attempt_no().unwrap_or(1),
        })
    }

    /// Recomputes the score from the stored questions and answers.
    pub fn report(&self) -> ScoreReport {
        score_attempt(self.store.questions(), self.store.answers())
    }

    /// Clears everything, as when the student returns home.
    pub fn reset(&mut self) -> Result<(), AppError> {
        self.store.reset_test();
        self.navigator = SectionNavigator::new(&SECTION_ORDER, &[])?;
        self.submitted = false;
        Ok(())
    }

    pub fn view(&self) -> SessionView {
        let nav = &self.navigator;
        let palette = nav
            .section_question_ids()
            .iter()
            .enumerate()
            .map(|(idx, id)| PaletteEntry {
                number: idx + 1,
                question_id: *id,
                answered: self.store.answer(*id).is_some(),
                active: idx + 1 == nav.active_question(),
            })
            .collect();

        let question_id = nav.current_question_id();

        SessionView {
            test_id: self.store.test_id(),
            student: self.store.student().clone(),
            attempt_no: self.store.attempt_no(),
            section: nav.section(),
            active_question: nav.active_question(),
            section_len: nav.section_len(),
            question: question_id
                .and_then(|id| self.store.question(id))
                .map(Question::to_public),
            selected: question_id.and_then(|id| self.store.answer(id)),
            can_go_back: nav.can_go_back(),
            forward_action: nav.forward_action(),
            palette,
            answered: self.store.answers().len(),
            total_questions: self.store.questions().len(),
            submitted: self.submitted,
        }
    }
}

/// What a student sees on the attempt screen.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub test_id: Option<i64>,
    pub student: Student,
    pub attempt_no: Option<i32>,
    pub section: Section,
    pub active_question: usize,
    pub section_len: usize,
    /// `None` for an empty section.
    pub question: Option<PublicQuestion>,
    pub selected: Option<OptionKey>,
    pub can_go_back: bool,
    pub forward_action: ForwardAction,
    pub palette: Vec<PaletteEntry>,
    pub answered: usize,
    pub total_questions: usize,
    pub submitted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaletteEntry {
    pub number: usize,
    pub question_id: i64,
    pub answered: bool,
    pub active: bool,
}
