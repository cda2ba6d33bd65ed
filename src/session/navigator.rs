// src/session/navigator.rs

use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    models::question::{Question, Section},
};

/// Questions of one section, in the order they are presented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPlan {
    pub section: Section,
    pub question_ids: Vec<i64>,
}

/// What a forward press does from the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardAction {
    Next,
    Submit,
}

/// Outcome of [`SectionNavigator::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Moved to the next question of the same section.
    Moved,
    /// Crossed into the following section, positioned on its first question.
    EnteredSection(Section),
    /// Already on the last question of the last section; only submit remains.
    AtEnd,
}

/// Cursor over an ordered list of sections.
///
/// Sections are visited strictly forward: once the cursor leaves a section it never
/// returns. `active_question` is 1-based and stays within the current section. An empty
/// section counts as already sitting on its last question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionNavigator {
    sections: Vec<SectionPlan>,
    current: usize,
    active_question: usize,
}

impl SectionNavigator {
    /// Partitions `questions` by section, keeping their relative order.
    pub fn new(order: &[Section], questions: &[Question]) -> Result<Self, AppError> {
        if order.is_empty() {
            return Err(AppError::InternalServerError(
                "section order must not be empty".to_string(),
            ));
        }

        let sections = order
            .iter()
            .map(|section| SectionPlan {
                section: *section,
                question_ids: questions
                    .iter()
                    .filter(|q| q.section_type == *section)
                    .map(|q| q.id)
                    .collect(),
            })
            .collect();

        Ok(Self {
            sections,
            current: 0,
            active_question: 1,
        })
    }

    pub fn sections(&self) -> &[SectionPlan] {
        &self.sections
    }

    fn plan(&self) -> &SectionPlan {
        &self.sections[self.current]
    }

    pub fn section(&self) -> Section {
        self.plan().section
    }

    pub fn section_index(&self) -> usize {
        self.current
    }

    pub fn active_question(&self) -> usize {
        self.active_question
    }

    pub fn section_len(&self) -> usize {
        self.plan().question_ids.len()
    }

    pub fn section_question_ids(&self) -> &[i64] {
        &self.plan().question_ids
    }

    /// `None` when the current section has no questions.
    pub fn current_question_id(&self) -> Option<i64> {
        self.plan().question_ids.get(self.active_question - 1).copied()
    }

    pub fn is_last_in_section(&self) -> bool {
        self.active_question >= self.section_len()
    }

    pub fn is_final_section(&self) -> bool {
        self.current + 1 == self.sections.len()
    }

    pub fn forward_action(&self) -> ForwardAction {
        if self.is_final_section() && self.is_last_in_section() {
            ForwardAction::Submit
        } else {
            ForwardAction::Next
        }
    }

    pub fn can_go_back(&self) -> bool {
        self.active_question > 1
    }

    pub fn next(&mut self) -> Step {
        if !self.is_last_in_section() {
            self.active_question += 1;
            return Step::Moved;
        }
        if self.is_final_section() {
            return Step::AtEnd;
        }
        self.current += 1;
        self.active_question = 1;
        Step::EnteredSection(self.section())
    }

    /// Steps back within the current section. Returns `false` at the first question.
    pub fn previous(&mut self) -> bool {
        if !self.can_go_back() {
            return false;
        }
        self.active_question -= 1;
        true
    }

    /// Moves to question `number` (1-based) of the current section.
    pub fn jump_to(&mut self, number: usize) -> Result<(), AppError> {
        let len = self.section_len();
        if number == 0 || number > len {
            return Err(AppError::BadRequest(format!(
                "Question {number} is not in the {} section (1..={len})",
                self.section()
            )));
        }
        self.active_question = number;
        Ok(())
    }
}
