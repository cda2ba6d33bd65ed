// src/models/question.rs

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::prelude::FromRow;
use validator::Validate;

use crate::error::AppError;

/// GRE section a question belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Section {
    Verbal,
    Quant,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Verbal => "VERBAL",
            Section::Quant => "QUANT",
        }
    }

    /// Parses a section label leniently: surrounding whitespace and case are ignored.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "VERBAL" => Some(Section::Verbal),
            "QUANT" => Some(Section::Quant),
            _ => None,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database column `section_type` is TEXT, decoded through this conversion.
impl TryFrom<String> for Section {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Section::parse(&value)
            .ok_or_else(|| AppError::InternalServerError(format!("unknown section '{value}'")))
    }
}

/// Option letter a student selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionKey {
    A,
    B,
    C,
    D,
}

impl OptionKey {
    pub const ALL: [OptionKey; 4] = [OptionKey::A, OptionKey::B, OptionKey::C, OptionKey::D];
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    pub question_text: String,

    pub option_a: Option<String>,
    pub option_b: Option<String>,
    pub option_c: Option<String>,
    pub option_d: Option<String>,

    /// Literal text of the correct option.
    pub correct_option: String,

    #[sqlx(try_from = "String")]
    pub section_type: Section,

    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Question {
    /// Text of the option behind `key`, if that slot is filled.
    pub fn option_text(&self, key: OptionKey) -> Option<&str> {
        match key {
            OptionKey::A => self.option_a.as_deref(),
            OptionKey::B => self.option_b.as_deref(),
            OptionKey::C => self.option_c.as_deref(),
            OptionKey::D => self.option_d.as_deref(),
        }
    }

    pub fn to_public(&self) -> PublicQuestion {
        PublicQuestion {
            id: self.id,
            question_text: self.question_text.clone(),
            section_type: self.section_type,
            options: OptionKey::ALL
                .iter()
                .map(|key| OptionChoice {
                    key: *key,
                    text: self.option_text(*key).map(str::to_string),
                })
                .collect(),
        }
    }

    pub fn to_draft(&self) -> QuestionDraft {
        QuestionDraft {
            question_text: self.question_text.clone(),
            section_type: self.section_type,
            option_a: self.option_a.clone(),
            option_b: self.option_b.clone(),
            option_c: self.option_c.clone(),
            option_d: self.option_d.clone(),
            correct_option: self.correct_option.clone(),
        }
    }
}

/// DTO for sending a question to a student (excludes the correct option).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub question_text: String,
    pub section_type: Section,
    pub options: Vec<OptionChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChoice {
    pub key: OptionKey,
    pub text: Option<String>,
}

/// A validated question ready to be written.
/// `correct_option` always equals one of the filled option texts.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionDraft {
    pub question_text: String,
    pub section_type: Section,
    pub option_a: Option<String>,
    pub option_b: Option<String>,
    pub option_c: Option<String>,
    pub option_d: Option<String>,
    pub correct_option: String,
}

impl QuestionDraft {
    fn build(
        question_text: Option<String>,
        section_type: Section,
        options: [Option<String>; 4],
        correct_option: Option<String>,
    ) -> Result<Self, String> {
        let question_text = non_blank(question_text).ok_or("Question text is required")?;
        let correct_option = non_blank(correct_option).ok_or("Correct option is required")?;
        let [option_a, option_b, option_c, option_d] = options.map(non_blank);

        let matches_option = [&option_a, &option_b, &option_c, &option_d]
            .iter()
            .any(|opt| opt.as_deref() == Some(correct_option.as_str()));
        if !matches_option {
            return Err("Correct option must match the text of one of the options".to_string());
        }

        Ok(Self {
            question_text,
            section_type,
            option_a,
            option_b,
            option_c,
            option_d,
            correct_option,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_section(label: Option<&str>) -> Result<Section, String> {
    match label {
        None => Ok(Section::Verbal),
        Some(l) if l.trim().is_empty() => Ok(Section::Verbal),
        Some(l) => Section::parse(l).ok_or_else(|| "Invalid section type".to_string()),
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(max = 2000, message = "Question text must be at most 2000 characters."))]
    pub question_text: String,
    /// 'VERBAL' (default) or 'QUANT'.
    pub section_type: Option<String>,
    #[validate(length(max = 500))]
    pub option_a: Option<String>,
    #[validate(length(max = 500))]
    pub option_b: Option<String>,
    #[validate(length(max = 500))]
    pub option_c: Option<String>,
    #[validate(length(max = 500))]
    pub option_d: Option<String>,
    #[validate(length(max = 500))]
    pub correct_option: Option<String>,
}

impl CreateQuestionRequest {
    pub fn into_draft(self) -> Result<QuestionDraft, AppError> {
        self.validate()?;
        let section = parse_section(self.section_type.as_deref()).map_err(AppError::BadRequest)?;
        QuestionDraft::build(
            Some(self.question_text),
            section,
            [self.option_a, self.option_b, self.option_c, self.option_d],
            self.correct_option,
        )
        .map_err(AppError::BadRequest)
    }
}

/// DTO for updating a question. Fields are optional; an empty option string clears it.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    #[validate(length(max = 2000))]
    pub question_text: Option<String>,
    pub section_type: Option<String>,
    #[validate(length(max = 500))]
    pub option_a: Option<String>,
    #[validate(length(max = 500))]
    pub option_b: Option<String>,
    #[validate(length(max = 500))]
    pub option_c: Option<String>,
    #[validate(length(max = 500))]
    pub option_d: Option<String>,
    #[validate(length(max = 500))]
    pub correct_option: Option<String>,
}

impl UpdateQuestionRequest {
    /// Merges the patch over `current` and re-validates the result as a whole.
    pub fn apply_to(self, current: &Question) -> Result<QuestionDraft, AppError> {
        self.validate()?;
        let section = match self.section_type.as_deref() {
            Some(label) => Section::parse(label)
                .ok_or_else(|| AppError::BadRequest("Invalid section type".to_string()))?,
            None => current.section_type,
        };

        let current = current.to_draft();
        QuestionDraft::build(
            Some(self.question_text.unwrap_or(current.question_text)),
            section,
            [
                self.option_a.or(current.option_a),
                self.option_b.or(current.option_b),
                self.option_c.or(current.option_c),
                self.option_d.or(current.option_d),
            ],
            Some(self.correct_option.unwrap_or(current.correct_option)),
        )
        .map_err(AppError::BadRequest)
    }
}

/// Query parameters for listing questions.
#[derive(Debug, Deserialize)]
pub struct QuestionListParams {
    /// 'ALL' (default), 'VERBAL' or 'QUANT'.
    pub section: Option<String>,
}

impl QuestionListParams {
    pub fn section_filter(&self) -> Result<Option<Section>, AppError> {
        match self.section.as_deref() {
            None => Ok(None),
            Some(s) if s.trim().eq_ignore_ascii_case("ALL") => Ok(None),
            Some(s) => Section::parse(s)
                .map(Some)
                .ok_or_else(|| AppError::BadRequest(format!("Invalid section filter '{s}'"))),
        }
    }
}

/// DTO for bulk import. Each row maps spreadsheet column names to cell values.
#[derive(Debug, Deserialize)]
pub struct ImportQuestionsRequest {
    pub rows: Vec<Map<String, Value>>,
    /// When set, the imported questions are appended to this test.
    pub test_id: Option<i64>,
}

/// Converts imported rows into drafts.
/// Line numbers in errors count the header row, so the first data row is line 2.
pub fn parse_import_rows(rows: &[Map<String, Value>]) -> Result<Vec<QuestionDraft>, AppError> {
    if rows.is_empty() {
        return Err(AppError::BadRequest("Import file is empty".to_string()));
    }

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let line = i + 2;
            let cell = |name: &str| row.get(name).and_then(cell_text);

            let question_text = cell("question_text")
                .ok_or_else(|| AppError::BadRequest(format!("Row {line}: question_text is required")))?;
            let section = parse_section(cell("section_type").as_deref())
                .map_err(|_| AppError::BadRequest(format!("Row {line}: invalid section_type")))?;

            QuestionDraft::build(
                Some(question_text),
                section,
                [
                    cell("option_a"),
                    cell("option_b"),
                    cell("option_c"),
                    cell("option_d"),
                ],
                cell("correct_option"),
            )
            .map_err(|msg| AppError::BadRequest(format!("Row {line}: {msg}")))
        })
        .collect()
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => non_blank(Some(s.clone())),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
