// src/models/test.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'tests' table in the database.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Test {
    pub id: i64,
    pub title: String,
    /// Only published tests are listed to students.
    pub is_published: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a test.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTestRequest {
    #[validate(length(min = 1, max = 200, message = "Title length must be between 1 and 200 chars"))]
    pub title: String,
    #[serde(default)]
    pub is_published: bool,
}

/// DTO for updating a test. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTestRequest {
    #[validate(length(min = 1, max = 200, message = "Title length must be between 1 and 200 chars"))]
    pub title: Option<String>,
    pub is_published: Option<bool>,
}

/// DTO for replacing the ordered question list of a test.
#[derive(Debug, Deserialize)]
pub struct AssignQuestionsRequest {
    pub question_ids: Vec<i64>,
}
