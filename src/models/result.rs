// src/models/result.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'test_results' table in the database.
/// One row per (test_id, email); a later attempt overwrites the earlier one.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct TestResult {
    pub id: i64,
    pub test_id: i64,
    pub email: String,
    /// Display only; identity is the email.
    pub student_name: String,
    pub score: i32,
    pub attempt_no: i32,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Payload written when an attempt is submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTestResult {
    pub student_name: String,
    pub email: String,
    pub score: i32,
    pub test_id: i64,
    pub attempt_no: i32,
}
