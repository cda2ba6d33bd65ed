// src/repository/mod.rs

//! Backend access.
//!
//! Every read and write the handlers need goes through [`Repository`]. `PgRepository`
//! talks to Postgres; `MemoryRepository` keeps everything in process for tests and
//! local runs.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        question::{Question, QuestionDraft, Section},
        result::{NewTestResult, TestResult},
        test::Test,
        user::User,
    },
    session::AttemptSession,
};

pub type DynRepository = Arc<dyn Repository>;

#[async_trait]
pub trait Repository: Send + Sync {
    // ---- tests ----

    /// Published tests, oldest first.
    async fn fetch_published_tests(&self) -> Result<Vec<Test>, AppError>;

    /// Every test, oldest first.
    async fn list_tests(&self) -> Result<Vec<Test>, AppError>;

    async fn get_test(&self, id: i64) -> Result<Option<Test>, AppError>;

    async fn create_test(&self, title: &str, is_published: bool) -> Result<Test, AppError>;

    /// Returns `None` when the test does not exist.
    async fn update_test(
        &self,
        id: i64,
        title: Option<&str>,
        is_published: Option<bool>,
    ) -> Result<Option<Test>, AppError>;

    /// Returns `false` when nothing was deleted.
    async fn delete_test(&self, id: i64) -> Result<bool, AppError>;

    /// Replaces the ordered question list of a test.
    async fn set_test_questions(&self, test_id: i64, question_ids: &[i64]) -> Result<(), AppError>;

    /// Questions attached to a test, in their assigned order.
    async fn fetch_questions_for_test(&self, test_id: i64) -> Result<Vec<Question>, AppError>;

    // ---- questions ----

    async fn list_questions(&self, section: Option<Section>) -> Result<Vec<Question>, AppError>;

    async fn get_question(&self, id: i64) -> Result<Option<Question>, AppError>;

    async fn create_question(&self, draft: &QuestionDraft) -> Result<i64, AppError>;

    /// Inserts all drafts or none. With `test_id`, appends them to that test.
    async fn create_questions(
        &self,
        drafts: &[QuestionDraft],
        test_id: Option<i64>,
    ) -> Result<Vec<i64>, AppError>;

    async fn update_question(&self, id: i64, draft: &QuestionDraft) -> Result<bool, AppError>;

    async fn delete_question(&self, id: i64) -> Result<bool, AppError>;

    // ---- results ----

    /// Stored attempt number for (test, email), `None` when no result exists yet.
    async fn fetch_attempt_count(&self, test_id: i64, email: &str) -> Result<Option<i32>, AppError>;

    /// Inserts or overwrites the result keyed by (test_id, email).
    async fn upsert_result(&self, result: &NewTestResult) -> Result<(), AppError>;

    async fn list_results(&self, test_id: i64) -> Result<Vec<TestResult>, AppError>;

    // ---- attempt sessions ----

    async fn load_session(&self, token: Uuid) -> Result<Option<AttemptSession>, AppError>;

    async fn save_session(&self, token: Uuid, session: &AttemptSession) -> Result<(), AppError>;

    // ---- users ----

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// Fails with `AppError::Conflict` when the username is taken.
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<i64, AppError>;
}
