// src/repository/memory.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        question::{Question, QuestionDraft, Section},
        result::{NewTestResult, TestResult},
        test::Test,
        user::User,
    },
    repository::Repository,
    session::{AttemptSession, navigator::SectionNavigator, store::StudentTestStore},
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<User>,
    tests: BTreeMap<i64, Test>,
    questions: BTreeMap<i64, Question>,
    /// test id → ordered question ids
    test_questions: HashMap<i64, Vec<i64>>,
    results: Vec<TestResult>,
    sessions: HashMap<Uuid, StoredSession>,
}

/// Same columns as `attempt_sessions`: store snapshot, navigator JSON, latch.
#[derive(Clone)]
struct StoredSession {
    state: Value,
    navigator: Option<Value>,
    submitted: bool,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_question(&mut self, draft: &QuestionDraft) -> i64 {
        let id = self.next_id();
        self.questions.insert(
            id,
            Question {
                id,
                question_text: draft.question_text.clone(),
                option_a: draft.option_a.clone(),
                option_b: draft.option_b.clone(),
                option_c: draft.option_c.clone(),
                option_d: draft.option_d.clone(),
                correct_option: draft.correct_option.clone(),
                section_type: draft.section_type,
                created_at: Some(Utc::now()),
            },
        );
        id
    }

    fn sorted_tests(&self, published_only: bool) -> Vec<Test> {
        let mut tests: Vec<Test> = self
            .tests
            .values()
            .filter(|t| !published_only || t.is_published)
            .cloned()
            .collect();
        tests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tests
    }
}

/// In-process backend with the same semantics as the Postgres one.
///
/// Reads and result writes can be made to fail on demand to exercise error paths.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
    fail_reads: AtomicBool,
    fail_result_writes: AtomicBool,
    fail_session_writes: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes attempt-count, test and question reads fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Makes `upsert_result` fail.
    pub fn fail_result_writes(&self, fail: bool) {
        self.fail_result_writes.store(fail, Ordering::Relaxed);
    }

    /// Makes `save_session` fail.
    pub fn fail_session_writes(&self, fail: bool) {
        self.fail_session_writes.store(fail, Ordering::Relaxed);
    }

    fn check_reads(&self) -> Result<(), AppError> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(AppError::InternalServerError("backend unreachable".to_string()));
        }
        Ok(())
    }

    pub fn seed_test(&self, title: &str, is_published: bool) -> i64 {
        let mut tables = self.tables();
        let id = tables.next_id();
        tables.tests.insert(
            id,
            Test {
                id,
                title: title.to_string(),
                is_published,
                created_at: Some(Utc::now()),
            },
        );
        id
    }

    /// Inserts a question and appends it to `test_id` when given.
    pub fn seed_question(&self, draft: &QuestionDraft, test_id: Option<i64>) -> i64 {
        let mut tables = self.tables();
        let id = tables.insert_question(draft);
        if let Some(test_id) = test_id {
            tables.test_questions.entry(test_id).or_default().push(id);
        }
        id
    }

    pub fn results(&self) -> Vec<TestResult> {
        self.tables().results.clone()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn fetch_published_tests(&self) -> Result<Vec<Test>, AppError> {
        self.check_reads()?;
        Ok(self.tables().sorted_tests(true))
    }

    async fn list_tests(&self) -> Result<Vec<Test>, AppError> {
        Ok(self.tables().sorted_tests(false))
    }

    async fn get_test(&self, id: i64) -> Result<Option<Test>, AppError> {
        Ok(self.tables().tests.get(&id).cloned())
    }

    async fn create_test(&self, title: &str, is_published: bool) -> Result<Test, AppError> {
        let id = self.seed_test(title, is_published);
        self.get_test(id)
            .await?
            .ok_or_else(|| AppError::InternalServerError("test vanished after insert".to_string()))
    }

    async fn update_test(
        &self,
        id: i64,
        title: Option<&str>,
        is_published: Option<bool>,
    ) -> Result<Option<Test>, AppError> {
        let mut tables = self.tables();
        let Some(test) = tables.tests.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(title) = title {
            test.title = title.to_string();
        }
        if let Some(is_published) = is_published {
            test.is_published = is_published;
        }
        Ok(Some(test.clone()))
    }

    async fn delete_test(&self, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables();
        let removed = tables.tests.remove(&id).is_some();
        if removed {
            tables.test_questions.remove(&id);
            tables.results.retain(|r| r.test_id != id);
        }
        Ok(removed)
    }

    async fn set_test_questions(&self, test_id: i64, question_ids: &[i64]) -> Result<(), AppError> {
        let mut tables = self.tables();
        if !tables.tests.contains_key(&test_id) {
            return Err(AppError::NotFound("Test not found".to_string()));
        }
        if let Some(missing) = question_ids.iter().find(|id| !tables.questions.contains_key(*id)) {
            return Err(AppError::BadRequest(format!("Question {missing} does not exist")));
        }
        tables.test_questions.insert(test_id, question_ids.to_vec());
        Ok(())
    }

    async fn fetch_questions_for_test(&self, test_id: i64) -> Result<Vec<Question>, AppError> {
        self.check_reads()?;
        let tables = self.tables();
        let questions = tables
            .test_questions
            .get(&test_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.questions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(questions)
    }

    async fn list_questions(&self, section: Option<Section>) -> Result<Vec<Question>, AppError> {
        self.check_reads()?;
        // Newest first, like the admin listing in Postgres.
        let questions = self
            .tables()
            .questions
            .values()
            .rev()
            .filter(|q| section.is_none_or(|s| q.section_type == s))
            .cloned()
            .collect();
        Ok(questions)
    }

    async fn get_question(&self, id: i64) -> Result<Option<Question>, AppError> {
        Ok(self.tables().questions.get(&id).cloned())
    }

    async fn create_question(&self, draft: &QuestionDraft) -> Result<i64, AppError> {
        Ok(self.tables().insert_question(draft))
    }

    async fn create_questions(
        &self,
        drafts: &[QuestionDraft],
        test_id: Option<i64>,
    ) -> Result<Vec<i64>, AppError> {
        let mut tables = self.tables();
        if let Some(test_id) = test_id {
            if !tables.tests.contains_key(&test_id) {
                return Err(AppError::NotFound("Test not found".to_string()));
            }
        }

        let ids: Vec<i64> = drafts.iter().map(|d| tables.insert_question(d)).collect();
        if let Some(test_id) = test_id {
            tables
                .test_questions
                .entry(test_id)
                .or_default()
                .extend(ids.iter().copied());
        }
        Ok(ids)
    }

    async fn update_question(&self, id: i64, draft: &QuestionDraft) -> Result<bool, AppError> {
        let mut tables = self.tables();
        let Some(question) = tables.questions.get_mut(&id) else {
            return Ok(false);
        };
        question.question_text = draft.question_text.clone();
        question.option_a = draft.option_a.clone();
        question.option_b = draft.option_b.clone();
        question.option_c = draft.option_c.clone();
        question.option_d = draft.option_d.clone();
        question.correct_option = draft.correct_option.clone();
        question.section_type = draft.section_type;
        Ok(true)
    }

    async fn delete_question(&self, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables();
        let removed = tables.questions.remove(&id).is_some();
        for ids in tables.test_questions.values_mut() {
            ids.retain(|q| *q != id);
        }
        Ok(removed)
    }

    async fn fetch_attempt_count(&self, test_id: i64, email: &str) -> Result<Option<i32>, AppError> {
        self.check_reads()?;
        Ok(self
            .tables()
            .results
            .iter()
            .find(|r| r.test_id == test_id && r.email == email)
            .map(|r| r.attempt_no))
    }

    async fn upsert_result(&self, result: &NewTestResult) -> Result<(), AppError> {
        if self.fail_result_writes.load(Ordering::Relaxed) {
            return Err(AppError::InternalServerError("result write rejected".to_string()));
        }

        let mut tables = self.tables();
        let existing = tables
            .results
            .iter()
            .position(|r| r.test_id == result.test_id && r.email == result.email);

        let id = match existing {
            Some(idx) => tables.results.remove(idx).id,
            None => tables.next_id(),
        };
        tables.results.push(TestResult {
            id,
            test_id: result.test_id,
            email: result.email.clone(),
            student_name: result.student_name.clone(),
            score: result.score,
            attempt_no: result.attempt_no,
            created_at: Some(Utc::now()),
        });
        Ok(())
    }

    async fn list_results(&self, test_id: i64) -> Result<Vec<TestResult>, AppError> {
        let mut results: Vec<TestResult> = self
            .tables()
            .results
            .iter()
            .filter(|r| r.test_id == test_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.score.cmp(&a.score).then(a.created_at.cmp(&b.created_at)));
        Ok(results)
    }

    async fn load_session(&self, token: Uuid) -> Result<Option<AttemptSession>, AppError> {
        let stored = self.tables().sessions.get(&token).cloned();
        stored
            .map(|row| {
                let store = StudentTestStore::from_snapshot(row.state)?;
                let navigator = row
                    .navigator
                    .map(serde_json::from_value::<SectionNavigator>)
                    .transpose()?;
                AttemptSession::restore(store, navigator, row.submitted)
            })
            .transpose()
    }

    async fn save_session(&self, token: Uuid, session: &AttemptSession) -> Result<(), AppError> {
        if self.fail_session_writes.load(Ordering::Relaxed) {
            return Err(AppError::InternalServerError("session write rejected".to_string()));
        }

        let stored = StoredSession {
            state: session.store.to_snapshot()?,
            navigator: Some(serde_json::to_value(&session.navigator)?),
            submitted: session.submitted,
        };
        self.tables().sessions.insert(token, stored);
        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .tables()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<i64, AppError> {
        let mut tables = self.tables();
        if tables.users.iter().any(|u| u.username == username) {
            return Err(AppError::Conflict(format!(
                "Username '{}' already exists",
                username
            )));
        }
        let id = tables.next_id();
        tables.users.push(User {
            id,
            username: username.to_string(),
            password: password_hash.to_string(),
            role: role.to_string(),
            created_at: Some(Utc::now()),
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(text: &str, section: Section) -> QuestionDraft {
        QuestionDraft {
            question_text: text.to_string(),
            section_type: section,
            option_a: Some("a".to_string()),
            option_b: Some("b".to_string()),
            option_c: None,
            option_d: None,
            correct_option: "a".to_string(),
        }
    }

    fn result(score: i32, attempt_no: i32) -> NewTestResult {
        NewTestResult {
            student_name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            score,
            test_id: 1,
            attempt_no,
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_pair() {
        let repo = MemoryRepository::new();
        repo.upsert_result(&result(3, 1)).await.unwrap();
        repo.upsert_result(&result(7, 2)).await.unwrap();

        let stored = repo.list_results(1).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].score, 7);
        assert_eq!(stored[0].attempt_no, 2);
        assert_eq!(repo.fetch_attempt_count(1, "ada@example.com").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_published_tests_oldest_first() {
        let repo = MemoryRepository::new();
        let first = repo.seed_test("First", true);
        repo.seed_test("Draft", false);
        let third = repo.seed_test("Third", true);

        let ids: Vec<i64> = repo
            .fetch_published_tests()
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![first, third]);
    }

    #[tokio::test]
    async fn test_questions_for_test_keep_assigned_order() {
        let repo = MemoryRepository::new();
        let test_id = repo.seed_test("Mock", true);
        let q1 = repo.seed_question(&draft("one", Section::Verbal), None);
        let q2 = repo.seed_question(&draft("two", Section::Quant), None);

        repo.set_test_questions(test_id, &[q2, q1]).await.unwrap();
        let ids: Vec<i64> = repo
            .fetch_questions_for_test(test_id)
            .await
            .unwrap()
            .iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(ids, vec![q2, q1]);

        assert!(repo.set_test_questions(test_id, &[999]).await.is_err());
        assert!(repo.delete_question(q2).await.unwrap());
        assert_eq!(repo.fetch_questions_for_test(test_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_session_survives_json_round_trip_mid_section() {
        let repo = MemoryRepository::new();
        let mut questions = Vec::new();
        for (id, section) in [
            (1, Section::Verbal),
            (2, Section::Verbal),
            (3, Section::Verbal),
            (4, Section::Quant),
        ] {
            let mut d = draft(&format!("Q{id}"), section);
            d.option_a = Some("a < b & c".to_string());
            d.correct_option = "a < b & c".to_string();
            questions.push(Question {
                id,
                question_text: d.question_text,
                option_a: d.option_a,
                option_b: d.option_b,
                option_c: None,
                option_d: None,
                correct_option: d.correct_option,
                section_type: d.section_type,
                created_at: Some(Utc::now()),
            });
        }

        let mut session = AttemptSession::start(
            9,
            crate::session::store::Student::new("Ada", "ada@example.com"),
            2,
            questions,
        )
        .unwrap();
        session.select(1, crate::models::question::OptionKey::A).unwrap();
        session.next().unwrap();

        let token = Uuid::new_v4();
        repo.save_session(token, &session).await.unwrap();
        let restored = repo.load_session(token).await.unwrap().unwrap();

        assert_eq!(restored, session);
        assert_eq!(restored.view().section, Section::Verbal);
        assert_eq!(restored.view().active_question, 2);
        assert_eq!(restored.report().score, 1);
    }

    #[tokio::test]
    async fn test_failed_session_write_keeps_previous_state() {
        let repo = MemoryRepository::new();
        let token = Uuid::new_v4();
        assert!(repo.load_session(token).await.unwrap().is_none());

        let mut session = AttemptSession::start(
            9,
            crate::session::store::Student::new("Ada", "ada@example.com"),
            1,
            Vec::new(),
        )
        .unwrap();
        repo.save_session(token, &session).await.unwrap();

        repo.fail_session_writes(true);
        session.submitted = true;
        assert!(repo.save_session(token, &session).await.is_err());
        assert!(!repo.load_session(token).await.unwrap().unwrap().submitted);
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let repo = MemoryRepository::new();
        repo.create_user("admin", "hash", "admin").await.unwrap();
        let err = repo.create_user("admin", "hash", "admin").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
