// src/repository/postgres.rs

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json};
use uuid::Uuid;

use crate::{
    config::SESSION_STORAGE_KEY,
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

const QUESTION_COLUMNS: &str = "id, question_text, option_a, option_b, option_c, option_d, \
     correct_option, section_type, created_at";

/// Helper struct for reading a persisted attempt session.
#[derive(sqlx::FromRow)]
struct SessionRow {
    state: serde_json::Value,
    navigator: Option<Json<SectionNavigator>>,
    submitted: bool,
}

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::InternalServerError(e.to_string()))
}

#[async_trait]
impl Repository for PgRepository {
    async fn fetch_published_tests(&self) -> Result<Vec<Test>, AppError> {
        let tests = sqlx::query_as::<_, Test>(
            r#"
            SELECT id, title, is_published, created_at
            FROM tests
            WHERE is_published = TRUE
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch published tests: {:?}", e);
            AppError::from(e)
        })?;

        Ok(tests)
    }

    async fn list_tests(&self) -> Result<Vec<Test>, AppError> {
        let tests = sqlx::query_as::<_, Test>(
            "SELECT id, title, is_published, created_at FROM tests ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tests)
    }

    async fn get_test(&self, id: i64) -> Result<Option<Test>, AppError> {
        let test = sqlx::query_as::<_, Test>(
            "SELECT id, title, is_published, created_at FROM tests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(test)
    }

    async fn create_test(&self, title: &str, is_published: bool) -> Result<Test, AppError> {
        let test = sqlx::query_as::<_, Test>(
            r#"
            INSERT INTO tests (title, is_published)
            VALUES ($1, $2)
            RETURNING id, title, is_published, created_at
            "#,
        )
        .bind(title)
        .bind(is_published)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create test: {:?}", e);
            AppError::from(e)
        })?;

        Ok(test)
    }

    async fn update_test(
        &self,
        id: i64,
        title: Option<&str>,
        is_published: Option<bool>,
    ) -> Result<Option<Test>, AppError> {
        let test = sqlx::query_as::<_, Test>(
            r#"
            UPDATE tests SET
                title = COALESCE($2, title),
                is_published = COALESCE($3, is_published)
            WHERE id = $1
            RETURNING id, title, is_published, created_at
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(is_published)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update test: {:?}", e);
            AppError::from(e)
        })?;

        Ok(test)
    }

    async fn delete_test(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM tests WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to delete test: {:?}", e);
                AppError::from(e)
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_test_questions(&self, test_id: i64, question_ids: &[i64]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM tests WHERE id = $1 FOR UPDATE")
            .bind(test_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound("Test not found".to_string()))?;

        let known: Vec<i64> = sqlx::query_scalar("SELECT id FROM questions WHERE id = ANY($1)")
            .bind(question_ids)
            .fetch_all(&mut *tx)
            .await?;
        if let Some(missing) = question_ids.iter().find(|id| !known.contains(*id)) {
            return Err(AppError::BadRequest(format!("Question {missing} does not exist")));
        }

        sqlx::query("DELETE FROM test_questions WHERE test_id = $1")
            .bind(test_id)
            .execute(&mut *tx)
            .await?;

        if !question_ids.is_empty() {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO test_questions (test_id, question_id, position) ");
            builder.push_values(question_ids.iter().enumerate(), |mut row, (pos, id)| {
                row.push_bind(test_id).push_bind(*id).push_bind(pos as i32);
            });
            builder.build().execute(&mut *tx).await.map_err(|e| {
                tracing::error!("Failed to assign questions to test {}: {:?}", test_id, e);
                AppError::from(e)
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn fetch_questions_for_test(&self, test_id: i64) -> Result<Vec<Question>, AppError> {
        let questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT
                q.id, q.question_text, q.option_a, q.option_b, q.option_c, q.option_d,
                q.correct_option, q.section_type, q.created_at
            FROM test_questions tq
            JOIN questions q ON q.id = tq.question_id
            WHERE tq.test_id = $1
            ORDER BY tq.position ASC, q.id ASC
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch questions for test {}: {:?}", test_id, e);
            AppError::from(e)
        })?;

        Ok(questions)
    }

    async fn list_questions(&self, section: Option<Section>) -> Result<Vec<Question>, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        builder.push(QUESTION_COLUMNS).push(" FROM questions");
        if let Some(section) = section {
            builder.push(" WHERE section_type = ");
            builder.push_bind(section.as_str());
        }
        builder.push(" ORDER BY created_at DESC, id DESC");

        let questions = builder
            .build_query_as::<Question>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list questions: {:?}", e);
                AppError::from(e)
            })?;

        Ok(questions)
    }

    async fn get_question(&self, id: i64) -> Result<Option<Question>, AppError> {
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1");
        let question = sqlx::query_as::<_, Question>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(question)
    }

    async fn create_question(&self, draft: &QuestionDraft) -> Result<i64, AppError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO questions
            (question_text, option_a, option_b, option_c, option_d, correct_option, section_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&draft.question_text)
        .bind(&draft.option_a)
        .bind(&draft.option_b)
        .bind(&draft.option_c)
        .bind(&draft.option_d)
        .bind(&draft.correct_option)
        .bind(draft.section_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create question: {:?}", e);
            AppError::from(e)
        })?;

        Ok(id)
    }

    async fn create_questions(
        &self,
        drafts: &[QuestionDraft],
        test_id: Option<i64>,
    ) -> Result<Vec<i64>, AppError> {
        let mut tx = self.pool.begin().await?;

        let mut next_position = match test_id {
            Some(test_id) => {
                sqlx::query("SELECT id FROM tests WHERE id = $1 FOR UPDATE")
                    .bind(test_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or(AppError::NotFound("Test not found".to_string()))?;

                let max: Option<i32> =
                    sqlx::query_scalar("SELECT MAX(position) FROM test_questions WHERE test_id = $1")
                        .bind(test_id)
                        .fetch_one(&mut *tx)
                        .await?;
                max.map_or(0, |m| m + 1)
            }
            None => 0,
        };

        let mut ids = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO questions
                (question_text, option_a, option_b, option_c, option_d, correct_option, section_type)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id
                "#,
            )
            .bind(&draft.question_text)
            .bind(&draft.option_a)
            .bind(&draft.option_b)
            .bind(&draft.option_c)
            .bind(&draft.option_d)
            .bind(&draft.correct_option)
            .bind(draft.section_type.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to import question: {:?}", e);
                AppError::from(e)
            })?;

            if let Some(test_id) = test_id {
                sqlx::query(
                    "INSERT INTO test_questions (test_id, question_id, position) VALUES ($1, $2, $3)",
                )
                .bind(test_id)
                .bind(id)
                .bind(next_position)
                .execute(&mut *tx)
                .await?;
                next_position += 1;
            }

            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn update_question(&self, id: i64, draft: &QuestionDraft) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE questions SET
                question_text = $2,
                option_a = $3,
                option_b = $4,
                option_c = $5,
                option_d = $6,
                correct_option = $7,
                section_type = $8
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&draft.question_text)
        .bind(&draft.option_a)
        .bind(&draft.option_b)
        .bind(&draft.option_c)
        .bind(&draft.option_d)
        .bind(&draft.correct_option)
        .bind(draft.section_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update question: {:?}", e);
            AppError::from(e)
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_question(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to delete question: {:?}", e);
                AppError::from(e)
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn fetch_attempt_count(&self, test_id: i64, email: &str) -> Result<Option<i32>, AppError> {
        let attempt_no: Option<i32> = sqlx::query_scalar(
            "SELECT attempt_no FROM test_results WHERE test_id = $1 AND email = $2",
        )
        .bind(test_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempt_no)
    }

    async fn upsert_result(&self, result: &NewTestResult) -> Result<(), AppError> {
        // Last write wins for a (test, email) pair.
        sqlx::query(
            r#"
            INSERT INTO test_results (test_id, email, student_name, score, attempt_no)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (test_id, email) DO UPDATE SET
                student_name = EXCLUDED.student_name,
                score = EXCLUDED.score,
                attempt_no = EXCLUDED.attempt_no,
                created_at = NOW()
            "#,
        )
        .bind(result.test_id)
        .bind(&result.email)
        .bind(&result.student_name)
        .bind(result.score)
        .bind(result.attempt_no)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to upsert test result: {:?}", e);
            AppError::from(e)
        })?;

        Ok(())
    }

    async fn list_results(&self, test_id: i64) -> Result<Vec<TestResult>, AppError> {
        let results = sqlx::query_as::<_, TestResult>(
            r#"
            SELECT id, test_id, email, student_name, score, attempt_no, created_at
            FROM test_results
            WHERE test_id = $1
            ORDER BY score DESC, created_at ASC
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn load_session(&self, token: Uuid) -> Result<Option<AttemptSession>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT state, navigator, submitted FROM attempt_sessions WHERE token = $1 AND storage_key = $2",
        )
        .bind(token)
        .bind(SESSION_STORAGE_KEY)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let store = StudentTestStore::from_snapshot(row.state)?;
            AttemptSession::restore(store, row.navigator.map(|n| n.0), row.submitted)
        })
        .transpose()
    }

    async fn save_session(&self, token: Uuid, session: &AttemptSession) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO attempt_sessions (token, storage_key, state, navigator, submitted)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (token) DO UPDATE SET
                state = EXCLUDED.state,
                navigator = EXCLUDED.navigator,
                submitted = EXCLUDED.submitted,
                updated_at = NOW()
            "#,
        )
        .bind(token)
        .bind(SESSION_STORAGE_KEY)
        .bind(session.store.to_snapshot()?)
        .bind(to_json(&session.navigator)?)
        .bind(session.submitted)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to save attempt session {}: {:?}", token, e);
            AppError::from(e)
        })?;

        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password, role, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Login DB error: {:?}", e);
            AppError::from(e)
        })?;

        Ok(user)
    }

    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<i64, AppError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, password, role) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(username)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Username '{}' already exists", username))
            } else {
                tracing::error!("Failed to create user: {:?}", e);
                AppError::from(e)
            }
        })?;

        Ok(id)
    }
}
