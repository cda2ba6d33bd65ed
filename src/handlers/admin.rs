// src/handlers/admin.rs

use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::{
            CreateQuestionRequest, ImportQuestionsRequest, QuestionListParams,
            UpdateQuestionRequest, parse_import_rows,
        },
        test::{AssignQuestionsRequest, CreateTestRequest, UpdateTestRequest},
    },
    repository::DynRepository,
};

/// Lists questions, newest first, optionally filtered by section.
/// Admin only.
pub async fn list_questions(
    State(repo): State<DynRepository>,
    Query(params): Query<QuestionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let section = params.section_filter()?;
    let questions = repo.list_questions(section).await?;
    Ok(Json(questions))
}

/// Retrieves a single question, including its correct option.
/// Admin only.
pub async fn get_question(
    State(repo): State<DynRepository>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let question = repo
        .get_question(id)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    Ok(Json(question))
}

/// Creates a new question.
/// Admin only.
pub async fn create_question(
    State(repo): State<DynRepository>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let draft = payload.into_draft()?;
    let id = repo.create_question(&draft).await?;

    tracing::info!("Created {} question {}", draft.section_type, id);
    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Updates a question by ID. The merged question is validated as a whole.
/// Admin only.
pub async fn update_question(
    State(repo): State<DynRepository>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let current = repo
        .get_question(id)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    let draft = payload.apply_to(&current)?;

    if !repo.update_question(id, &draft).await? {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a question by ID. It also disappears from every test that used it.
/// Admin only.
pub async fn delete_question(
    State(repo): State<DynRepository>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !repo.delete_question(id).await? {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Bulk-imports questions from spreadsheet rows.
///
/// Every row is validated before anything is written; the first bad row rejects the
/// whole import with its line number.
/// Admin only.
pub async fn import_questions(
    State(repo): State<DynRepository>,
    Json(payload): Json<ImportQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let drafts = parse_import_rows(&payload.rows)?;
    let ids = repo.create_questions(&drafts, payload.test_id).await?;

    tracing::info!("Imported {} questions", ids.len());
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"imported": ids.len(), "ids": ids})),
    ))
}

/// Lists every test, published or not.
/// Admin only.
pub async fn list_tests(State(repo): State<DynRepository>) -> Result<impl IntoResponse, AppError> {
    let tests = repo.list_tests().await?;
    Ok(Json(tests))
}

/// Creates a test.
/// Admin only.
pub async fn create_test(
    State(repo): State<DynRepository>,
    Json(payload): Json<CreateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest("Title is required".to_string()));
    }

    let test = repo.create_test(title, payload.is_published).await?;
    Ok((StatusCode::CREATED, Json(test)))
}

/// Renames and/or (un)publishes a test.
/// Admin only.
pub async fn update_test(
    State(repo): State<DynRepository>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let title = payload.title.as_deref().map(str::trim);
    if title.is_some_and(str::is_empty) {
        return Err(AppError::BadRequest("Title is required".to_string()));
    }

    let test = repo
        .update_test(id, title, payload.is_published)
        .await?
        .ok_or(AppError::NotFound("Test not found".to_string()))?;

    Ok(Json(test))
}

/// Deletes a test together with its question links and results.
/// Admin only.
pub async fn delete_test(
    State(repo): State<DynRepository>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !repo.delete_test(id).await? {
        return Err(AppError::NotFound("Test not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Replaces the ordered question list of a test.
/// Admin only.
pub async fn assign_questions(
    State(repo): State<DynRepository>,
    Path(id): Path<i64>,
    Json(payload): Json<AssignQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut seen = HashSet::new();
    if let Some(dup) = payload.question_ids.iter().find(|qid| !seen.insert(**qid)) {
        return Err(AppError::BadRequest(format!("Question {dup} is listed twice")));
    }

    repo.set_test_questions(id, &payload.question_ids).await?;
    Ok(StatusCode::OK)
}

/// Lists stored results of a test, best score first.
/// Admin only.
pub async fn list_results(
    State(repo): State<DynRepository>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    repo.get_test(id)
        .await?
        .ok_or(AppError::NotFound("Test not found".to_string()))?;

    let results = repo.list_results(id).await?;
    Ok(Json(results))
}
