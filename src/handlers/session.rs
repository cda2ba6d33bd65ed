// src/handlers/session.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::question::OptionKey,
    repository::DynRepository,
    session::{AttemptSession, scoring::ScoreReport, store::Student},
};

async fn load(repo: &DynRepository, token: Uuid) -> Result<AttemptSession, AppError> {
    repo.load_session(token)
        .await?
        .ok_or(AppError::NotFound("Session not found".to_string()))
}

/// Returns the current attempt screen.
pub async fn get_session(
    State(repo): State<DynRepository>,
    Path(token): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = load(&repo, token).await?;
    Ok(Json(session.view()))
}

#[derive(Debug, Deserialize)]
pub struct SelectAnswerRequest {
    pub question_id: i64,
    pub option: OptionKey,
}

/// Records the selected option for a question of this attempt.
pub async fn select_answer(
    State(repo): State<DynRepository>,
    Path(token): Path<Uuid>,
    Json(payload): Json<SelectAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut session = load(&repo, token).await?;
    session.select(payload.question_id, payload.option)?;
    repo.save_session(token, &session).await?;
    Ok(Json(session.view()))
}

/// Moves forward; crosses into the next section after its predecessor's last question.
pub async fn next_question(
    State(repo): State<DynRepository>,
    Path(token): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut session = load(&repo, token).await?;
    session.next()?;
    repo.save_session(token, &session).await?;
    Ok(Json(session.view()))
}

pub async fn previous_question(
    State(repo): State<DynRepository>,
    Path(token): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut session = load(&repo, token).await?;
    if session.previous()? {
        repo.save_session(token, &session).await?;
    }
    Ok(Json(session.view()))
}

#[derive(Debug, Deserialize)]
pub struct JumpRequest {
    /// 1-based position inside the current section.
    pub question: usize,
}

pub async fn jump_to_question(
    State(repo): State<DynRepository>,
    Path(token): Path<Uuid>,
    Json(payload): Json<JumpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut session = load(&repo, token).await?;
    session.jump_to(payload.question)?;
    repo.save_session(token, &session).await?;
    Ok(Json(session.view()))
}

const RESULT_NOT_SAVED: &str =
    "Warning: usage limit not updated. Please contact support if issues persist.";

#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub test_id: Option<i64>,
    pub student: Student,
    pub attempt_no: Option<i32>,
    #[serde(flatten)]
    pub report: ScoreReport,
    /// Whether this call stored the result.
    pub recorded: bool,
    /// Set when the result could not be stored; the score is still valid.
    pub warning: Option<String>,
}

fn result_response(session: &AttemptSession, report: ScoreReport) -> ResultResponse {
    ResultResponse {
        test_id: session.store.test_id(),
        student: session.store.student().clone(),
        attempt_no: session.store.attempt_no(),
        report,
        recorded: false,
        warning: None,
    }
}

/// Submits the attempt.
///
/// * Scores the answers.
/// * Arms the session's one-shot latch and saves it before writing the result.
/// * Upserts the result keyed by (test, email).
///
/// A failed latch or result write is logged and reported as `warning`; the score is
/// returned regardless.
pub async fn submit(
    State(repo): State<DynRepository>,
    Path(token): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut session = load(&repo, token).await?;
    let submission = session.submit()?;
    let mut response = result_response(&session, submission.report);

    if let Some(result) = submission.result {
        // The result is only written once the latch is durable; a later submit retries both.
        if let Err(e) = repo.save_session(token, &session).await {
            tracing::error!("Failed to persist submit latch for session {}: {}", token, e);
            response.warning = Some(RESULT_NOT_SAVED.to_string());
            return Ok(Json(response));
        }

        match repo.upsert_result(&result).await {
            Ok(()) => {
                tracing::info!(
                    "Recorded score {} for {} on test {} (attempt {})",
                    result.score,
                    result.email,
                    result.test_id,
                    result.attempt_no
                );
                response.recorded = true;
            }
            Err(e) => {
                tracing::warn!("Failed to save result for session {}: {}", token, e);
                response.warning = Some(RESULT_NOT_SAVED.to_string());
            }
        }
    }

    Ok(Json(response))
}

/// Recomputes the result of a submitted attempt from the stored session.
pub async fn get_result(
    State(repo): State<DynRepository>,
    Path(token): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = load(&repo, token).await?;
    if !session.submitted {
        return Err(AppError::Conflict(
            "Test has not been submitted yet".to_string(),
        ));
    }
    let report = session.report();
    Ok(Json(result_response(&session, report)))
}

/// Clears the session, as on "Back to Home".
pub async fn reset_session(
    State(repo): State<DynRepository>,
    Path(token): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut session = load(&repo, token).await?;
    session.reset()?;
    repo.save_session(token, &session).await?;
    Ok(StatusCode::NO_CONTENT)
}
