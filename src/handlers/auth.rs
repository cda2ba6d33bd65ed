// src/handlers/auth.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::user::LoginRequest,
    repository::DynRepository,
    utils::{
        hash::verify_password,
        jwt::{Claims, sign_jwt},
    },
};

/// Authenticates an admin and returns a JWT token.
///
/// Unknown user and wrong password both answer 401 with the same message.
pub async fn login(
    State(repo): State<DynRepository>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = repo
        .find_user_by_username(&payload.username)
        .await?
        .ok_or(AppError::AuthError("Invalid username or password".to_string()))?;

    if !verify_password(&payload.password, &user.password)? {
        tracing::info!("Failed login for {}", payload.username);
        return Err(AppError::AuthError("Invalid username or password".to_string()));
    }

    let token = sign_jwt(
        user.id,
        &user.username,
        &user.role,
        &config.jwt_secret,
        config.jwt_expiration,
    )?;

    tracing::info!("Admin {} logged in", user.username);

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "expires_in": config.jwt_expiration,
    })))
}

/// Returns the claims of the current token.
pub async fn current_session(Extension(claims): Extension<Claims>) -> impl IntoResponse {
    Json(json!({
        "user_id": claims.sub,
        "username": claims.username,
        "role": claims.role,
        "expires_at": claims.exp,
    }))
}
