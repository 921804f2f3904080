//! Axum route handlers for password sign-in and password changes.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::session::{Identity, IdentityError, SessionContext};
use crate::state::AppState;

const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub access_token: String,
    pub identity: Identity,
}

#[derive(Debug, Deserialize)]
pub struct PasswordUpdateRequest {
    pub password: String,
    pub confirm_password: String,
}

fn rejected_as_validation(e: IdentityError) -> AppError {
    match e {
        IdentityError::Rejected { message, .. } => AppError::Validation(message),
        other => other.into(),
    }
}

/// POST /api/v1/auth/sign-in
pub async fn handle_sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> Result<Json<SignInResponse>, AppError> {
    let email = req.email.trim();
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation(
            "Email and password are required".to_string(),
        ));
    }
    let auth = state
        .identity
        .sign_in(email, &req.password)
        .await
        .map_err(rejected_as_validation)?;
    info!("User {} signed in", auth.identity.id);
    Ok(Json(SignInResponse {
        access_token: auth.access_token,
        identity: auth.identity,
    }))
}

/// PUT /api/v1/auth/password
/// Changes the password of the signed-in account.
pub async fn handle_update_password(
    State(state): State<AppState>,
    session: SessionContext,
    Json(req): Json<PasswordUpdateRequest>,
) -> Result<StatusCode, AppError> {
    validate_new_password(&req.password, &req.confirm_password)?;
    state
        .identity
        .update_password(session.access_token(), &req.password)
        .await
        .map_err(rejected_as_validation)?;
    info!("Password updated for {}", session.user_id());
    Ok(StatusCode::NO_CONTENT)
}

fn validate_new_password(password: &str, confirm: &str) -> Result<(), AppError> {
    if password.is_empty() || confirm.is_empty() {
        return Err(AppError::Validation(
            "Password and confirm password are required".to_string(),
        ));
    }
    if password != confirm {
        return Err(AppError::Validation("Passwords do not match".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}
