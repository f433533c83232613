use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::auth::LoginOutcome;

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_password: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl AuthResponse {
    fn status(status: &'static str) -> Self {
        Self {
            status,
            message: None,
            phone: None,
            session_data: None,
            needs_password: None,
            warning: None,
        }
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|_| ApiError::BadRequest("Invalid request"))
}

fn required(value: &str) -> ApiResult<&str> {
    let value = value.trim();
    if value.is_empty() {
        Err(ApiError::BadRequest("Invalid request"))
    } else {
        Ok(value)
    }
}

fn outcome_response(outcome: LoginOutcome) -> ApiResult<Json<AuthResponse>> {
    match outcome {
        LoginOutcome::Authorized {
            phone,
            session,
            warning,
        } => Ok(Json(AuthResponse {
            phone: Some(phone),
            // Empty session_data with a warning means the store never flushed
            session_data: Some(session.map(|s| s.to_base64()).unwrap_or_default()),
            warning,
            ..AuthResponse::status("success")
        })),
        LoginOutcome::PasswordRequired => Ok(Json(AuthResponse {
            message: Some("Обліковий запис захищено 2FA паролем".to_string()),
            needs_password: Some(true),
            ..AuthResponse::status("password_required")
        })),
        LoginOutcome::Rejected(reason) => Err(ApiError::Rejected(reason)),
        LoginOutcome::Expired => Err(ApiError::Expired),
    }
}

pub async fn request_code(
    State(state): State<AppState>,
    payload: Result<Json<CodeRequest>, JsonRejection>,
) -> ApiResult<Json<AuthResponse>> {
    let request = body(payload)?;
    let phone = required(&request.phone)?;
    log::info!("Auth code requested for {}", phone);

    state.coordinator.begin_login(phone).await?;

    Ok(Json(AuthResponse {
        message: Some("Код відправлено в Telegram".to_string()),
        ..AuthResponse::status("code_sent")
    }))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<AuthResponse>> {
    let request = body(payload)?;
    let phone = required(&request.phone)?;
    let code = required(&request.code)?;
    log::info!("Login attempt for {}", phone);

    let outcome = state.completion.submit_code(phone, code).await?;
    outcome_response(outcome)
}

pub async fn submit_password(
    State(state): State<AppState>,
    payload: Result<Json<PasswordRequest>, JsonRejection>,
) -> ApiResult<Json<AuthResponse>> {
    let request = body(payload)?;
    let phone = required(&request.phone)?;
    if request.password.is_empty() {
        return Err(ApiError::BadRequest("Invalid request"));
    }
    log::info!("Password submitted for {}", phone);

    let outcome = state.completion.submit_password(phone, &request.password).await?;
    outcome_response(outcome)
}
