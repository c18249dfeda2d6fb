use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use validator::Validate;

use crate::dtos::{RegisterRequest, RegisterResponse};
use crate::error::AppError;
use crate::models::User;
use crate::services::ServiceError;
use crate::utils::{hash_password, Password};
use crate::AppState;

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = RegisterResponse),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Validation failed"),
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    req.validate()?;

    if state.accounts.find_by_email(&req.email).await?.is_some() {
        return Err(ServiceError::EmailAlreadyRegistered.into());
    }

    // Hashing happens here, not inside a persistence hook, so the cost and
    // the failure mode are visible at the call site.
    let password_hash = hash_password(&Password::new(req.password))?;
    let user = User::new_password(req.email, password_hash, req.display_name);
    state.accounts.insert(&user).await?;

    tracing::info!(user_id = %user.user_id, "Account registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.user_id.to_string(),
            message: "Registration successful".to_string(),
        }),
    ))
}
