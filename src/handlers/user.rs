use axum::Json;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::models::UserResponse;

#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Current account profile", body = UserResponse),
        (status = 401, description = "Not authenticated"),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(user.sanitized()))
}
