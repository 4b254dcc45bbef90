use axum::{extract::State, Json};

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::accounts::{UpdateProfileRequest, UserView},
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/profile",
    responses(
        (status = 200, description = "Caller's account", body = UserView),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "profile"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<UserView>, ServiceError> {
    Ok(Json(
        state.services.accounts.profile(auth_user.user_uuid()?).await?,
    ))
}

#[utoipa::path(
    put,
    path = "/api/v1/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserView),
        (status = 400, description = "Email not allowed for the account's role", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already in use", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "profile"
)]
pub async fn update_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserView>, ServiceError> {
    let user = state
        .services
        .accounts
        .update_profile(auth_user.user_uuid()?, request)
        .await?;
    Ok(Json(user))
}
