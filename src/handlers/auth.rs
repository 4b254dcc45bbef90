use axum::{extract::State, response::Response, Json};

use super::common::created_response;
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::accounts::{
        AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse, SignupRequest,
    },
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input or email not allowed for role", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<Response, ServiceError> {
    let response = state.services.accounts.signup(request).await?;
    Ok(created_response(response))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ServiceError> {
    Ok(Json(state.services.accounts.login(request).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "New password too short or too long", body = crate::errors::ErrorResponse),
        (status = 401, description = "Current password is incorrect", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "auth"
)]
pub async fn change_password(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let response = state
        .services
        .accounts
        .change_password(auth_user.user_uuid()?, request)
        .await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    responses(
        (status = 200, description = "Fresh token for the same account", body = AuthResponse),
        (status = 401, description = "Account gone, inactive or role changed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<AuthResponse>, ServiceError> {
    Ok(Json(state.services.accounts.refresh(&auth_user).await?))
}
