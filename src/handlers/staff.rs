use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use uuid::Uuid;

use super::common::{created_response, no_content_response};
use crate::{
    errors::ServiceError,
    services::staff::{CreateStaffRequest, StaffResponse, StaffView, UpdateStaffRequest},
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/admin/staff",
    request_body = CreateStaffRequest,
    responses(
        (status = 201, description = "Staff account created", body = StaffResponse),
        (status = 400, description = "Email does not match name or staff domain", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "staff"
)]
pub async fn create_staff(
    State(state): State<AppState>,
    Json(request): Json<CreateStaffRequest>,
) -> Result<Response, ServiceError> {
    let response = state.services.staff.create(request).await?;
    Ok(created_response(response))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/staff",
    responses((status = 200, description = "Staff accounts", body = [StaffView])),
    security(("Bearer" = [])),
    tag = "staff"
)]
pub async fn list_staff(
    State(state): State<AppState>,
) -> Result<Json<Vec<StaffView>>, ServiceError> {
    Ok(Json(state.services.staff.list().await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/staff/{id}",
    params(("id" = Uuid, Path, description = "Staff user id")),
    request_body = UpdateStaffRequest,
    responses(
        (status = 200, description = "Staff account updated", body = StaffResponse),
        (status = 404, description = "No staff account with this id", body = crate::errors::ErrorResponse),
        (status = 409, description = "Derived email already in use", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "staff"
)]
pub async fn update_staff(
    State(state): State<AppState>,
    Path(staff_id): Path<Uuid>,
    Json(request): Json<UpdateStaffRequest>,
) -> Result<Json<StaffResponse>, ServiceError> {
    Ok(Json(state.services.staff.update(staff_id, request).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/staff/{id}",
    params(("id" = Uuid, Path, description = "Staff user id")),
    responses(
        (status = 204, description = "Staff account deleted"),
        (status = 404, description = "No staff account with this id", body = crate::errors::ErrorResponse),
        (status = 409, description = "Staff account has orders", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "staff"
)]
pub async fn delete_staff(
    State(state): State<AppState>,
    Path(staff_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.staff.delete(staff_id).await?;
    Ok(no_content_response())
}
