use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use uuid::Uuid;

use super::common::{created_response, no_content_response};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::addresses::{AddressView, CreateAddressRequest},
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/addresses",
    responses((status = 200, description = "Caller's addresses", body = [AddressView])),
    security(("Bearer" = [])),
    tag = "addresses"
)]
pub async fn list_addresses(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<Vec<AddressView>>, ServiceError> {
    Ok(Json(
        state.services.addresses.list(auth_user.user_uuid()?).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/addresses",
    request_body = CreateAddressRequest,
    responses(
        (status = 201, description = "Address saved", body = AddressView),
        (status = 400, description = "Invalid address", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "addresses"
)]
pub async fn create_address(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateAddressRequest>,
) -> Result<Response, ServiceError> {
    let address = state
        .services
        .addresses
        .create(auth_user.user_uuid()?, request)
        .await?;
    Ok(created_response(address))
}

#[utoipa::path(
    put,
    path = "/api/v1/addresses/{id}",
    params(("id" = Uuid, Path, description = "Address id")),
    request_body = CreateAddressRequest,
    responses(
        (status = 200, description = "Address updated", body = AddressView),
        (status = 400, description = "Invalid address", body = crate::errors::ErrorResponse),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "addresses"
)]
pub async fn update_address(
    State(state): State<AppState>,
    Path(address_id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<CreateAddressRequest>,
) -> Result<Json<AddressView>, ServiceError> {
    let address = state
        .services
        .addresses
        .update(auth_user.user_uuid()?, address_id, request)
        .await?;
    Ok(Json(address))
}

#[utoipa::path(
    delete,
    path = "/api/v1/addresses/{id}",
    params(("id" = Uuid, Path, description = "Address id")),
    responses(
        (status = 204, description = "Address deleted"),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Address is used by an order", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "addresses"
)]
pub async fn delete_address(
    State(state): State<AppState>,
    Path(address_id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Response, ServiceError> {
    state
        .services
        .addresses
        .delete(auth_user.user_uuid()?, address_id)
        .await?;
    Ok(no_content_response())
}
