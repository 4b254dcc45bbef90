use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use uuid::Uuid;

use super::common::no_content_response;
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::cart::{AddCartItemRequest, CartView, UpdateCartItemRequest},
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Cart priced at current catalog prices", body = CartView),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<CartView>, ServiceError> {
    Ok(Json(state.services.cart.get(auth_user.user_uuid()?).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    request_body = AddCartItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartView),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<AddCartItemRequest>,
) -> Result<Json<CartView>, ServiceError> {
    let cart = state
        .services
        .cart
        .add_item(auth_user.user_uuid()?, request)
        .await?;
    Ok(Json(cart))
}

#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product id")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartView),
        (status = 404, description = "Product not in cart", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<UpdateCartItemRequest>,
) -> Result<Json<CartView>, ServiceError> {
    let cart = state
        .services
        .cart
        .set_quantity(auth_user.user_uuid()?, product_id, request.quantity)
        .await?;
    Ok(Json(cart))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Updated cart", body = CartView),
        (status = 404, description = "Product not in cart", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<CartView>, ServiceError> {
    let cart = state
        .services
        .cart
        .remove_item(auth_user.user_uuid()?, product_id)
        .await?;
    Ok(Json(cart))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    responses((status = 204, description = "Cart cleared")),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Response, ServiceError> {
    state.services.cart.clear(auth_user.user_uuid()?).await?;
    Ok(no_content_response())
}
