use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::created_response;
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::{
        checkout::CheckoutRequest,
        orders::OrderView,
        payment_intents::{CreateIntentRequest, PaymentIntentResponse},
    },
    AppState,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub message: String,
    pub order: OrderView,
}

/// Create a gateway payment intent for the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/orders/create-payment-intent",
    summary = "Create payment intent",
    description = "Computes the cart total server-side and requests a gateway order reference for it. \
                   A client-supplied amount (minor units) is only used as a cross-check.",
    request_body = CreateIntentRequest,
    responses(
        (status = 201, description = "Intent created", body = PaymentIntentResponse),
        (status = 400, description = "Empty cart or amount mismatch", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 422, description = "A cart line exceeds available stock", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "checkout"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    auth_user: AuthUser,
    payload: Option<Json<CreateIntentRequest>>,
) -> Result<Response, ServiceError> {
    let user_id = auth_user.user_uuid()?;
    let request = payload.map(|Json(body)| body).unwrap_or_default();
    let intent = state
        .services
        .payment_intents
        .create_intent(user_id, request)
        .await?;
    Ok(created_response(intent))
}

/// Verify a gateway payment and place the order
#[utoipa::path(
    post,
    path = "/api/v1/orders/checkout",
    summary = "Checkout",
    description = "Verifies the gateway signature, reserves stock for every line and records the order \
                   in one transaction. Replaying a payment id returns the order already recorded for it.",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order placed", body = CheckoutResponse),
        (status = 200, description = "Order already recorded for this payment", body = CheckoutResponse),
        (status = 400, description = "Invalid signature, validation failure or amount mismatch", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown intent, address or product", body = crate::errors::ErrorResponse),
        (status = 409, description = "Payment already used", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 500, description = "Persistence failure", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<Response, ServiceError> {
    let user_id = auth_user.user_uuid()?;
    let outcome = state.services.checkout.checkout(user_id, request).await?;

    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    let body = CheckoutResponse {
        message: "Order placed successfully".to_string(),
        order: outcome.order,
    };
    Ok((status, Json(body)).into_response())
}

/// Orders placed by the caller, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders/user",
    responses(
        (status = 200, description = "Caller's orders", body = [OrderView]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_user_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<Vec<OrderView>>, ServiceError> {
    let orders = state
        .services
        .orders
        .list_for_user(auth_user.user_uuid()?)
        .await?;
    Ok(Json(orders))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items", body = OrderView),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<OrderView>, ServiceError> {
    let order = state
        .services
        .orders
        .get_for_user(auth_user.user_uuid()?, order_id)
        .await?;
    Ok(Json(order))
}
