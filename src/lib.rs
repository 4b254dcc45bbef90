//! Storefront API
//!
//! Catalog, cart, addresses and the checkout pipeline that turns a paid
//! gateway order into a recorded store order.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, patch, post, put},
    Extension, Router,
};
use sea_orm::DatabaseConnection;
use serde_json::json;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

use crate::auth::{roles, AuthRouterExt, AuthService};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

/// Routes mounted under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    let public = Router::new()
        .route("/status", get(api_status))
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/login", post(handlers::auth::login))
        .route("/products", get(handlers::products::list_products))
        .route("/products/:id", get(handlers::products::get_product))
        .route("/categories", get(handlers::products::list_categories))
        .route("/messages", post(handlers::messages::submit_message));

    let customer = Router::new()
        .route("/auth/change-password", post(handlers::auth::change_password))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route(
            "/profile",
            get(handlers::profile::get_profile).put(handlers::profile::update_profile),
        )
        .route(
            "/orders/create-payment-intent",
            post(handlers::orders::create_payment_intent),
        )
        .route("/orders/checkout", post(handlers::orders::checkout))
        .route("/orders/user", get(handlers::orders::list_user_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/cart",
            get(handlers::cart::get_cart).delete(handlers::cart::clear_cart),
        )
        .route("/cart/items", post(handlers::cart::add_item))
        .route(
            "/cart/items/:product_id",
            put(handlers::cart::update_item).delete(handlers::cart::remove_item),
        )
        .route(
            "/addresses",
            get(handlers::addresses::list_addresses).post(handlers::addresses::create_address),
        )
        .route(
            "/addresses/:id",
            put(handlers::addresses::update_address).delete(handlers::addresses::delete_address),
        )
        .with_auth();

    let staff = Router::new()
        .route("/products", post(handlers::products::create_product))
        .route(
            "/products/:id",
            put(handlers::products::update_product).delete(handlers::products::delete_product),
        )
        .route("/products/:id/stock", put(handlers::products::set_stock))
        .with_any_role(&[roles::STAFF, roles::ADMIN]);

    let admin = Router::new()
        .route("/admin/orders", get(handlers::admin::list_all_orders))
        .route(
            "/admin/orders/:id/status",
            put(handlers::admin::update_order_status),
        )
        .route(
            "/admin/staff",
            get(handlers::staff::list_staff).post(handlers::staff::create_staff),
        )
        .route(
            "/admin/staff/:id",
            put(handlers::staff::update_staff).delete(handlers::staff::delete_staff),
        )
        .route("/messages", get(handlers::messages::list_messages))
        .route("/messages/:id", delete(handlers::messages::delete_message))
        .route("/messages/:id/read", patch(handlers::messages::mark_read))
        .route("/messages/:id/reply", post(handlers::messages::reply_to_message))
        .with_role(roles::ADMIN);

    public.merge(customer).merge(staff).merge(admin)
}

/// Full application router without CORS or timeouts, which the binary adds
/// from configuration.
pub fn build_router(state: AppState, auth_service: Arc<AuthService>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(Extension(auth_service))
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses((status = 200, description = "Service version and environment")),
    tag = "system"
)]
pub async fn api_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Database reachable"),
        (status = 503, description = "Database unreachable"),
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let healthy = db::check_connection(&state.db).await.is_ok();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "checks": { "database": if healthy { "healthy" } else { "unhealthy" } },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status, Json(body)).into_response()
}
