use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront API

Catalog, cart, delivery addresses and checkout for the storefront web client.

## Checkout

1. `POST /api/v1/orders/create-payment-intent` returns a gateway order reference
   (`intentId`) for the server-computed cart total, in minor currency units.
2. The client pays the gateway directly.
3. `POST /api/v1/orders/checkout` sends back the gateway identifiers and
   signature. The server verifies the signature, reserves stock and records the
   order in one transaction. Replaying the same `paymentId` returns the order
   already recorded for it.

## Authentication

Obtain a token from `/api/v1/auth/login` or `/api/v1/auth/signup` and send it as

```
Authorization: Bearer <token>
```

## Errors

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock for product 550e8400-e29b-41d4-a716-446655440000",
  "details": "550e8400-e29b-41d4-a716-446655440000",
  "request_id": "9f0c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
"#,
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "checkout", description = "Payment intents and order placement"),
        (name = "orders", description = "Customer order history"),
        (name = "admin", description = "Order administration"),
        (name = "products", description = "Catalog"),
        (name = "cart", description = "Shopping cart"),
        (name = "addresses", description = "Delivery addresses"),
        (name = "auth", description = "Signup, login, token refresh and password changes"),
        (name = "profile", description = "The caller's own account"),
        (name = "staff", description = "Staff account administration"),
        (name = "messages", description = "Contact form inbox"),
        (name = "system", description = "Health and status"),
    ),
    paths(
        crate::health_check,
        crate::api_status,
        crate::handlers::orders::create_payment_intent,
        crate::handlers::orders::checkout,
        crate::handlers::orders::list_user_orders,
        crate::handlers::orders::get_order,
        crate::handlers::admin::list_all_orders,
        crate::handlers::admin::update_order_status,
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::create_product,
        crate::handlers::products::set_stock,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,
        crate::handlers::products::list_categories,
        crate::handlers::cart::get_cart,
        crate::handlers::cart::add_item,
        crate::handlers::cart::update_item,
        crate::handlers::cart::remove_item,
        crate::handlers::cart::clear_cart,
        crate::handlers::addresses::list_addresses,
        crate::handlers::addresses::create_address,
        crate::handlers::addresses::update_address,
        crate::handlers::addresses::delete_address,
        crate::handlers::auth::signup,
        crate::handlers::auth::login,
        crate::handlers::auth::change_password,
        crate::handlers::auth::refresh,
        crate::handlers::profile::get_profile,
        crate::handlers::profile::update_profile,
        crate::handlers::staff::create_staff,
        crate::handlers::staff::list_staff,
        crate::handlers::staff::update_staff,
        crate::handlers::staff::delete_staff,
        crate::handlers::messages::submit_message,
        crate::handlers::messages::list_messages,
        crate::handlers::messages::mark_read,
        crate::handlers::messages::reply_to_message,
        crate::handlers::messages::delete_message,
    ),
    components(
        schemas(
            crate::services::checkout::CheckoutRequest,
            crate::services::checkout::CheckoutItem,
            crate::handlers::orders::CheckoutResponse,
            crate::services::payment_intents::CreateIntentRequest,
            crate::services::payment_intents::PaymentIntentResponse,
            crate::services::orders::OrderView,
            crate::services::orders::OrderItemView,
            crate::services::orders::OrderPage,
            crate::handlers::admin::UpdateOrderStatusRequest,
            crate::entities::OrderStatus,
            crate::services::catalog::ProductView,
            crate::services::catalog::ProductPage,
            crate::services::catalog::CreateProductRequest,
            crate::services::catalog::SetStockRequest,
            crate::services::catalog::UpdateProductRequest,
            crate::services::catalog::CategoryView,
            crate::services::cart::CartView,
            crate::services::cart::CartLine,
            crate::services::cart::AddCartItemRequest,
            crate::services::cart::UpdateCartItemRequest,
            crate::services::addresses::AddressView,
            crate::services::addresses::CreateAddressRequest,
            crate::services::accounts::SignupRequest,
            crate::services::accounts::LoginRequest,
            crate::services::accounts::AuthResponse,
            crate::services::accounts::UserView,
            crate::services::accounts::ChangePasswordRequest,
            crate::services::accounts::UpdateProfileRequest,
            crate::services::accounts::MessageResponse,
            crate::services::staff::CreateStaffRequest,
            crate::services::staff::UpdateStaffRequest,
            crate::services::staff::StaffView,
            crate::services::staff::StaffResponse,
            crate::services::messages::SubmitMessageRequest,
            crate::services::messages::ReplyRequest,
            crate::services::messages::MessageView,
            crate::entities::MessageStatus,
            crate::auth::AccountStatus,
            crate::auth::Role,
            crate::auth::TokenPair,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
