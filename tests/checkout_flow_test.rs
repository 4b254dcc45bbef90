//! End-to-end checkout through the HTTP router.
//!
//! Covers the intent -> pay -> checkout sequence, replays of the same payment,
//! and every rejection path leaving stock untouched.

mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, response_json, StubGateway, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait};
use serde_json::json;
use storefront_api::{
    auth::Role,
    entities::{order, payment_intent, IntentStatus},
};

#[tokio::test]
async fn cart_to_paid_order_happy_path() {
    let app = TestApp::new().await;
    let (user_id, token) = app.create_user("asha@example.com", Role::User).await;
    let product_id = app.create_product("Wildflower Honey", dec!(120.50), 10).await;
    let address_id = app.create_address(user_id).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({"productId": product_id, "quantity": 2})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/create-payment-intent",
            Some(json!({})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let intent = response_json(response).await;
    assert_eq!(intent["amount"], 24100);
    assert_eq!(intent["currency"], "INR");
    let intent_id = intent["intentId"].as_str().unwrap().to_string();

    let payload = json!({
        "intentId": intent_id,
        "paymentId": "pay_happy_1",
        "signature": app.sign(&intent_id, "pay_happy_1"),
        "items": [{"productId": product_id, "quantity": 2}],
        "total": "241.00",
        "addressId": address_id,
    });
    let response = app
        .request(Method::POST, "/api/v1/orders/checkout", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Order placed successfully");
    let order = &body["order"];
    assert_eq!(order["status"], "PAID");
    assert_eq!(order["paymentId"], "pay_happy_1");
    assert_eq!(order["paymentIntentId"], intent_id.as_str());
    assert_eq!(decimal(&order["totalAmount"]), dec!(241.00));
    assert_eq!(order["items"].as_array().unwrap().len(), 1);
    assert_eq!(decimal(&order["items"][0]["unitPrice"]), dec!(120.50));
    assert!(order["orderNumber"].as_str().unwrap().starts_with("ORD-"));
    let order_id = order["id"].as_str().unwrap().to_string();

    assert_eq!(app.product_stock(product_id).await, 8);

    // purchased lines leave the cart
    let cart = response_json(app.request(Method::GET, "/api/v1/cart", None, Some(&token)).await).await;
    assert!(cart["items"].as_array().unwrap().is_empty());

    let orders =
        response_json(app.request(Method::GET, "/api/v1/orders/user", None, Some(&token)).await)
            .await;
    assert_eq!(orders.as_array().unwrap().len(), 1);
    assert_eq!(orders[0]["id"], order_id.as_str());

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (_, other_token) = app.create_user("ravi@example.com", Role::User).await;
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            None,
            Some(&other_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn replaying_a_payment_returns_the_recorded_order() {
    let app = TestApp::new().await;
    let (user_id, token) = app.create_user("asha@example.com", Role::User).await;
    let product_id = app.create_product("Acacia Honey", dec!(229.50), 5).await;
    let address_id = app.create_address(user_id).await;
    let intent_id = app.create_intent(user_id, 22950).await;

    let payload = json!({
        "intentId": intent_id,
        "paymentId": "pay_replay",
        "signature": app.sign(&intent_id, "pay_replay"),
        "items": [{"productId": product_id, "quantity": 1}],
        "addressId": address_id,
    });

    let first = app
        .request(Method::POST, "/api/v1/orders/checkout", Some(payload.clone()), Some(&token))
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = response_json(first).await;

    let second = app
        .request(Method::POST, "/api/v1/orders/checkout", Some(payload), Some(&token))
        .await;
    assert_eq!(second.status(), StatusCode::OK);
    let second = response_json(second).await;

    assert_eq!(first["order"]["id"], second["order"]["id"]);
    assert_eq!(app.product_stock(product_id).await, 4);
}

#[tokio::test]
async fn tampered_signature_is_rejected_without_touching_stock() {
    let app = TestApp::new().await;
    let (user_id, token) = app.create_user("asha@example.com", Role::User).await;
    let product_id = app.create_product("Bee Pollen", dec!(275.00), 3).await;
    let address_id = app.create_address(user_id).await;
    let intent_id = app.create_intent(user_id, 27500).await;

    let mut signature = app.sign(&intent_id, "pay_forged");
    let last = if signature.ends_with('0') { "1" } else { "0" };
    signature.replace_range(63..64, last);

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/checkout",
            Some(json!({
                "intentId": intent_id,
                "paymentId": "pay_forged",
                "signature": signature,
                "items": [{"productId": product_id, "quantity": 1}],
                "addressId": address_id,
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Payment verification failed");

    assert_eq!(app.product_stock(product_id).await, 3);
    let orders =
        response_json(app.request(Method::GET, "/api/v1/orders/user", None, Some(&token)).await)
            .await;
    assert!(orders.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn insufficient_stock_names_the_product_and_rolls_back_every_line() {
    let app = TestApp::new().await;
    let (user_id, token) = app.create_user("asha@example.com", Role::User).await;
    let plenty = app.create_product("Honey Dipper", dec!(99.00), 50).await;
    let scarce = app.create_product("Comb Honey Frame", dec!(899.00), 1).await;
    let address_id = app.create_address(user_id).await;
    let intent_id = app.create_intent(user_id, 99_00 * 3 + 899_00 * 2).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/checkout",
            Some(json!({
                "intentId": intent_id,
                "paymentId": "pay_short",
                "signature": app.sign(&intent_id, "pay_short"),
                "items": [
                    {"productId": plenty, "quantity": 3},
                    {"productId": scarce, "quantity": 2}
                ],
                "addressId": address_id,
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Unprocessable Entity");
    assert_eq!(body["details"], scarce.to_string());

    assert_eq!(app.product_stock(plenty).await, 50);
    assert_eq!(app.product_stock(scarce).await, 1);
}

#[tokio::test]
async fn duplicate_lines_are_merged_before_pricing() {
    let app = TestApp::new().await;
    let (user_id, token) = app.create_user("asha@example.com", Role::User).await;
    let product_id = app.create_product("Beeswax Candle Set", dec!(499.00), 4).await;
    let address_id = app.create_address(user_id).await;
    let intent_id = app.create_intent(user_id, 149_700).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/checkout",
            Some(json!({
                "intentId": intent_id,
                "paymentId": "pay_merge",
                "signature": app.sign(&intent_id, "pay_merge"),
                "items": [
                    {"productId": product_id, "quantity": 1},
                    {"productId": product_id, "quantity": 2}
                ],
                "addressId": address_id,
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let items = body["order"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 3);
    assert_eq!(decimal(&body["order"]["totalAmount"]), dec!(1497.00));
    assert_eq!(app.product_stock(product_id).await, 1);
}

#[tokio::test]
async fn amount_mismatch_against_intent_is_rejected() {
    let app = TestApp::new().await;
    let (user_id, token) = app.create_user("asha@example.com", Role::User).await;
    let product_id = app.create_product("Wildflower Honey", dec!(349.00), 10).await;
    let address_id = app.create_address(user_id).await;
    // intent issued for a single jar, checkout claims two
    let intent_id = app.create_intent(user_id, 34_900).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/checkout",
            Some(json!({
                "intentId": intent_id,
                "paymentId": "pay_more",
                "signature": app.sign(&intent_id, "pay_more"),
                "items": [{"productId": product_id, "quantity": 2}],
                "addressId": address_id,
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.product_stock(product_id).await, 10);
}

#[tokio::test]
async fn client_total_must_match_server_total() {
    let app = TestApp::new().await;
    let (user_id, token) = app.create_user("asha@example.com", Role::User).await;
    let product_id = app.create_product("Wildflower Honey", dec!(349.00), 10).await;
    let address_id = app.create_address(user_id).await;
    let intent_id = app.create_intent(user_id, 34_900).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/checkout",
            Some(json!({
                "intentId": intent_id,
                "paymentId": "pay_total",
                "signature": app.sign(&intent_id, "pay_total"),
                "items": [{"productId": product_id, "quantity": 1}],
                "total": "1.00",
                "addressId": address_id,
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.product_stock(product_id).await, 10);
}

#[tokio::test]
async fn another_users_intent_or_address_is_not_found() {
    let app = TestApp::new().await;
    let (owner_id, _) = app.create_user("asha@example.com", Role::User).await;
    let (intruder_id, intruder_token) = app.create_user("ravi@example.com", Role::User).await;
    let product_id = app.create_product("Honey Dipper", dec!(99.00), 10).await;
    let owner_address = app.create_address(owner_id).await;
    let intruder_address = app.create_address(intruder_id).await;
    let owner_intent = app.create_intent(owner_id, 9_900).await;
    let intruder_intent = app.create_intent(intruder_id, 9_900).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/checkout",
            Some(json!({
                "intentId": owner_intent,
                "paymentId": "pay_steal",
                "signature": app.sign(&owner_intent, "pay_steal"),
                "items": [{"productId": product_id, "quantity": 1}],
                "addressId": intruder_address,
            })),
            Some(&intruder_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/checkout",
            Some(json!({
                "intentId": intruder_intent,
                "paymentId": "pay_addr",
                "signature": app.sign(&intruder_intent, "pay_addr"),
                "items": [{"productId": product_id, "quantity": 1}],
                "addressId": owner_address,
            })),
            Some(&intruder_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.product_stock(product_id).await, 10);
}

#[tokio::test]
async fn payment_id_recorded_for_another_user_conflicts() {
    let app = TestApp::new().await;
    let (first_id, first_token) = app.create_user("asha@example.com", Role::User).await;
    let (second_id, second_token) = app.create_user("ravi@example.com", Role::User).await;
    let product_id = app.create_product("Honey Dipper", dec!(99.00), 10).await;

    let first_intent = app.create_intent(first_id, 9_900).await;
    let first_address = app.create_address(first_id).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/checkout",
            Some(json!({
                "intentId": first_intent,
                "paymentId": "pay_shared",
                "signature": app.sign(&first_intent, "pay_shared"),
                "items": [{"productId": product_id, "quantity": 1}],
                "addressId": first_address,
            })),
            Some(&first_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let second_intent = app.create_intent(second_id, 9_900).await;
    let second_address = app.create_address(second_id).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/checkout",
            Some(json!({
                "intentId": second_intent,
                "paymentId": "pay_shared",
                "signature": app.sign(&second_intent, "pay_shared"),
                "items": [{"productId": product_id, "quantity": 1}],
                "addressId": second_address,
            })),
            Some(&second_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(app.product_stock(product_id).await, 9);
}

#[tokio::test]
async fn settled_intent_cannot_back_a_second_payment() {
    let app = TestApp::new().await;
    let (user_id, token) = app.create_user("asha@example.com", Role::User).await;
    let product_id = app.create_product("Honey Dipper", dec!(99.00), 10).await;
    let address_id = app.create_address(user_id).await;
    let intent_id = app.create_intent(user_id, 9_900).await;

    for (payment_id, expected) in [
        ("pay_first", StatusCode::CREATED),
        ("pay_second", StatusCode::CONFLICT),
    ] {
        let response = app
            .request(
                Method::POST,
                "/api/v1/orders/checkout",
                Some(json!({
                    "intentId": intent_id,
                    "paymentId": payment_id,
                    "signature": app.sign(&intent_id, payment_id),
                    "items": [{"productId": product_id, "quantity": 1}],
                    "addressId": address_id,
                })),
                Some(&token),
            )
            .await;
        assert_eq!(response.status(), expected, "payment {}", payment_id);
    }
    assert_eq!(app.product_stock(product_id).await, 9);
}

#[tokio::test]
async fn checkout_validation_and_auth() {
    let app = TestApp::new().await;
    let (user_id, token) = app.create_user("asha@example.com", Role::User).await;
    let address_id = app.create_address(user_id).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/checkout",
            Some(json!({
                "intentId": "order_x",
                "paymentId": "pay_x",
                "signature": "00",
                "items": [],
                "addressId": address_id,
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/checkout",
            Some(json!({
                "intentId": "order_x",
                "paymentId": "pay_x",
                "signature": app.sign("order_x", "pay_x"),
                "items": [],
                "addressId": address_id,
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn payment_intent_rejects_empty_cart_and_mismatched_amount() {
    let app = TestApp::new().await;
    let (user_id, token) = app.create_user("asha@example.com", Role::User).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/create-payment-intent",
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let product_id = app.create_product("Honey Dipper", dec!(99.00), 10).await;
    app.add_to_cart(user_id, product_id, 1).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/create-payment-intent",
            Some(json!({"amount": 100})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        app.gateway.calls.load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}

#[tokio::test]
async fn gateway_outage_surfaces_as_bad_gateway() {
    let app = TestApp::with_gateway(StubGateway::failing()).await;
    let (user_id, token) = app.create_user("asha@example.com", Role::User).await;
    let product_id = app.create_product("Honey Dipper", dec!(99.00), 10).await;
    app.add_to_cart(user_id, product_id, 1).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/create-payment-intent",
            Some(json!({"amount": 9900})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Payment gateway unavailable");
}

#[tokio::test]
async fn failed_order_write_releases_reserved_stock() {
    let app = TestApp::new().await;
    let (user_id, token) = app.create_user("asha@example.com", Role::User).await;
    let product_id = app.create_product("Multiflora Honey", dec!(310.00), 6).await;
    let address_id = app.create_address(user_id).await;
    app.add_to_cart(user_id, product_id, 2).await;
    let intent_id = app.create_intent(user_id, 62_000).await;

    // reservation succeeds, then the order line insert aborts
    app.db()
        .execute_unprepared(
            "CREATE TRIGGER reject_order_items BEFORE INSERT ON order_items \
             BEGIN SELECT RAISE(ABORT, 'order items unavailable'); END;",
        )
        .await
        .unwrap();

    let payload = json!({
        "intentId": intent_id,
        "paymentId": "pay_write_fails",
        "signature": app.sign(&intent_id, "pay_write_fails"),
        "items": [{"productId": product_id, "quantity": 2}],
        "addressId": address_id,
    });
    let response = app
        .request(Method::POST, "/api/v1/orders/checkout", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    assert_eq!(app.product_stock(product_id).await, 6);
    assert_eq!(order::Entity::find().count(app.db()).await.unwrap(), 0);
    let intent = payment_intent::Entity::find_by_id(intent_id.clone())
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(intent.status, IntentStatus::Created);
    assert_eq!(intent.payment_id, None);

    let cart = response_json(app.request(Method::GET, "/api/v1/cart", None, Some(&token)).await).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
}
