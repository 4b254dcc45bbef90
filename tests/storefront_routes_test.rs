//! Accounts, catalog, cart, addresses and admin routes through the full router.

mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::{auth::Role, middleware_helpers::REQUEST_ID_HEADER};

#[tokio::test]
async fn signup_then_login() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/signup",
            Some(json!({
                "name": "Asha Rao",
                "email": "Asha@Example.com",
                "password": "correct horse battery"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["message"], "User created successfully");
    assert_eq!(body["user"]["email"], "asha@example.com");
    assert_eq!(body["user"]["role"], "USER");
    assert!(body["user"].get("passwordHash").is_none());
    let token = body["token"]["access_token"].as_str().unwrap().to_string();

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/signup",
            Some(json!({
                "name": "Asha Again",
                "email": "asha@example.com",
                "password": "another password"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({"email": "asha@example.com", "password": "correct horse battery"})),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["message"], "Login successful");

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({"email": "asha@example.com", "password": "wrong password"})),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn staff_role_requires_the_staff_domain() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/signup",
            Some(json!({
                "name": "Not Staff",
                "email": "someone@gmail.com",
                "password": "long enough password",
                "role": "STAFF"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/signup",
            Some(json!({
                "name": "Packer",
                "email": "packer@connectingbee.in",
                "password": "long enough password",
                "role": "STAFF"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response_json(response).await["user"]["role"], "STAFF");
}

#[tokio::test]
async fn catalog_writes_are_staff_only() {
    let app = TestApp::new().await;
    let (_, customer) = app.create_user("asha@example.com", Role::User).await;
    let (_, staff) = app.create_user("packer@connectingbee.in", Role::Staff).await;
    let (_, admin) = app.create_user("admin@connectingbee.in", Role::Admin).await;

    let product = json!({
        "name": "Wildflower Honey 500g",
        "category": "honey",
        "price": "349.00",
        "stock": 12
    });

    let response = app
        .request(Method::POST, "/api/v1/products", Some(product.clone()), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(Method::POST, "/api/v1/products", Some(product.clone()), Some(&customer))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(Method::POST, "/api/v1/products", Some(product), Some(&staff))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = response_json(response).await;
    let product_id = created["id"].as_str().unwrap().to_string();
    assert_eq!(decimal(&created["price"]), dec!(349.00));

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/products/{}/stock", product_id),
            Some(json!({"stock": 3})),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["stock"], 3);

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/products/{}/stock", product_id),
            Some(json!({"stock": -1})),
            Some(&staff),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(json!({"name": "Bad Price", "price": "-1.00", "stock": 1})),
            Some(&staff),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // reads stay public
    let response = app
        .request(Method::GET, "/api/v1/products?category=honey", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = response_json(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["products"][0]["name"], "Wildflower Honey 500g");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/products/{}", product_id),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn cart_lines_are_priced_and_editable() {
    let app = TestApp::new().await;
    let (_, token) = app.create_user("asha@example.com", Role::User).await;
    let honey = app.create_product("Acacia Honey", dec!(229.50), 10).await;
    let dipper = app.create_product("Honey Dipper", dec!(99.00), 10).await;

    for (product_id, quantity) in [(honey, 1), (dipper, 2), (honey, 1)] {
        let response = app
            .request(
                Method::POST,
                "/api/v1/cart/items",
                Some(json!({"productId": product_id, "quantity": quantity})),
                Some(&token),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let cart = response_json(app.request(Method::GET, "/api/v1/cart", None, Some(&token)).await).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 2);
    assert_eq!(decimal(&cart["total"]), dec!(657.00));

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", dipper),
            Some(json!({"quantity": 0})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cart = response_json(response).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
    assert_eq!(decimal(&cart["total"]), dec!(459.00));

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/cart/items/{}", dipper),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({"productId": uuid::Uuid::new_v4(), "quantity": 1})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(Method::DELETE, "/api/v1/cart", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cart = response_json(app.request(Method::GET, "/api/v1/cart", None, Some(&token)).await).await;
    assert!(cart["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn addresses_are_private_to_their_owner() {
    let app = TestApp::new().await;
    let (_, owner) = app.create_user("asha@example.com", Role::User).await;
    let (_, other) = app.create_user("ravi@example.com", Role::User).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/addresses",
            Some(json!({
                "name": "Asha Rao",
                "phone": "9876543210",
                "pincode": "560001",
                "address1": "12 MG Road",
                "city": "Bengaluru",
                "state": "Karnataka"
            })),
            Some(&owner),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let address = response_json(response).await;
    assert_eq!(address["country"], "India");
    let address_id = address["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            "/api/v1/addresses",
            Some(json!({
                "name": "Asha Rao",
                "phone": "12",
                "pincode": "ABC",
                "address1": "12 MG Road",
                "city": "Bengaluru",
                "state": "Karnataka"
            })),
            Some(&owner),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let listed =
        response_json(app.request(Method::GET, "/api/v1/addresses", None, Some(&other)).await).await;
    assert!(listed.as_array().unwrap().is_empty());

    let uri = format!("/api/v1/addresses/{}", address_id);
    let response = app.request(Method::DELETE, &uri, None, Some(&other)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.request(Method::DELETE, &uri, None, Some(&owner)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn address_on_an_order_cannot_be_deleted() {
    let app = TestApp::new().await;
    let (user_id, token) = app.create_user("asha@example.com", Role::User).await;
    let product_id = app.create_product("Honey Dipper", dec!(99.00), 10).await;
    let address_id = app.create_address(user_id).await;
    let intent_id = app.create_intent(user_id, 9_900).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/checkout",
            Some(json!({
                "intentId": intent_id,
                "paymentId": "pay_addr_keep",
                "signature": app.sign(&intent_id, "pay_addr_keep"),
                "items": [{"productId": product_id, "quantity": 1}],
                "addressId": address_id,
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/addresses/{}", address_id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_lists_and_updates_orders() {
    let app = TestApp::new().await;
    let (user_id, token) = app.create_user("asha@example.com", Role::User).await;
    let (_, admin) = app.create_user("admin@connectingbee.in", Role::Admin).await;
    let (_, staff) = app.create_user("packer@connectingbee.in", Role::Staff).await;
    let product_id = app.create_product("Honey Dipper", dec!(99.00), 10).await;
    let address_id = app.create_address(user_id).await;
    let intent_id = app.create_intent(user_id, 9_900).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/checkout",
            Some(json!({
                "intentId": intent_id,
                "paymentId": "pay_admin_view",
                "signature": app.sign(&intent_id, "pay_admin_view"),
                "items": [{"productId": product_id, "quantity": 1}],
                "addressId": address_id,
            })),
            Some(&token),
        )
        .await;
    let order_id = response_json(response).await["order"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    for forbidden in [&token, &staff] {
        let response = app
            .request(Method::GET, "/api/v1/admin/orders", None, Some(forbidden))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    let response = app
        .request(Method::GET, "/api/v1/admin/orders?status=PAID", None, Some(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = response_json(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["orders"][0]["id"], order_id.as_str());

    let response = app
        .request(Method::GET, "/api/v1/admin/orders?status=PENDING", None, Some(&admin))
        .await;
    assert_eq!(response_json(response).await["total"], 0);

    // checkout writes PAID, which is terminal
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/status", order_id),
            Some(json!({"status": "FAILED"})),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/status", uuid::Uuid::new_v4()),
            Some(json!({"status": "PAID"})),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_status_docs_and_request_ids() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    assert_eq!(response_json(response).await["status"], "healthy");

    let response = app.request(Method::GET, "/api/v1/status", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["environment"], "test");

    let response = app
        .request(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = response_json(response).await;
    assert!(doc["paths"]["/api/v1/orders/checkout"].is_object());

    let response = app
        .request(Method::GET, "/api/v1/products/not-a-uuid", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
