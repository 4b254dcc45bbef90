//! HTTP gateway client against a local mock of the order-creation endpoint.

use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use storefront_api::{
    errors::ServiceError,
    services::payment_gateway::{GatewayOrderRequest, HttpPaymentGateway, PaymentGateway},
};
use wiremock::{
    matchers::{basic_auth, body_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn client(server: &MockServer, timeout: Duration) -> HttpPaymentGateway {
    // trailing slash must not produce a double slash in the endpoint
    HttpPaymentGateway::new(
        format!("{}/v1/", server.uri()),
        "rzp_test_key",
        "rzp_test_secret",
        timeout,
    )
    .expect("client builds")
}

fn order_request() -> GatewayOrderRequest {
    GatewayOrderRequest::new(24_100, "INR", "receipt_abc")
}

#[tokio::test]
async fn creates_order_with_basic_auth_and_minor_units() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .and(basic_auth("rzp_test_key", "rzp_test_secret"))
        .and(body_json(json!({
            "amount": 24100,
            "currency": "INR",
            "receipt": "receipt_abc",
            "payment_capture": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_IluGWxBm9U8zJ8",
            "entity": "order",
            "amount": 24100,
            "currency": "INR",
            "receipt": "receipt_abc",
            "status": "created"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let order = client(&server, Duration::from_secs(2))
        .create_order(&order_request())
        .await
        .expect("order created");

    assert_eq!(order.id, "order_IluGWxBm9U8zJ8");
    assert_eq!(order.amount, 24_100);
    assert_eq!(order.status.as_deref(), Some("created"));
}

#[tokio::test]
async fn rejected_credentials_become_gateway_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": "BAD_REQUEST_ERROR", "description": "Authentication failed"}
        })))
        .mount(&server)
        .await;

    let result = client(&server, Duration::from_secs(2))
        .create_order(&order_request())
        .await;
    assert_matches!(result, Err(ServiceError::GatewayError(msg)) if msg.contains("401"));
}

#[tokio::test]
async fn slow_gateway_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "order_late", "amount": 24100, "currency": "INR"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let result = client(&server, Duration::from_millis(200))
        .create_order(&order_request())
        .await;
    assert_matches!(result, Err(ServiceError::GatewayError(msg)) if msg.contains("timed out"));
}

#[tokio::test]
async fn echoed_amount_must_match_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_wrong",
            "amount": 100,
            "currency": "INR"
        })))
        .mount(&server)
        .await;

    let result = client(&server, Duration::from_secs(2))
        .create_order(&order_request())
        .await;
    assert_matches!(result, Err(ServiceError::GatewayError(_)));
}

#[tokio::test]
async fn malformed_body_is_a_gateway_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let result = client(&server, Duration::from_secs(2))
        .create_order(&order_request())
        .await;
    assert_matches!(result, Err(ServiceError::GatewayError(msg)) if msg.contains("malformed"));
}

#[tokio::test]
async fn unreachable_gateway_is_a_gateway_error() {
    let gateway = HttpPaymentGateway::new(
        "http://127.0.0.1:9",
        "rzp_test_key",
        "rzp_test_secret",
        Duration::from_millis(500),
    )
    .expect("client builds");

    let result = gateway.create_order(&order_request()).await;
    assert_matches!(result, Err(ServiceError::GatewayError(_)));
}
