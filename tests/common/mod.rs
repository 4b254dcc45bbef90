#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use storefront_api::{
    auth::{user, AccountStatus, AuthConfig, AuthService, Role},
    config::AppConfig,
    db,
    entities::{address, cart_item, payment_intent, product, IntentStatus},
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        payment_gateway::{GatewayOrder, GatewayOrderRequest, PaymentGateway},
        signature::SignatureVerifier,
    },
    AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const GATEWAY_SECRET: &str = "gateway_test_secret";
const JWT_SECRET: &str = "k9Qw2Er7Ty4Ui1Op8As5Df3Gh6Jk0Lz9Xc2Vb7Nm4Qa1Ws8Ed5Rf3Tg6Yh0Uj9Ik2";

/// Gateway double that echoes the requested amount back with a fresh order id.
#[derive(Default)]
pub struct StubGateway {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl StubGateway {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<GatewayOrder, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ServiceError::GatewayError("gateway down".into()));
        }
        Ok(GatewayOrder {
            id: format!("order_{}", Uuid::new_v4().simple()),
            amount: request.amount,
            currency: request.currency.clone(),
            receipt: Some(request.receipt.clone()),
            status: Some("created".into()),
        })
    }
}

/// Application router backed by a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub auth_service: Arc<AuthService>,
    pub gateway: Arc<StubGateway>,
    verifier: SignatureVerifier,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_gateway(StubGateway::default()).await
    }

    pub async fn with_gateway(gateway: StubGateway) -> Self {
        let db_dir = tempfile::tempdir().expect("temp dir");
        let db_path = db_dir.path().join("storefront.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // one connection serialises writers the way row locks do on Postgres
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment_key_id = "rzp_test_key".to_string();
        cfg.payment_key_secret = GATEWAY_SECRET.to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth_service = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
        let gateway = Arc::new(gateway);

        let services = AppServices::new(
            db_arc.clone(),
            event_sender,
            auth_service.clone(),
            gateway.clone(),
            &cfg,
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            services,
        };
        let router = storefront_api::build_router(state.clone(), auth_service.clone());

        Self {
            router,
            state,
            auth_service,
            gateway,
            verifier: SignatureVerifier::new(GATEWAY_SECRET.to_string()),
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    pub fn db(&self) -> &sea_orm::DatabaseConnection {
        &self.state.db
    }

    /// Insert an account directly and return its id with a bearer token.
    pub async fn create_user(&self, email: &str, role: Role) -> (Uuid, String) {
        let id = Uuid::new_v4();
        user::ActiveModel {
            id: Set(id),
            name: Set("Test User".into()),
            email: Set(email.to_string()),
            password_hash: Set("x".into()),
            role: Set(role),
            department: Set(None),
            status: Set(AccountStatus::Active),
            created_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("insert user");

        let token = self
            .auth_service
            .generate_token_for(id, Some("Test User".into()), Some(email.to_string()), role)
            .expect("issue token")
            .access_token;
        (id, token)
    }

    pub async fn create_product(&self, name: &str, price: Decimal, stock: i32) -> Uuid {
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            description: Set(None),
            category: Set(Some("honey".into())),
            price: Set(price),
            stock: Set(stock),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("insert product");
        id
    }

    pub async fn create_address(&self, user_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        address::ActiveModel {
            id: Set(id),
            user_id: Set(user_id),
            name: Set("Asha Rao".into()),
            phone: Set("9876543210".into()),
            pincode: Set("560001".into()),
            address1: Set("12 MG Road".into()),
            address2: Set(None),
            city: Set("Bengaluru".into()),
            state: Set("Karnataka".into()),
            country: Set("India".into()),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("insert address");
        id
    }

    pub async fn add_to_cart(&self, user_id: Uuid, product_id: Uuid, quantity: i32) {
        cart_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("insert cart line");
    }

    /// Open intent for `amount` minor units, as if the gateway had issued it.
    pub async fn create_intent(&self, user_id: Uuid, amount: i64) -> String {
        let id = format!("order_{}", Uuid::new_v4().simple());
        payment_intent::ActiveModel {
            id: Set(id.clone()),
            user_id: Set(user_id),
            amount: Set(amount),
            currency: Set("INR".into()),
            receipt: Set(format!("receipt_{}", Uuid::new_v4().simple())),
            status: Set(IntentStatus::Created),
            payment_id: Set(None),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("insert intent");
        id
    }

    pub fn sign(&self, intent_id: &str, payment_id: &str) -> String {
        self.verifier.sign(intent_id, payment_id)
    }

    pub async fn product_stock(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(self.db())
            .await
            .expect("load product")
            .expect("product exists")
            .stock
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .expect("decimal serialised as string")
        .parse()
        .expect("valid decimal")
}
