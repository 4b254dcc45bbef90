pub mod addresses;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod common;
pub mod messages;
pub mod orders;
pub mod products;
pub mod profile;
pub mod staff;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    accounts::{AccountService, RolePolicy},
    addresses::AddressService,
    cart::CartService,
    catalog::CatalogService,
    checkout::CheckoutService,
    messages::MessageService,
    orders::OrderService,
    payment_gateway::PaymentGateway,
    payment_intents::PaymentIntentService,
    signature::SignatureVerifier,
    staff::StaffService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub accounts: Arc<AccountService>,
    pub addresses: Arc<AddressService>,
    pub cart: Arc<CartService>,
    pub catalog: Arc<CatalogService>,
    pub checkout: Arc<CheckoutService>,
    pub messages: Arc<MessageService>,
    pub orders: Arc<OrderService>,
    pub payment_intents: Arc<PaymentIntentService>,
    pub staff: Arc<StaffService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        auth_service: Arc<crate::auth::AuthService>,
        gateway: Arc<dyn PaymentGateway>,
        cfg: &AppConfig,
    ) -> Self {
        let policy = RolePolicy {
            staff_email_domain: cfg.staff_email_domain.clone(),
            admin_email: cfg.admin_email.clone(),
        };

        Self {
            accounts: Arc::new(AccountService::new(
                db_pool.clone(),
                auth_service,
                event_sender.clone(),
                policy.clone(),
            )),
            addresses: Arc::new(AddressService::new(db_pool.clone())),
            cart: Arc::new(CartService::new(db_pool.clone())),
            catalog: Arc::new(CatalogService::new(db_pool.clone(), event_sender.clone())),
            checkout: Arc::new(CheckoutService::new(
                db_pool.clone(),
                SignatureVerifier::new(cfg.payment_key_secret.clone()),
                event_sender.clone(),
            )),
            messages: Arc::new(MessageService::new(db_pool.clone(), event_sender.clone())),
            orders: Arc::new(OrderService::new(db_pool.clone(), event_sender.clone())),
            payment_intents: Arc::new(PaymentIntentService::new(
                db_pool.clone(),
                gateway,
                event_sender.clone(),
                cfg.currency.clone(),
            )),
            staff: Arc::new(StaffService::new(db_pool, event_sender, policy)),
        }
    }
}
