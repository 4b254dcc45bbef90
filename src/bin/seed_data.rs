//! Seed data script - populates the catalog and a bootstrap admin account
//!
//! Run with: cargo run --bin seed-data
//!
//! Requires APP__JWT_SECRET and a reachable database. Set SEED_ADMIN_PASSWORD
//! to create the admin account named by APP__ADMIN_EMAIL.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tracing::{info, warn};

use storefront_api::{
    auth::{AuthConfig, AuthService, Role},
    config, db,
    errors::ServiceError,
    events::{self, EventSender},
    services::{
        accounts::{AccountService, RolePolicy},
        catalog::{CatalogService, CreateProductRequest},
    },
};

struct SeedProduct {
    name: &'static str,
    description: &'static str,
    category: &'static str,
    price: Decimal,
    stock: i32,
}

fn catalog() -> Vec<SeedProduct> {
    vec![
        SeedProduct {
            name: "Wildflower Honey 500g",
            description: "Raw multi-floral honey from the Western Ghats",
            category: "honey",
            price: dec!(349.00),
            stock: 120,
        },
        SeedProduct {
            name: "Acacia Honey 250g",
            description: "Light, slow-crystallising single-origin honey",
            category: "honey",
            price: dec!(229.50),
            stock: 80,
        },
        SeedProduct {
            name: "Beeswax Candle Set",
            description: "Three hand-poured pure beeswax candles",
            category: "home",
            price: dec!(499.00),
            stock: 40,
        },
        SeedProduct {
            name: "Bee Pollen 100g",
            description: "Sun-dried pollen granules",
            category: "wellness",
            price: dec!(275.00),
            stock: 60,
        },
        SeedProduct {
            name: "Honey Dipper",
            description: "Turned neem-wood dipper",
            category: "accessories",
            price: dec!(99.00),
            stock: 200,
        },
        SeedProduct {
            name: "Comb Honey Frame",
            description: "Seasonal cut comb, limited stock",
            category: "honey",
            price: dec!(899.00),
            stock: 5,
        },
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config()?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    info!("=== Storefront seed data ===");
    let pool = db::establish_connection_from_app_config(&cfg).await?;
    db::run_migrations(&pool).await?;
    let pool = Arc::new(pool);

    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = EventSender::new(event_tx);
    let processor = tokio::spawn(events::process_events(event_rx));

    let catalog_service = CatalogService::new(pool.clone(), event_sender.clone());
    let mut created = 0usize;
    for item in catalog() {
        catalog_service
            .create(CreateProductRequest {
                name: item.name.to_string(),
                description: Some(item.description.to_string()),
                category: Some(item.category.to_string()),
                price: item.price,
                stock: item.stock,
            })
            .await?;
        created += 1;
    }
    info!("Created {} products", created);

    match std::env::var("SEED_ADMIN_PASSWORD") {
        Ok(password) => {
            let accounts = AccountService::new(
                pool.clone(),
                Arc::new(AuthService::new(AuthConfig::from(&cfg))),
                event_sender.clone(),
                RolePolicy {
                    staff_email_domain: cfg.staff_email_domain.clone(),
                    admin_email: cfg.admin_email.clone(),
                },
            );
            match accounts
                .create_account("Store Admin", &cfg.admin_email, &password, Role::Admin)
                .await
            {
                Ok(admin) => info!(user_id = %admin.id, "Created admin account {}", admin.email),
                Err(ServiceError::Conflict(_)) => {
                    warn!("Admin account {} already exists", cfg.admin_email)
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(_) => info!("SEED_ADMIN_PASSWORD not set; skipping admin account"),
    }

    drop(catalog_service);
    drop(event_sender);
    processor.await?;

    info!("Seed complete. Browse the catalog at http://localhost:{}/api/v1/products", cfg.port);
    Ok(())
}
