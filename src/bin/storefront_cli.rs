use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use storefront_api::{
    auth::{AuthConfig, AuthService, Role},
    config::{self, AppConfig},
    db::{self, DbPool},
    entities::OrderStatus,
    events::{Event, EventSender},
    services::{
        accounts::{AccountService, RolePolicy},
        catalog::{CatalogService, CreateProductRequest, ProductView},
        orders::{OrderService, OrderView, DEFAULT_PAGE_SIZE},
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Token(args) => handle_issue_token(&context, args, cli.json),
        Commands::Accounts(command) => handle_accounts_command(&context, command, cli.json).await,
        Commands::Orders(command) => handle_orders_command(&context, command, cli.json).await,
        Commands::Products(command) => handle_products_command(&context, command, cli.json).await,
    }
}

#[derive(Parser)]
#[command(name = "storefront", about = "Storefront operator CLI", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue an access token without a password, for operators and tests
    Token(IssueTokenArgs),
    #[command(subcommand)]
    Accounts(AccountsCommands),
    #[command(subcommand)]
    Orders(OrdersCommands),
    #[command(subcommand)]
    Products(ProductsCommands),
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    User,
    Staff,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::User => Role::User,
            RoleArg::Staff => Role::Staff,
            RoleArg::Admin => Role::Admin,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderStatusArg {
    Pending,
    Paid,
    Failed,
}

impl From<OrderStatusArg> for OrderStatus {
    fn from(value: OrderStatusArg) -> Self {
        match value {
            OrderStatusArg::Pending => OrderStatus::Pending,
            OrderStatusArg::Paid => OrderStatus::Paid,
            OrderStatusArg::Failed => OrderStatus::Failed,
        }
    }
}

#[derive(Args)]
struct IssueTokenArgs {
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Account identifier (UUID)")]
    user_id: Uuid,
    #[arg(long, value_enum, default_value = "user")]
    role: RoleArg,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    email: Option<String>,
}

#[derive(Subcommand)]
enum AccountsCommands {
    /// Create an account directly, bypassing the signup email rules
    Create(CreateAccountArgs),
}

#[derive(Args)]
struct CreateAccountArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
    #[arg(long, value_enum, default_value = "user")]
    role: RoleArg,
}

#[derive(Subcommand)]
enum OrdersCommands {
    /// List every order, newest first
    List(ListOrdersArgs),
    /// Show one customer's orders
    ForUser {
        #[arg(value_parser = clap::value_parser!(Uuid))]
        user_id: Uuid,
    },
    /// Change an order's status
    SetStatus {
        #[arg(value_parser = clap::value_parser!(Uuid))]
        order_id: Uuid,
        #[arg(value_enum)]
        status: OrderStatusArg,
    },
}

#[derive(Args)]
struct ListOrdersArgs {
    #[arg(long, default_value_t = 1)]
    page: u64,
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    per_page: u64,
    #[arg(long, value_enum)]
    status: Option<OrderStatusArg>,
}

#[derive(Subcommand)]
enum ProductsCommands {
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u64,
    },
    Create(CreateProductArgs),
    SetStock {
        #[arg(value_parser = clap::value_parser!(Uuid))]
        product_id: Uuid,
        stock: i32,
    },
}

#[derive(Args)]
struct CreateProductArgs {
    #[arg(long)]
    name: String,
    #[arg(long, value_parser = parse_decimal)]
    price: Decimal,
    #[arg(long, default_value_t = 0)]
    stock: i32,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    description: Option<String>,
}

struct CliContext {
    config: AppConfig,
    db: Arc<DbPool>,
    event_sender: EventSender,
    auth_service: Arc<AuthService>,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        let db = Arc::new(db_pool);

        let auth_service = Arc::new(AuthService::new(AuthConfig::from(&config)));

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(32);
        let event_sender = EventSender::new(event_tx);

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                debug!(target: "storefront_cli", event = ?event, "received async event");
            }
        });

        Ok(Self {
            config,
            db,
            event_sender,
            auth_service,
        })
    }

    fn account_service(&self) -> AccountService {
        AccountService::new(
            self.db.clone(),
            self.auth_service.clone(),
            self.event_sender.clone(),
            RolePolicy {
                staff_email_domain: self.config.staff_email_domain.clone(),
                admin_email: self.config.admin_email.clone(),
            },
        )
    }

    fn catalog_service(&self) -> CatalogService {
        CatalogService::new(self.db.clone(), self.event_sender.clone())
    }

    fn order_service(&self) -> OrderService {
        OrderService::new(self.db.clone(), self.event_sender.clone())
    }
}

fn handle_issue_token(context: &CliContext, args: IssueTokenArgs, json: bool) -> Result<()> {
    let token = context
        .auth_service
        .generate_token_for(args.user_id, args.name, args.email, args.role.into())
        .context("failed to issue token")?;

    if json {
        print_json(&token)?;
    } else {
        println!("{}", token.access_token);
    }
    Ok(())
}

async fn handle_accounts_command(
    context: &CliContext,
    command: AccountsCommands,
    json: bool,
) -> Result<()> {
    match command {
        AccountsCommands::Create(args) => {
            let account = context
                .account_service()
                .create_account(&args.name, &args.email, &args.password, args.role.into())
                .await
                .with_context(|| format!("failed to create account {}", args.email))?;
            if json {
                print_json(&account)?;
            } else {
                println!(
                    "Created {} account {} (id {})",
                    account.role.as_claim(),
                    account.email,
                    account.id
                );
            }
            Ok(())
        }
    }
}

async fn handle_orders_command(
    context: &CliContext,
    command: OrdersCommands,
    json: bool,
) -> Result<()> {
    let service = context.order_service();
    match command {
        OrdersCommands::List(args) => {
            let page = service
                .list_all(args.page, args.per_page, args.status.map(Into::into))
                .await
                .context("failed to list orders")?;
            if json {
                print_json(&page)?;
            } else {
                println!(
                    "Orders page {} ({} per page) total {}",
                    page.page, page.per_page, page.total
                );
                for order in &page.orders {
                    render_order(order);
                }
            }
        }
        OrdersCommands::ForUser { user_id } => {
            let orders = service
                .list_for_user(user_id)
                .await
                .with_context(|| format!("failed to list orders for {}", user_id))?;
            if json {
                print_json(&orders)?;
            } else if orders.is_empty() {
                println!("No orders for {}", user_id);
            } else {
                for order in &orders {
                    render_order(order);
                }
            }
        }
        OrdersCommands::SetStatus { order_id, status } => {
            let updated = service
                .update_status(order_id, status.into())
                .await
                .with_context(|| format!("failed to update status for order {}", order_id))?;
            if json {
                print_json(&updated)?;
            } else {
                println!(
                    "Updated order {} status to {}",
                    updated.order_number,
                    updated.status.as_str()
                );
            }
        }
    }
    Ok(())
}

async fn handle_products_command(
    context: &CliContext,
    command: ProductsCommands,
    json: bool,
) -> Result<()> {
    let service = context.catalog_service();
    match command {
        ProductsCommands::List { category, page } => {
            let result = service
                .list(page, DEFAULT_PAGE_SIZE, category)
                .await
                .context("failed to list products")?;
            if json {
                print_json(&result)?;
            } else {
                println!("Products page {} total {}", result.page, result.total);
                for product in &result.products {
                    render_product(product);
                }
            }
        }
        ProductsCommands::Create(args) => {
            let product = service
                .create(CreateProductRequest {
                    name: args.name,
                    description: args.description,
                    category: args.category,
                    price: args.price,
                    stock: args.stock,
                })
                .await
                .context("failed to create product")?;
            if json {
                print_json(&product)?;
            } else {
                render_product(&product);
            }
        }
        ProductsCommands::SetStock { product_id, stock } => {
            let product = service
                .set_stock(product_id, stock)
                .await
                .with_context(|| format!("failed to set stock for {}", product_id))?;
            if json {
                print_json(&product)?;
            } else {
                render_product(&product);
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_order(order: &OrderView) {
    println!(
        "- {} • user {} • {} • {} {} • {} item(s)",
        order.order_number,
        order.user_id,
        order.status.as_str(),
        order.total_amount,
        order.currency,
        order.items.len()
    );
}

fn render_product(product: &ProductView) {
    println!(
        "- {} ({}) • {} • stock {}",
        product.name, product.id, product.price, product.stock
    );
}

fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    raw.parse::<Decimal>()
        .map_err(|e| format!("invalid decimal '{}': {}", raw, e))
}
