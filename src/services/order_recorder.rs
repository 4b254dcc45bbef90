use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr,
};
use thiserror::Error;
use tracing::{error, instrument};
use uuid::Uuid;

use super::pricing;
use super::stock::ReservedLine;
use crate::entities::{cart_item, order, order_item, payment_intent, IntentStatus, OrderStatus};
use crate::errors::ServiceError;

/// Everything needed to write a paid order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub payment_id: String,
    pub payment_intent_id: String,
    pub address_id: Uuid,
    pub currency: String,
    pub lines: Vec<ReservedLine>,
}

impl NewOrder {
    pub fn total(&self) -> Decimal {
        self.lines
            .iter()
            .map(|line| pricing::line_total(line.unit_price, line.quantity))
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct RecordedOrder {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Error)]
pub enum RecordError {
    /// Another order already carries this payment id
    #[error("payment already recorded")]
    DuplicatePayment,

    #[error("payment intent is not open")]
    IntentNotOpen,

    #[error("persistence failure: {0}")]
    Persistence(#[from] DbErr),
}

impl From<RecordError> for ServiceError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::DuplicatePayment => {
                ServiceError::Conflict("Payment has already been recorded".to_string())
            }
            RecordError::IntentNotOpen => {
                ServiceError::Conflict("Payment intent has already been settled".to_string())
            }
            RecordError::Persistence(e) => ServiceError::DatabaseError(e),
        }
    }
}

/// `ORD-20240131-1A2B3C4D5E6F7A8B`
pub fn order_number(order_id: Uuid) -> String {
    let simple = order_id.simple().to_string().to_uppercase();
    format!("ORD-{}-{}", Utc::now().format("%Y%m%d"), &simple[..16])
}

/// Both Postgres (`orders_payment_id_key`) and SQLite (`orders.payment_id`)
/// name the violated column in the message.
fn violates_payment_id(message: &str) -> bool {
    message.contains("payment_id")
}

fn classify_insert_error(err: DbErr) -> RecordError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(message)) if violates_payment_id(&message) => {
            RecordError::DuplicatePayment
        }
        _ => RecordError::Persistence(err),
    }
}

/// Insert the order, its items, settle the payment intent and drop the
/// purchased products from the cart. Runs on the checkout transaction.
#[instrument(skip(txn, new_order), fields(user_id = %new_order.user_id, payment_id = %new_order.payment_id))]
pub async fn record<C>(txn: &C, new_order: NewOrder) -> Result<RecordedOrder, RecordError>
where
    C: ConnectionTrait,
{
    let order_id = Uuid::new_v4();
    let total = new_order.total();

    let order = order::ActiveModel {
        id: Set(order_id),
        order_number: Set(order_number(order_id)),
        user_id: Set(new_order.user_id),
        total_amount: Set(total),
        currency: Set(new_order.currency.clone()),
        status: Set(OrderStatus::Paid),
        payment_id: Set(new_order.payment_id.clone()),
        payment_intent_id: Set(new_order.payment_intent_id.clone()),
        address_id: Set(new_order.address_id),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(|e| match classify_insert_error(e) {
        RecordError::Persistence(e) => {
            error!(error = %e, %order_id, "Failed to insert order");
            RecordError::Persistence(e)
        }
        other => other,
    })?;

    let mut items = Vec::with_capacity(new_order.lines.len());
    for line in &new_order.lines {
        let item = order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(line.product_id),
            product_name: Set(line.product_name.clone()),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            total_price: Set(pricing::line_total(line.unit_price, line.quantity)),
            ..Default::default()
        }
        .insert(txn)
        .await?;
        items.push(item);
    }

    let settled = payment_intent::Entity::update_many()
        .col_expr(
            payment_intent::Column::Status,
            Expr::value(IntentStatus::Paid),
        )
        .col_expr(
            payment_intent::Column::PaymentId,
            Expr::value(Some(new_order.payment_id.clone())),
        )
        .col_expr(payment_intent::Column::UpdatedAt, Expr::value(Some(Utc::now())))
        .filter(payment_intent::Column::Id.eq(new_order.payment_intent_id.as_str()))
        .filter(payment_intent::Column::Status.eq(IntentStatus::Created))
        .exec(txn)
        .await?;
    if settled.rows_affected == 0 {
        return Err(RecordError::IntentNotOpen);
    }

    let purchased: Vec<Uuid> = new_order.lines.iter().map(|l| l.product_id).collect();
    cart_item::Entity::delete_many()
        .filter(cart_item::Column::UserId.eq(new_order.user_id))
        .filter(cart_item::Column::ProductId.is_in(purchased))
        .exec(txn)
        .await?;

    Ok(RecordedOrder { order, items })
}
