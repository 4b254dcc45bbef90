use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::payment_gateway::{GatewayOrderRequest, PaymentGateway};
use super::pricing;
use crate::{
    db::DbPool,
    entities::{cart_item, payment_intent, product, IntentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    /// Amount the client expects to pay, in minor units. Only used as a cross-check.
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub intent_id: String,
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
}

/// `receipt_<uuid>` tag sent to the gateway with each intent.
pub fn new_receipt() -> String {
    format!("receipt_{}", Uuid::new_v4().simple())
}

/// Creates gateway order references for the caller's current cart.
#[derive(Clone)]
pub struct PaymentIntentService {
    db_pool: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
    currency: String,
}

impl PaymentIntentService {
    pub fn new(
        db_pool: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            db_pool,
            gateway,
            event_sender,
            currency: currency.into(),
        }
    }

    /// Cart total at current catalog prices.
    async fn cart_total(&self, user_id: Uuid) -> Result<Decimal, ServiceError> {
        let rows = cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .find_also_related(product::Entity)
            .all(&*self.db_pool)
            .await?;

        if rows.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }

        let mut total = Decimal::ZERO;
        for (line, product) in rows {
            let product = product.filter(|p| p.is_active).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "Product {} is no longer available",
                    line.product_id
                ))
            })?;
            if product.stock < line.quantity {
                return Err(ServiceError::InsufficientStock(product.id));
            }
            total += pricing::line_total(product.price, line.quantity);
        }
        Ok(total)
    }

    #[instrument(skip(self, request))]
    pub async fn create_intent(
        &self,
        user_id: Uuid,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntentResponse, ServiceError> {
        let amount = pricing::to_minor_units(self.cart_total(user_id).await?)?;
        if amount <= 0 {
            return Err(ServiceError::ValidationError(
                "Order amount must be positive".to_string(),
            ));
        }

        if let Some(requested) = request.amount {
            if requested != amount {
                warn!(%user_id, requested, amount, "Client amount differs from cart total");
                return Err(ServiceError::AmountMismatch(format!(
                    "requested amount {requested} does not match the cart total {amount}"
                )));
            }
        }

        let receipt = new_receipt();
        let gateway_order = self
            .gateway
            .create_order(&GatewayOrderRequest::new(amount, self.currency.clone(), receipt.clone()))
            .await?;

        let intent = payment_intent::ActiveModel {
            id: Set(gateway_order.id.clone()),
            user_id: Set(user_id),
            amount: Set(amount),
            currency: Set(self.currency.clone()),
            receipt: Set(receipt),
            status: Set(IntentStatus::Created),
            payment_id: Set(None),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await?;

        info!(intent_id = %intent.id, amount, "Payment intent created");
        self.event_sender
            .send_or_log(Event::PaymentIntentCreated {
                intent_id: intent.id.clone(),
                user_id,
                amount,
            })
            .await;

        Ok(PaymentIntentResponse {
            intent_id: intent.id,
            amount: intent.amount,
            currency: intent.currency,
        })
    }
}
