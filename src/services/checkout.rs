//! Checkout: payment verification, stock reservation and order placement.
//!
//! The flow is an explicit state machine. [`transition`] is pure and decides
//! the next state plus the effect the orchestrator must run; the outcome of
//! that effect is fed back in as the next event.
//!
//! ```text
//! Created --SignatureChecked(true)--> SignatureVerified --StockReserved--> StockReserved --OrderPersisted--> OrderRecorded
//!    |                                      |                                  |
//!    +--SignatureChecked(false)--+          +--StockRejected--+                +--PersistenceFailed / AmountRejected--+
//!                                |          +--ReserveFailed--+                                                       |
//!                                v                            v                                                       v
//!                             Failed                       Failed                                                  Failed
//! ```
//!
//! A retry of a payment that a concurrent request has already recorded may
//! lose the stock race, so stock and persistence rollbacks look for an
//! existing order before reporting the failure.

use metrics::{counter, histogram};
use rust_decimal::Decimal;
use sea_orm::{DatabaseTransaction, EntityTrait, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::order_recorder::{self, NewOrder, RecordError};
use super::orders::{self, OrderView};
use super::pricing;
use super::signature::SignatureVerifier;
use super::stock::{self, LineRequest, ReservedLine};
use crate::{
    db::DbPool,
    entities::{address, payment_intent, IntentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    InvalidSignature,
    InsufficientStock(Uuid),
    /// Stock could not be reserved for a reason other than quantity
    Reservation,
    AmountMismatch,
    Persistence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutState {
    Created,
    SignatureVerified,
    StockReserved,
    OrderRecorded(Uuid),
    Failed(FailureReason),
}

impl CheckoutState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutState::OrderRecorded(_) | CheckoutState::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutEvent {
    SignatureChecked(bool),
    StockReserved,
    StockRejected(Uuid),
    ReserveFailed,
    AmountRejected,
    OrderPersisted(Uuid),
    PersistenceFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ReserveStock,
    RecordOrder,
    Commit,
    Rollback,
    Abort,
}

/// Pure transition function. Any pair not listed is an illegal transition.
pub fn transition(
    state: &CheckoutState,
    event: &CheckoutEvent,
) -> Result<(CheckoutState, Effect), ServiceError> {
    use CheckoutEvent as E;
    use CheckoutState as S;

    let next = match (state, event) {
        (S::Created, E::SignatureChecked(true)) => (S::SignatureVerified, Effect::ReserveStock),
        (S::Created, E::SignatureChecked(false)) => {
            (S::Failed(FailureReason::InvalidSignature), Effect::Abort)
        }
        (S::SignatureVerified, E::StockReserved) => (S::StockReserved, Effect::RecordOrder),
        (S::SignatureVerified, E::StockRejected(product_id)) => (
            S::Failed(FailureReason::InsufficientStock(*product_id)),
            Effect::Rollback,
        ),
        (S::SignatureVerified, E::ReserveFailed) => {
            (S::Failed(FailureReason::Reservation), Effect::Rollback)
        }
        (S::StockReserved, E::AmountRejected) => {
            (S::Failed(FailureReason::AmountMismatch), Effect::Rollback)
        }
        (S::StockReserved, E::OrderPersisted(order_id)) => {
            (S::OrderRecorded(*order_id), Effect::Commit)
        }
        (S::StockReserved, E::PersistenceFailed) => {
            (S::Failed(FailureReason::Persistence), Effect::Rollback)
        }
        (state, event) => {
            return Err(ServiceError::InvalidOperation(format!(
                "Illegal checkout transition from {state:?} on {event:?}"
            )))
        }
    };
    Ok(next)
}

/// Tracks the current state of one checkout attempt.
#[derive(Debug)]
struct CheckoutMachine {
    state: CheckoutState,
}

impl CheckoutMachine {
    fn new() -> Self {
        Self {
            state: CheckoutState::Created,
        }
    }

    fn advance(&mut self, event: CheckoutEvent) -> Result<Effect, ServiceError> {
        let (next, effect) = transition(&self.state, &event)?;
        debug!(from = ?self.state, event = ?event, to = ?next, effect = ?effect, "checkout transition");
        self.state = next;
        Ok(effect)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Final step of checkout, sent after the client has paid the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Gateway order reference returned by create-payment-intent
    #[validate(length(min = 1, max = 100, message = "intentId is required"))]
    pub intent_id: String,
    #[validate(length(min = 1, max = 100, message = "paymentId is required"))]
    pub payment_id: String,
    #[validate(length(min = 1, max = 256, message = "signature is required"))]
    pub signature: String,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<CheckoutItem>,
    /// Optional client-side total, checked against the server computation
    pub total: Option<Decimal>,
    pub address_id: Uuid,
}

impl CheckoutRequest {
    fn lines(&self) -> Vec<LineRequest> {
        self.items
            .iter()
            .map(|item| LineRequest {
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: OrderView,
    /// True when an order for this payment id already existed
    pub replayed: bool,
}

/// Drives a checkout from a verified gateway payment to a recorded order.
#[derive(Clone)]
pub struct CheckoutService {
    db_pool: Arc<DbPool>,
    verifier: SignatureVerifier,
    event_sender: EventSender,
}

impl CheckoutService {
    pub fn new(db_pool: Arc<DbPool>, verifier: SignatureVerifier, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            verifier,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(intent_id = %request.intent_id, payment_id = %request.payment_id))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let started = Instant::now();
        let result = self.run(user_id, &request).await;
        histogram!("storefront_checkout.duration_ms", started.elapsed().as_millis() as f64);

        match &result {
            Ok(outcome) if outcome.replayed => counter!("storefront_checkout.replayed", 1),
            Ok(_) => counter!("storefront_checkout.completed", 1),
            Err(e) => {
                counter!("storefront_checkout.failed", 1);
                self.event_sender
                    .send_or_log(Event::CheckoutFailed {
                        user_id,
                        payment_id: request.payment_id.clone(),
                        reason: e.to_string(),
                    })
                    .await;
            }
        }
        result
    }

    async fn run(&self, user_id: Uuid, request: &CheckoutRequest) -> Result<CheckoutOutcome, ServiceError> {
        request.validate()?;
        let lines = request.lines();
        stock::aggregate(&lines)?;

        let mut machine = CheckoutMachine::new();

        let valid = self
            .verifier
            .verify(&request.intent_id, &request.payment_id, &request.signature);
        if !valid {
            warn!(%user_id, intent_id = %request.intent_id, payment_id = %request.payment_id, "Payment signature mismatch");
        }
        if machine.advance(CheckoutEvent::SignatureChecked(valid))? == Effect::Abort {
            return Err(ServiceError::InvalidSignature);
        }

        if let Some(existing) = self.replay(user_id, &request.payment_id).await? {
            return Ok(existing);
        }

        let db = &*self.db_pool;
        let intent = payment_intent::Entity::find_by_id(request.intent_id.clone())
            .one(db)
            .await?
            .filter(|i| i.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound("Payment intent not found".to_string()))?;
        if intent.status != IntentStatus::Created {
            // a concurrent retry of this payment may have settled it meanwhile
            if let Some(existing) = self.replay(user_id, &request.payment_id).await? {
                return Ok(existing);
            }
            return Err(ServiceError::Conflict(
                "Payment intent has already been settled".to_string(),
            ));
        }

        address::Entity::find_by_id(request.address_id)
            .one(db)
            .await?
            .filter(|a| a.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound("Address not found".to_string()))?;

        let txn = db.begin().await?;

        let reserved = match stock::reserve(&txn, &lines).await {
            Ok(reserved) => reserved,
            Err(ServiceError::InsufficientStock(product_id)) => {
                let effect = machine.advance(CheckoutEvent::StockRejected(product_id))?;
                finish(txn, effect).await?;
                // the stock may have gone to a concurrent retry of this same payment
                if let Some(existing) = self.replay(user_id, &request.payment_id).await? {
                    return Ok(existing);
                }
                return Err(ServiceError::InsufficientStock(product_id));
            }
            Err(other) => {
                let effect = machine.advance(CheckoutEvent::ReserveFailed)?;
                finish(txn, effect).await?;
                return Err(other);
            }
        };
        machine.advance(CheckoutEvent::StockReserved)?;

        if let Err(mismatch) = reconcile(&reserved, intent.amount, request.total) {
            let effect = machine.advance(CheckoutEvent::AmountRejected)?;
            finish(txn, effect).await?;
            return Err(mismatch);
        }

        let new_order = NewOrder {
            user_id,
            payment_id: request.payment_id.clone(),
            payment_intent_id: intent.id.clone(),
            address_id: request.address_id,
            currency: intent.currency.clone(),
            lines: reserved.clone(),
        };

        let recorded = match order_recorder::record(&txn, new_order).await {
            Ok(recorded) => recorded,
            Err(err) => {
                let effect = machine.advance(CheckoutEvent::PersistenceFailed)?;
                finish(txn, effect).await?;
                if matches!(err, RecordError::DuplicatePayment | RecordError::IntentNotOpen) {
                    // lost a race against a concurrent retry of the same payment
                    if let Some(existing) = self.replay(user_id, &request.payment_id).await? {
                        return Ok(existing);
                    }
                }
                return Err(err.into());
            }
        };

        let effect = machine.advance(CheckoutEvent::OrderPersisted(recorded.order.id))?;
        finish(txn, effect).await?;

        let order = OrderView::new(recorded.order, recorded.items);
        info!(order_id = %order.id, order_number = %order.order_number, total = %order.total_amount, "Order placed");
        self.publish(&order, &reserved).await;

        Ok(CheckoutOutcome {
            order,
            replayed: false,
        })
    }

    /// Existing order for this payment id, if any. Another user's order is a conflict.
    async fn replay(&self, user_id: Uuid, payment_id: &str) -> Result<Option<CheckoutOutcome>, ServiceError> {
        match orders::find_by_payment_id(&*self.db_pool, payment_id).await? {
            Some(order) if order.user_id == user_id => {
                info!(order_id = %order.id, %payment_id, "Returning previously recorded order");
                Ok(Some(CheckoutOutcome {
                    order,
                    replayed: true,
                }))
            }
            Some(_) => {
                warn!(%user_id, %payment_id, "Payment id already used by another account");
                Err(ServiceError::Conflict(
                    "Payment has already been recorded".to_string(),
                ))
            }
            None => Ok(None),
        }
    }

    async fn publish(&self, order: &OrderView, reserved: &[ReservedLine]) {
        self.event_sender
            .send_or_log(Event::OrderCreated(order.id))
            .await;
        for line in reserved {
            self.event_sender
                .send_or_log(Event::StockReserved {
                    order_id: order.id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    remaining: line.remaining,
                })
                .await;
        }
        self.event_sender
            .send_or_log(Event::CheckoutCompleted {
                order_id: order.id,
                user_id: order.user_id,
                payment_id: order.payment_id.clone(),
            })
            .await;
    }
}

/// Run a transaction-ending effect.
async fn finish(txn: DatabaseTransaction, effect: Effect) -> Result<(), ServiceError> {
    match effect {
        Effect::Commit => txn.commit().await?,
        Effect::Rollback | Effect::Abort => txn.rollback().await?,
        Effect::ReserveStock | Effect::RecordOrder => {
            return Err(ServiceError::InternalError(format!(
                "{effect:?} does not end a transaction"
            )))
        }
    }
    Ok(())
}

/// The recomputed total must match the intent amount and, if given, the
/// client's own total.
fn reconcile(
    reserved: &[ReservedLine],
    intent_amount: i64,
    client_total: Option<Decimal>,
) -> Result<(), ServiceError> {
    let total: Decimal = reserved
        .iter()
        .map(|line| pricing::line_total(line.unit_price, line.quantity))
        .sum();
    let total_minor = pricing::to_minor_units(total)?;

    if total_minor != intent_amount {
        warn!(total_minor, intent_amount, "Checkout total differs from payment intent");
        return Err(ServiceError::AmountMismatch(format!(
            "order total {} does not match the authorized amount {}",
            pricing::round_money(total),
            pricing::from_minor_units(intent_amount)
        )));
    }

    if let Some(client_total) = client_total {
        if pricing::to_minor_units(client_total)? != total_minor {
            return Err(ServiceError::AmountMismatch(format!(
                "submitted total {} does not match the order total {}",
                client_total,
                pricing::round_money(total)
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn product() -> Uuid {
        Uuid::parse_str("6f1c2a3b-4d5e-4f60-8a7b-9c0d1e2f3a4b").unwrap()
    }

    fn order() -> Uuid {
        Uuid::parse_str("0b1c2d3e-4f50-4162-8374-8596a7b8c9d0").unwrap()
    }

    #[rstest]
    #[case(CheckoutState::Created, CheckoutEvent::SignatureChecked(true), CheckoutState::SignatureVerified, Effect::ReserveStock)]
    #[case(CheckoutState::Created, CheckoutEvent::SignatureChecked(false), CheckoutState::Failed(FailureReason::InvalidSignature), Effect::Abort)]
    #[case(CheckoutState::SignatureVerified, CheckoutEvent::StockReserved, CheckoutState::StockReserved, Effect::RecordOrder)]
    #[case(CheckoutState::SignatureVerified, CheckoutEvent::StockRejected(product()), CheckoutState::Failed(FailureReason::InsufficientStock(product())), Effect::Rollback)]
    #[case(CheckoutState::SignatureVerified, CheckoutEvent::ReserveFailed, CheckoutState::Failed(FailureReason::Reservation), Effect::Rollback)]
    #[case(CheckoutState::StockReserved, CheckoutEvent::AmountRejected, CheckoutState::Failed(FailureReason::AmountMismatch), Effect::Rollback)]
    #[case(CheckoutState::StockReserved, CheckoutEvent::OrderPersisted(order()), CheckoutState::OrderRecorded(order()), Effect::Commit)]
    #[case(CheckoutState::StockReserved, CheckoutEvent::PersistenceFailed, CheckoutState::Failed(FailureReason::Persistence), Effect::Rollback)]
    fn legal_transitions(
        #[case] from: CheckoutState,
        #[case] event: CheckoutEvent,
        #[case] to: CheckoutState,
        #[case] effect: Effect,
    ) {
        assert_eq!(transition(&from, &event).unwrap(), (to, effect));
    }

    #[test]
    fn every_other_pair_is_rejected() {
        let states = [
            CheckoutState::Created,
            CheckoutState::SignatureVerified,
            CheckoutState::StockReserved,
            CheckoutState::OrderRecorded(order()),
            CheckoutState::Failed(FailureReason::Persistence),
        ];
        let events = [
            CheckoutEvent::SignatureChecked(true),
            CheckoutEvent::SignatureChecked(false),
            CheckoutEvent::StockReserved,
            CheckoutEvent::StockRejected(product()),
            CheckoutEvent::ReserveFailed,
            CheckoutEvent::AmountRejected,
            CheckoutEvent::OrderPersisted(order()),
            CheckoutEvent::PersistenceFailed,
        ];

        let mut legal = 0;
        for state in &states {
            for event in &events {
                match transition(state, event) {
                    Ok(_) => legal += 1,
                    Err(e) => assert_matches!(e, ServiceError::InvalidOperation(_)),
                }
            }
        }
        assert_eq!(legal, 8);
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for state in [
            CheckoutState::OrderRecorded(order()),
            CheckoutState::Failed(FailureReason::InvalidSignature),
        ] {
            assert!(state.is_terminal());
            assert!(transition(&state, &CheckoutEvent::SignatureChecked(true)).is_err());
        }
    }

    fn reserved(price: Decimal, quantity: i32) -> ReservedLine {
        ReservedLine {
            product_id: Uuid::new_v4(),
            product_name: "Mug".into(),
            quantity,
            unit_price: price,
            remaining: 10,
        }
    }

    #[test]
    fn reconcile_accepts_matching_totals() {
        let lines = [reserved(dec!(249.50), 2), reserved(dec!(10.00), 1)];
        assert!(reconcile(&lines, 50_900, None).is_ok());
        assert!(reconcile(&lines, 50_900, Some(dec!(509.00))).is_ok());
    }

    #[rstest]
    #[case(50_800, None)]
    #[case(50_900, Some(dec!(508.99)))]
    fn reconcile_rejects_mismatch(#[case] intent_amount: i64, #[case] client_total: Option<Decimal>) {
        let lines = [reserved(dec!(249.50), 2), reserved(dec!(10.00), 1)];
        assert_matches!(
            reconcile(&lines, intent_amount, client_total),
            Err(ServiceError::AmountMismatch(_))
        );
    }

    #[test]
    fn request_uses_camel_case_fields() {
        let request: CheckoutRequest = serde_json::from_value(serde_json::json!({
            "intentId": "order_1",
            "paymentId": "pay_1",
            "signature": "abc",
            "items": [{"productId": product(), "quantity": 2}],
            "addressId": order(),
        }))
        .unwrap();
        assert_eq!(request.lines().len(), 1);
        assert!(request.total.is_none());
        assert!(request.validate().is_ok());
    }
}
