use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event; fails only when the processor has shut down
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Send and log on failure. Events are advisory, so delivery problems
    /// never fail the request that produced them.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping domain event");
        }
    }
}

/// Domain events emitted after the owning transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    UserRegistered(Uuid),
    PasswordChanged(Uuid),
    StaffCreated(Uuid),
    StaffUpdated(Uuid),
    StaffRemoved(Uuid),

    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductRemoved(Uuid),
    ProductStockSet {
        product_id: Uuid,
        stock: i32,
    },

    MessageReceived {
        message_id: Uuid,
        subject: String,
    },
    /// The reply text is stored on the message; delivery happens downstream.
    MessageReplied {
        message_id: Uuid,
        email: String,
    },

    PaymentIntentCreated {
        intent_id: String,
        user_id: Uuid,
        amount: i64,
    },

    StockReserved {
        order_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        remaining: i32,
    },

    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },

    CheckoutCompleted {
        order_id: Uuid,
        user_id: Uuid,
        payment_id: String,
    },
    CheckoutFailed {
        user_id: Uuid,
        payment_id: String,
        reason: String,
    },
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::CheckoutCompleted {
                order_id,
                user_id,
                payment_id,
            } => info!(%order_id, %user_id, %payment_id, "checkout completed"),
            Event::CheckoutFailed {
                user_id,
                payment_id,
                reason,
            } => warn!(%user_id, %payment_id, %reason, "checkout failed"),
            Event::StockReserved {
                product_id,
                remaining,
                ..
            } if *remaining == 0 => {
                warn!(%product_id, "product sold out")
            }
            Event::MessageReceived {
                message_id,
                subject,
            } => info!(%message_id, %subject, "contact message received"),
            Event::MessageReplied { message_id, email } => {
                info!(%message_id, recipient = %email, "message reply ready for delivery")
            }
            other => info!(event = ?other, "domain event"),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn processor_stops_when_senders_are_dropped() {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(process_events(rx));

        let sender = EventSender::new(tx);
        sender.send(Event::OrderCreated(Uuid::new_v4())).await.unwrap();
        drop(sender);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn send_fails_after_processor_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender.send(Event::ProductCreated(Uuid::nil())).await.is_err());
        // must not panic
        sender.send_or_log(Event::ProductCreated(Uuid::nil())).await;
    }
}
