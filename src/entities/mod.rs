pub mod address;
pub mod cart_item;
pub mod message;
pub mod order;
pub mod order_item;
pub mod payment_intent;
pub mod product;

pub use message::MessageStatus;
pub use order::OrderStatus;
pub use payment_intent::IntentStatus;
