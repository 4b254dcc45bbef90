// Checkout core
pub mod checkout;
pub mod order_recorder;
pub mod payment_gateway;
pub mod payment_intents;
pub mod pricing;
pub mod signature;
pub mod stock;

// Orders read side and administration
pub mod orders;

// Storefront collaborators
pub mod accounts;
pub mod addresses;
pub mod cart;
pub mod catalog;

// Back office
pub mod messages;
pub mod staff;
