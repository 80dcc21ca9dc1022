//! API handlers.

pub mod admin;
pub mod health;
pub mod subscriptions;
pub mod users;
pub mod webhooks;
