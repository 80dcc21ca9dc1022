//! Stripe adapter for the payment gateway port.
//!
//! Stripe holds the customers, subscriptions, cards and coupons of record.
//! The local database mirrors what Stripe has confirmed.

pub mod client;
pub mod types;

pub use client::StripeClient;
