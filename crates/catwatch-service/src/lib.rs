//! Catwatch billing HTTP API service.
//!
//! This crate provides:
//!
//! - The subscription state machine and coupon engine, driven through a
//!   payment gateway port with a Stripe adapter
//! - The invoice ledger fed by Stripe webhooks
//! - Background sweeps (expiring cards, expired coupons, gateway reconciliation)
//!
//! # Authentication
//!
//! 1. **Bearer tokens** (HS256) for end-user requests
//! 2. **Admin API key** (`X-Admin-Key`) for coupon and bulk endpoints
//!
//! The Stripe webhook route is unauthenticated; every event is re-fetched from
//! Stripe by id before it is used.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result

pub mod auth;
pub mod billing;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod jobs;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod stripe;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use gateway::{GatewayError, PaymentGateway};
pub use jobs::{Job, JobQueue, JobRunner};
pub use routes::create_router;
pub use state::AppState;
pub use stripe::StripeClient;
