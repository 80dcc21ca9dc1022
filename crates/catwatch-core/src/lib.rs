//! Core billing types and rules for catwatch.
//!
//! This crate holds everything about billing that does not touch a database or
//! the network:
//!
//! - **Identifiers**: `UserId`, `SubscriptionId`, `CreditCardId`, `CouponId`, `InvoiceId`
//! - **Accounts**: `User`, `Subscription`
//! - **Plans**: `Plan`, `PlanCatalog`
//! - **Coupons**: `Coupon`, `CouponParams`, `CouponTerms`, random code generation
//! - **Cards**: `CreditCard`, `CardDetails`, expiry rules
//! - **Invoices**: `Invoice`, `ParsedInvoice`, `UpcomingInvoice`
//! - **Money**: cents/dollars conversion, currency lookup
//!
//! # Money
//!
//! All amounts are stored as `i64` minor units (cents). Dollars only appear
//! when rendering or when reading admin input.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod coupon;
pub mod credit_card;
pub mod error;
pub mod ids;
pub mod invoice;
pub mod money;
pub mod plan;

pub use account::{Subscription, User};
pub use coupon::{random_code, Coupon, MAX_AMOUNT_OFF_CENTS, CouponParams, CouponTerms, CouponView, Duration};
pub use credit_card::{is_expiring_soon, CardDetails, CreditCard};
pub use error::{BillingError, Result};
pub use ids::{CouponId, CreditCardId, IdError, InvoiceId, SubscriptionId, UserId};
pub use invoice::{Invoice, ParsedInvoice, UpcomingInvoice};
pub use money::{cents_to_dollars, dollars_to_cents, format_currency, Currency};
pub use plan::{default_plans, Interval, Plan, PlanCatalog};
