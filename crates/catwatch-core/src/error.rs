//! Error types for catwatch billing rules.

use crate::ids::IdError;

/// Result type for catwatch domain operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors raised by domain validation and parsing.
///
/// These are all detected before any payment gateway call is attempted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BillingError {
    /// Coupon specifies both or neither of `amount_off` / `percent_off`.
    #[error("a coupon needs exactly one of amount_off or percent_off")]
    DiscountExclusivity,

    /// `percent_off` outside 1..=100.
    #[error("percent_off must be between 1 and 100, got {0}")]
    PercentOutOfRange(i32),

    /// `amount_off` must be positive.
    #[error("amount_off must be positive")]
    AmountNotPositive,

    /// `amount_off` exceeds what the gateway accepts.
    #[error("amount_off must be at most {max} cents")]
    AmountTooLarge {
        /// Largest accepted amount in cents.
        max: i64,
    },

    /// Coupon code contains symbols other than `A-Z`, `0-9`, `-` or `_`.
    #[error("invalid coupon code: {0}")]
    InvalidCouponCode(String),

    /// `currency` must be set when `amount_off` is.
    #[error("currency is required when amount_off is set")]
    CurrencyRequired,

    /// Unknown currency code.
    #[error("unknown currency: {0}")]
    UnknownCurrency(String),

    /// `duration_in_months` must be set iff duration is `repeating`.
    #[error("duration_in_months is required for, and only allowed with, repeating coupons")]
    DurationInMonths,

    /// `max_redemptions` must be positive when set.
    #[error("max_redemptions must be positive")]
    MaxRedemptions,

    /// Unknown coupon duration kind.
    #[error("unknown coupon duration: {0}")]
    UnknownDuration(String),

    /// Plan is not in the configured catalog.
    #[error("unknown plan: {0}")]
    UnknownPlan(String),

    /// A gateway payload did not have the expected shape.
    #[error("malformed gateway payload: {0}")]
    MalformedPayload(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
