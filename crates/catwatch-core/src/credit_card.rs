//! Credit card snapshots.
//!
//! The card itself lives at the payment gateway. Locally we only keep what is
//! needed to render it and warn about expiry.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::{CreditCardId, UserId};

/// Cards expiring within this many months are flagged.
pub const IS_EXPIRING_THRESHOLD_MONTHS: u64 = 2;

/// The date up to which expiring cards are flagged, seen from `compare_date`.
///
/// Months are approximated as `365 / 12` days, so two months is 60 days.
#[must_use]
pub fn expiring_threshold(compare_date: NaiveDate) -> NaiveDate {
    let days = IS_EXPIRING_THRESHOLD_MONTHS * 365 / 12;
    compare_date
        .checked_add_days(Days::new(days))
        .unwrap_or(NaiveDate::MAX)
}

/// Whether a card with `exp_date` is expiring soon as of `compare_date`.
#[must_use]
pub fn is_expiring_soon(compare_date: NaiveDate, exp_date: NaiveDate) -> bool {
    exp_date <= expiring_threshold(compare_date)
}

/// Card fields as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    /// Card brand, e.g. `Visa`.
    pub brand: String,
    /// Last four digits.
    pub last4: String,
    /// Expiry month, 1-12.
    pub exp_month: u32,
    /// Expiry year.
    pub exp_year: i32,
}

impl CardDetails {
    /// Expiry normalized to the first day of the expiry month.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::MalformedPayload`] for an impossible month/year.
    pub fn exp_date(&self) -> Result<NaiveDate> {
        NaiveDate::from_ymd_opt(self.exp_year, self.exp_month, 1).ok_or_else(|| {
            BillingError::MalformedPayload(format!(
                "invalid card expiry {}/{}",
                self.exp_month, self.exp_year
            ))
        })
    }
}

/// A user's card on file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCard {
    /// Row id.
    pub id: CreditCardId,
    /// Owning user.
    pub user_id: UserId,
    /// Card brand.
    pub brand: String,
    /// Last four digits.
    pub last4: String,
    /// Expiry, always the first of the month.
    pub exp_date: NaiveDate,
    /// Set when the card expires within the threshold. Refreshed by a sweep.
    pub is_expiring: bool,
}

impl CreditCard {
    /// Build a snapshot from gateway card data, computing `is_expiring` as of `today`.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::MalformedPayload`] for an impossible expiry.
    pub fn from_details(user_id: UserId, details: &CardDetails, today: NaiveDate) -> Result<Self> {
        let exp_date = details.exp_date()?;
        Ok(Self {
            id: CreditCardId::generate(),
            user_id,
            brand: details.brand.clone(),
            last4: details.last4.clone(),
            exp_date,
            is_expiring: is_expiring_soon(today, exp_date),
        })
    }
}
