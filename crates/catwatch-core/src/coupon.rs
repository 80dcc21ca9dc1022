//! Discount coupons.
//!
//! A coupon is created on the gateway first and mirrored locally. Codes are
//! stored uppercase and looked up case-insensitively.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::money::{cents_to_dollars, dollars_to_cents, Currency};
use crate::CouponId;

/// Source symbols of a hex-encoded byte string (plus the unused `g`..`j`).
const CODE_SOURCE: &[u8; 20] = b"0123456789abcdefghij";

/// Symbols that cannot be confused with one another when read aloud or printed.
const CODE_ALPHABET: &[u8; 20] = b"234679QWERTYUPADFGHX";

/// Symbols per dash-separated group.
const CODE_GROUP_LEN: usize = 4;

/// Number of dash-separated groups.
const CODE_GROUPS: usize = 3;

/// Largest fixed discount the gateway accepts, in cents.
pub const MAX_AMOUNT_OFF_CENTS: i64 = 2_147_483_647;

fn is_code_symbol(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_'
}

/// Generate a human readable random coupon code such as `7QW2-DAFX-94HE`.
#[must_use]
pub fn random_code() -> String {
    let bytes: [u8; 20] = rand::random();
    let translated: Vec<char> = hex::encode(bytes)
        .bytes()
        .filter_map(|b| {
            CODE_SOURCE
                .iter()
                .position(|&s| s == b)
                .map(|idx| char::from(CODE_ALPHABET[idx]))
        })
        .take(CODE_GROUP_LEN * CODE_GROUPS)
        .collect();

    translated
        .chunks(CODE_GROUP_LEN)
        .map(|group| group.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

/// How long a coupon's discount applies once redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Duration {
    /// Applies to every invoice.
    Forever,
    /// Applies to the first invoice only.
    Once,
    /// Applies for `duration_in_months`.
    Repeating,
}

impl Duration {
    /// Wire name of the duration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forever => "forever",
            Self::Once => "once",
            Self::Repeating => "repeating",
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Duration {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "forever" => Ok(Self::Forever),
            "once" => Ok(Self::Once),
            "repeating" => Ok(Self::Repeating),
            other => Err(BillingError::UnknownDuration(other.to_string())),
        }
    }
}

/// Coupon parameters as entered by an admin. `amount_off` is in dollars.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CouponParams {
    /// Optional code; a random one is generated when absent or blank.
    #[serde(default)]
    pub code: Option<String>,
    /// Duration kind.
    pub duration: Option<Duration>,
    /// Fixed discount in dollars.
    #[serde(default)]
    pub amount_off: Option<f64>,
    /// Percentage discount.
    #[serde(default)]
    pub percent_off: Option<i32>,
    /// Currency for `amount_off`.
    #[serde(default)]
    pub currency: Option<String>,
    /// Months in effect for repeating coupons.
    #[serde(default)]
    pub duration_in_months: Option<i32>,
    /// Redemption cap.
    #[serde(default)]
    pub max_redemptions: Option<i32>,
    /// Last moment the coupon can be redeemed.
    #[serde(default)]
    pub redeem_by: Option<DateTime<Utc>>,
}

/// Validated coupon terms, with `amount_off` converted to cents.
///
/// These are sent to the gateway verbatim and then used to build the local row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouponTerms {
    /// Uppercase code.
    pub code: String,
    /// Duration kind.
    pub duration: Duration,
    /// Fixed discount in cents.
    pub amount_off: Option<i64>,
    /// Percentage discount.
    pub percent_off: Option<i32>,
    /// Lowercase currency code, set iff `amount_off` is.
    pub currency: Option<String>,
    /// Months in effect, set iff duration is repeating.
    pub duration_in_months: Option<i32>,
    /// Redemption cap.
    pub max_redemptions: Option<i32>,
    /// Last moment the coupon can be redeemed.
    pub redeem_by: Option<DateTime<Utc>>,
}

impl CouponParams {
    /// Validate and normalize into gateway-ready terms.
    ///
    /// # Errors
    ///
    /// Returns a [`BillingError`] naming the first violated field rule.
    pub fn into_terms(self) -> Result<CouponTerms> {
        let code = match self.code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => code.to_uppercase(),
            _ => random_code(),
        };
        if !code.chars().all(is_code_symbol) {
            return Err(BillingError::InvalidCouponCode(code));
        }
        let duration = self.duration.unwrap_or(Duration::Forever);

        let (amount_off, percent_off, currency) = match (self.amount_off, self.percent_off) {
            (Some(dollars), None) => {
                let cents = dollars_to_cents(dollars);
                if cents <= 0 {
                    return Err(BillingError::AmountNotPositive);
                }
                if cents > MAX_AMOUNT_OFF_CENTS {
                    return Err(BillingError::AmountTooLarge {
                        max: MAX_AMOUNT_OFF_CENTS,
                    });
                }
                let currency = self
                    .currency
                    .filter(|c| !c.trim().is_empty())
                    .ok_or(BillingError::CurrencyRequired)?
                    .trim()
                    .to_lowercase();
                if !Currency::is_supported(&currency) {
                    return Err(BillingError::UnknownCurrency(currency));
                }
                (Some(cents), None, Some(currency))
            }
            (None, Some(percent)) => {
                if !(1..=100).contains(&percent) {
                    return Err(BillingError::PercentOutOfRange(percent));
                }
                (None, Some(percent), None)
            }
            _ => return Err(BillingError::DiscountExclusivity),
        };

        let duration_in_months = match (duration, self.duration_in_months) {
            (Duration::Repeating, Some(months)) if months > 0 => Some(months),
            (Duration::Repeating, _) | (_, Some(_)) => {
                return Err(BillingError::DurationInMonths)
            }
            _ => None,
        };

        if matches!(self.max_redemptions, Some(max) if max <= 0) {
            return Err(BillingError::MaxRedemptions);
        }

        Ok(CouponTerms {
            code,
            duration,
            amount_off,
            percent_off,
            currency,
            duration_in_months,
            max_redemptions: self.max_redemptions,
            redeem_by: self.redeem_by,
        })
    }
}

/// A locally mirrored coupon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    /// Row id.
    pub id: CouponId,
    /// Unique uppercase code.
    pub code: String,
    /// Duration kind.
    pub duration: Duration,
    /// Fixed discount in cents.
    pub amount_off: Option<i64>,
    /// Percentage discount.
    pub percent_off: Option<i32>,
    /// Currency for `amount_off`.
    pub currency: Option<String>,
    /// Months in effect for repeating coupons.
    pub duration_in_months: Option<i32>,
    /// Redemption cap.
    pub max_redemptions: Option<i32>,
    /// Last moment the coupon can be redeemed.
    pub redeem_by: Option<DateTime<Utc>>,
    /// Times redeemed so far. Never decreases.
    pub times_redeemed: i32,
    /// Cleared when the cap is hit or the coupon expires. Never set back.
    pub valid: bool,
    /// When the coupon was created.
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Build the local row for gateway-accepted terms.
    #[must_use]
    pub fn from_terms(terms: CouponTerms) -> Self {
        Self {
            id: CouponId::generate(),
            code: terms.code,
            duration: terms.duration,
            amount_off: terms.amount_off,
            percent_off: terms.percent_off,
            currency: terms.currency,
            duration_in_months: terms.duration_in_months,
            max_redemptions: terms.max_redemptions,
            redeem_by: terms.redeem_by,
            times_redeemed: 0,
            valid: true,
            created_at: Utc::now(),
        }
    }

    /// Whether the coupon can still be applied at `now`.
    #[must_use]
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.valid && self.redeem_by.map_or(true, |by| by >= now)
    }

    /// Count one redemption, invalidating the coupon once the cap is reached.
    pub fn redeem(&mut self) {
        self.times_redeemed += 1;
        if matches!(self.max_redemptions, Some(max) if self.times_redeemed >= max) {
            self.valid = false;
        }
    }

    /// Whether the coupon is past its redeem-by date at `compare`.
    #[must_use]
    pub fn is_expired_at(&self, compare: DateTime<Utc>) -> bool {
        self.redeem_by.is_some_and(|by| by <= compare)
    }

    /// Public view used by the discount-code lookup.
    #[must_use]
    pub fn view(&self) -> CouponView {
        CouponView {
            duration: self.duration,
            duration_in_months: self.duration_in_months,
            amount_off: self.amount_off.map(cents_to_dollars),
            percent_off: self.percent_off,
        }
    }
}

/// Serialized coupon returned to the discount-code form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouponView {
    /// Duration kind.
    pub duration: Duration,
    /// Months in effect for repeating coupons.
    pub duration_in_months: Option<i32>,
    /// Fixed discount in dollars.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_off: Option<f64>,
    /// Percentage discount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_off: Option<i32>,
}
