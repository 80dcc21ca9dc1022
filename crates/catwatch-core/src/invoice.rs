//! Invoice ledger records and gateway payload parsing.
//!
//! Invoices are append-only. They are parsed from gateway invoice objects and
//! carry a copy of the card that was on file when they were recorded.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::credit_card::CreditCard;
use crate::error::{BillingError, Result};
use crate::plan::Interval;
use crate::{InvoiceId, UserId};

/// Display format for upcoming bill dates, e.g. `June 01, 2015`.
pub const NEXT_BILL_FORMAT: &str = "%B %d, %Y";

// Gateway wire shapes. Only the fields the ledger needs are modelled.

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: InvoiceObject,
}

#[derive(Debug, Deserialize)]
struct InvoiceObject {
    customer: String,
    #[serde(default)]
    receipt_number: Option<String>,
    currency: String,
    #[serde(default)]
    tax: Option<i64>,
    #[serde(default)]
    tax_percent: Option<f64>,
    #[serde(default)]
    total: i64,
    #[serde(default)]
    amount_due: i64,
    #[serde(default)]
    date: Option<i64>,
    #[serde(default)]
    next_payment_attempt: Option<i64>,
    lines: LineList,
}

#[derive(Debug, Deserialize)]
struct LineList {
    data: Vec<LineItem>,
}

#[derive(Debug, Deserialize)]
struct LineItem {
    period: Period,
    plan: Option<LinePlan>,
}

#[derive(Debug, Deserialize)]
struct Period {
    start: i64,
    end: i64,
}

#[derive(Debug, Deserialize)]
struct LinePlan {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    statement_descriptor: Option<String>,
    #[serde(default)]
    interval: Option<Interval>,
}

impl LinePlan {
    fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.id.clone())
            .unwrap_or_default()
    }
}

impl InvoiceObject {
    fn first_line(&self) -> Result<&LineItem> {
        self.lines
            .data
            .first()
            .ok_or_else(|| BillingError::MalformedPayload("invoice has no line items".into()))
    }
}

fn date_from_timestamp(ts: i64) -> Result<NaiveDate> {
    datetime_from_timestamp(ts).map(|dt| dt.date_naive())
}

fn datetime_from_timestamp(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| BillingError::MalformedPayload(format!("invalid timestamp {ts}")))
}

fn malformed(e: &serde_json::Error) -> BillingError {
    BillingError::MalformedPayload(e.to_string())
}

/// Invoice fields extracted from an `invoice.*` gateway event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedInvoice {
    /// Gateway customer id the invoice belongs to.
    pub payment_id: String,
    /// Plan name.
    pub plan: String,
    /// Receipt number, once the invoice is paid.
    pub receipt_number: Option<String>,
    /// Plan statement descriptor.
    pub description: Option<String>,
    /// Billing period start.
    pub period_start_on: NaiveDate,
    /// Billing period end.
    pub period_end_on: NaiveDate,
    /// Lowercase currency code.
    pub currency: String,
    /// Tax in cents.
    pub tax: Option<i64>,
    /// Tax rate in percent.
    pub tax_percent: Option<f64>,
    /// Total in cents.
    pub total: i64,
}

impl ParsedInvoice {
    /// Parse a full event payload (`{"data": {"object": <invoice>}}`).
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::MalformedPayload`] if required fields are missing.
    pub fn from_event_payload(payload: &serde_json::Value) -> Result<Self> {
        let envelope = EventEnvelope::deserialize(payload).map_err(|e| malformed(&e))?;
        let invoice = envelope.data.object;
        let line = invoice.first_line()?;
        let plan = line
            .plan
            .as_ref()
            .ok_or_else(|| BillingError::MalformedPayload("line item has no plan".into()))?;

        Ok(Self {
            payment_id: invoice.customer.clone(),
            plan: plan.display_name(),
            receipt_number: invoice.receipt_number.clone(),
            description: plan.statement_descriptor.clone(),
            period_start_on: date_from_timestamp(line.period.start)?,
            period_end_on: date_from_timestamp(line.period.end)?,
            currency: invoice.currency.clone(),
            tax: invoice.tax,
            tax_percent: invoice.tax_percent,
            total: invoice.total,
        })
    }
}

/// A recorded invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Row id.
    pub id: InvoiceId,
    /// Owning user. Cleared if the user is deleted so history survives.
    pub user_id: Option<UserId>,
    /// Plan name.
    pub plan: String,
    /// Receipt number.
    pub receipt_number: Option<String>,
    /// Statement descriptor.
    pub description: Option<String>,
    /// Billing period start.
    pub period_start_on: NaiveDate,
    /// Billing period end.
    pub period_end_on: NaiveDate,
    /// Lowercase currency code.
    pub currency: String,
    /// Tax in cents.
    pub tax: Option<i64>,
    /// Tax rate in percent.
    pub tax_percent: Option<f64>,
    /// Total in cents.
    pub total: i64,
    /// Card brand at the time of invoicing.
    pub brand: String,
    /// Card last four at the time of invoicing.
    pub last4: String,
    /// Card expiry at the time of invoicing.
    pub exp_date: NaiveDate,
    /// When the invoice was recorded.
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// Build a ledger row from a parsed event and the user's current card.
    #[must_use]
    pub fn from_parsed(parsed: ParsedInvoice, card: &CreditCard) -> Self {
        Self {
            id: InvoiceId::generate(),
            user_id: Some(card.user_id),
            plan: parsed.plan,
            receipt_number: parsed.receipt_number,
            description: parsed.description,
            period_start_on: parsed.period_start_on,
            period_end_on: parsed.period_end_on,
            currency: parsed.currency,
            tax: parsed.tax,
            tax_percent: parsed.tax_percent,
            total: parsed.total,
            brand: card.brand.clone(),
            last4: card.last4.clone(),
            exp_date: card.exp_date,
            created_at: Utc::now(),
        }
    }
}

/// Preview of the next bill.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingInvoice {
    /// Plan name.
    pub plan: String,
    /// Plan statement descriptor.
    pub description: Option<String>,
    /// Billing interval.
    pub interval: Option<Interval>,
    /// Amount due in cents.
    pub amount_due: i64,
    /// When the bill will be issued.
    pub next_bill_on: DateTime<Utc>,
    /// `next_bill_on` formatted for display.
    pub next_bill_on_formatted: String,
}

impl UpcomingInvoice {
    /// Reshape a gateway upcoming-invoice object.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::MalformedPayload`] if required fields are missing.
    pub fn from_api(payload: &serde_json::Value) -> Result<Self> {
        let invoice = InvoiceObject::deserialize(payload).map_err(|e| malformed(&e))?;
        let line = invoice.first_line()?;
        let plan = line.plan.as_ref();

        let bill_ts = invoice
            .date
            .or(invoice.next_payment_attempt)
            .unwrap_or(line.period.start);
        let next_bill_on = datetime_from_timestamp(bill_ts)?;

        Ok(Self {
            plan: plan.map(LinePlan::display_name).unwrap_or_default(),
            description: plan.and_then(|p| p.statement_descriptor.clone()),
            interval: plan.and_then(|p| p.interval),
            amount_due: invoice.amount_due,
            next_bill_on,
            next_bill_on_formatted: next_bill_on.format(NEXT_BILL_FORMAT).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invoice_object() -> serde_json::Value {
        json!({
            "id": "in_000",
            "object": "invoice",
            "date": 1_433_018_770,
            "customer": "cus_000",
            "currency": "usd",
            "receipt_number": "1234-5678",
            "tax": null,
            "tax_percent": null,
            "total": 500,
            "amount_due": 500,
            "lines": {
                "data": [{
                    "id": "sub_000",
                    "period": { "start": 1_433_161_742, "end": 1_434_371_342 },
                    "plan": {
                        "id": "gold",
                        "name": "Gold",
                        "interval": "month",
                        "statement_descriptor": "GOLD MONTHLY"
                    }
                }]
            }
        })
    }

    #[test]
    fn parses_event_payload() {
        let payload = json!({ "id": "evt_000", "data": { "object": invoice_object() } });
        let parsed = ParsedInvoice::from_event_payload(&payload).unwrap();

        assert_eq!(parsed.payment_id, "cus_000");
        assert_eq!(parsed.plan, "Gold");
        assert_eq!(parsed.description.as_deref(), Some("GOLD MONTHLY"));
        assert_eq!(parsed.receipt_number.as_deref(), Some("1234-5678"));
        assert_eq!(
            parsed.period_start_on,
            NaiveDate::from_ymd_opt(2015, 6, 1).unwrap()
        );
        assert_eq!(
            parsed.period_end_on,
            NaiveDate::from_ymd_opt(2015, 6, 15).unwrap()
        );
        assert_eq!(parsed.total, 500);
        assert_eq!(parsed.tax, None);
    }

    #[test]
    fn event_without_lines_is_malformed() {
        let mut object = invoice_object();
        object["lines"]["data"] = json!([]);
        let payload = json!({ "data": { "object": object } });

        assert!(matches!(
            ParsedInvoice::from_event_payload(&payload),
            Err(BillingError::MalformedPayload(_))
        ));
    }

    #[test]
    fn event_without_customer_is_malformed() {
        let payload = json!({ "data": { "object": { "currency": "usd" } } });
        assert!(ParsedInvoice::from_event_payload(&payload).is_err());
    }

    #[test]
    fn parses_upcoming_invoice() {
        let upcoming = UpcomingInvoice::from_api(&invoice_object()).unwrap();

        assert_eq!(upcoming.plan, "Gold");
        assert_eq!(upcoming.interval, Some(Interval::Month));
        assert_eq!(upcoming.amount_due, 500);
        assert_eq!(upcoming.next_bill_on_formatted, "May 30, 2015");
    }

    #[test]
    fn invoice_copies_card_fields() {
        let payload = json!({ "data": { "object": invoice_object() } });
        let parsed = ParsedInvoice::from_event_payload(&payload).unwrap();
        let card = CreditCard {
            id: crate::CreditCardId::generate(),
            user_id: UserId::generate(),
            brand: "Visa".into(),
            last4: "4242".into(),
            exp_date: NaiveDate::from_ymd_opt(2016, 6, 1).unwrap(),
            is_expiring: false,
        };

        let invoice = Invoice::from_parsed(parsed, &card);
        assert_eq!(invoice.user_id, Some(card.user_id));
        assert_eq!(invoice.brand, "Visa");
        assert_eq!(invoice.exp_date, card.exp_date);
    }
}
