//! Invoice ledger.

use std::sync::Arc;

use catwatch_core::{Invoice, ParsedInvoice, UpcomingInvoice, UserId};
use catwatch_store::Store;

use super::Result;
use crate::gateway::{PaymentGateway, RemoteEvent};

/// Event type prefix the ledger records.
const INVOICE_EVENT_PREFIX: &str = "invoice.";

/// What happened to an ingested event.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    /// Not an invoice event.
    Ignored,
    /// No matching user, or the user has no card on file.
    Dropped,
    /// Recorded in the ledger.
    Saved(Invoice),
}

/// Records invoices and previews upcoming ones.
#[derive(Clone)]
pub struct InvoiceService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
}

impl InvoiceService {
    /// Create the service.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Record an invoice event that was re-fetched from the gateway.
    pub async fn ingest(&self, event: &RemoteEvent) -> Result<Ingested> {
        if !event.event_type.starts_with(INVOICE_EVENT_PREFIX) {
            tracing::debug!(event_id = %event.id, event_type = %event.event_type, "Ignoring non-invoice event");
            return Ok(Ingested::Ignored);
        }

        let parsed = ParsedInvoice::from_event_payload(&event.payload)?;
        Ok(match self.prepare_and_save(parsed).await? {
            Some(invoice) => Ingested::Saved(invoice),
            None => Ingested::Dropped,
        })
    }

    /// Attach the owner's current card and store the invoice.
    ///
    /// Returns `None` when the customer is unknown or has no card.
    pub async fn prepare_and_save(&self, parsed: ParsedInvoice) -> Result<Option<Invoice>> {
        let Some(user) = self.store.find_user_by_payment_id(&parsed.payment_id).await? else {
            tracing::info!(customer_id = %parsed.payment_id, "Dropping invoice for unknown customer");
            return Ok(None);
        };
        let Some(card) = self.store.get_credit_card(&user.id).await? else {
            tracing::info!(user_id = %user.id, "Dropping invoice for user without a card");
            return Ok(None);
        };

        let invoice = Invoice::from_parsed(parsed, &card);
        self.store.insert_invoice(&invoice).await?;

        tracing::info!(
            user_id = %user.id,
            invoice_id = %invoice.id,
            total = invoice.total,
            "Invoice recorded"
        );
        Ok(Some(invoice))
    }

    /// A user's most recent invoices.
    pub async fn billing_history(&self, user_id: &UserId, limit: usize) -> Result<Vec<Invoice>> {
        Ok(self.store.list_invoices_by_user(user_id, limit).await?)
    }

    /// Preview the next bill for a gateway customer.
    pub async fn upcoming(&self, customer_id: &str) -> Result<UpcomingInvoice> {
        let raw = self.gateway.upcoming_invoice(customer_id).await?;
        Ok(UpcomingInvoice::from_api(&raw)?)
    }
}
