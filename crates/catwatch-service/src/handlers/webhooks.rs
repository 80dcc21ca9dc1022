//! Stripe webhook handler.
//!
//! The route is unauthenticated. The posted body is only used for its event
//! id; the event itself is re-fetched from Stripe before anything is trusted.
//! Processing failures still answer 200 so Stripe does not keep retrying.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::billing::invoices::Ingested;
use crate::billing::BillingServiceError;
use crate::state::AppState;

type WebhookResponse = (StatusCode, Json<Value>);

fn error(status: StatusCode, message: impl Into<String>) -> WebhookResponse {
    (status, Json(json!({ "error": message.into() })))
}

/// Whether `id` looks like a Stripe event id (`evt_` plus alphanumerics).
fn is_event_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Handle a Stripe event notification.
pub async fn stripe_event(State(state): State<Arc<AppState>>, body: String) -> WebhookResponse {
    let event_id = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string))
        .filter(|id| is_event_id(id));

    let Some(event_id) = event_id else {
        tracing::warn!("Webhook body is not JSON or has no valid event id");
        return error(StatusCode::NOT_ACCEPTABLE, "Invalid Stripe event");
    };

    let event = match state.gateway.retrieve_event(&event_id).await {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(event_id = %event_id, error = %e, "Failed to re-fetch Stripe event");
            return error(StatusCode::OK, e.user_message());
        }
    };

    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Received Stripe event");

    match state.invoices.ingest(&event).await {
        Ok(Ingested::Saved(invoice)) => {
            tracing::debug!(event_id = %event.id, invoice_id = %invoice.id, "Event recorded");
            (StatusCode::OK, Json(json!({ "success": true })))
        }
        Ok(Ingested::Dropped | Ingested::Ignored) => {
            (StatusCode::OK, Json(json!({ "success": true })))
        }
        Err(BillingServiceError::Invalid(e)) => {
            tracing::warn!(event_id = %event.id, error = %e, "Unparseable Stripe event");
            error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        Err(e) => {
            tracing::error!(event_id = %event.id, error = %e, "Failed to process Stripe event");
            error(StatusCode::OK, "Event could not be processed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_are_word_characters() {
        assert!(is_event_id("evt_1A2b3C"));
        assert!(!is_event_id(""));
        assert!(!is_event_id("a/b"));
        assert!(!is_event_id("evt_1?x=1"));
        assert!(!is_event_id("evt#1"));
        assert!(!is_event_id("../customers"));
    }
}
