//! Stripe API client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};

use catwatch_core::CouponTerms;

use super::types::{Customer, Deleted, EventHeader, StripeErrorResponse, Subscription};
use crate::gateway::{
    GatewayError, PaymentGateway, RemoteCustomer, RemoteEvent, RemoteSubscription,
    SubscriptionRequest,
};

/// Stripe API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.stripe.com/v1";

/// Stripe API client.
///
/// The API key is bound at construction; nothing is read from global state.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_key: String,
    base_url: Url,
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::Connection(err.to_string())
        } else {
            Self::Api(err.to_string())
        }
    }
}

/// Map a Stripe error body onto a gateway error kind.
fn classify(status: StatusCode, error_type: &str, message: String) -> GatewayError {
    match error_type {
        "card_error" => GatewayError::CardDeclined(message),
        "invalid_request_error" => GatewayError::InvalidRequest(message),
        "authentication_error" => GatewayError::Authentication(message),
        "api_connection_error" => GatewayError::Connection(message),
        _ if status == StatusCode::UNAUTHORIZED => GatewayError::Authentication(message),
        _ => GatewayError::Api(message),
    }
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Stripe secret API key (`sk_test_...` or `sk_live_...`)
    /// * `base_url` - API root, normally [`DEFAULT_BASE_URL`]
    /// * `timeout` - Upper bound on every request
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or `base_url` is
    /// not an absolute URL.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Api(format!("failed to build HTTP client: {e}")))?;

        let base_url: String = base_url.into();
        let base_url = Url::parse(&base_url)
            .map_err(|e| GatewayError::Api(format!("invalid base URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::Api(format!(
                "base URL cannot take a path: {base_url}"
            )));
        }

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url,
        })
    }

    /// Resolve path segments against the base URL.
    ///
    /// Each segment is percent-encoded, so ids holding `/`, `?`, `#` or `%`
    /// stay inside their segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get(&self, segments: &[&str]) -> RequestBuilder {
        self.client
            .get(self.url(segments))
            .basic_auth(&self.api_key, Option::<&str>::None)
    }

    fn post(&self, segments: &[&str]) -> RequestBuilder {
        self.client
            .post(self.url(segments))
            .basic_auth(&self.api_key, Option::<&str>::None)
    }

    fn delete(&self, segments: &[&str]) -> RequestBuilder {
        self.client
            .delete(self.url(segments))
            .basic_auth(&self.api_key, Option::<&str>::None)
    }

    async fn customer(&self, customer_id: &str) -> Result<Customer, GatewayError> {
        let response = self.get(&["customers", customer_id]).send().await?;
        Self::handle_response(response).await
    }

    /// The id of the customer's first subscription.
    async fn subscription_id(&self, customer_id: &str) -> Result<String, GatewayError> {
        self.customer(customer_id)
            .await?
            .subscriptions
            .data
            .into_iter()
            .next()
            .map(|s| s.id)
            .ok_or_else(|| {
                GatewayError::InvalidRequest(format!("customer {customer_id} has no subscription"))
            })
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error_body: Result<StripeErrorResponse, _> = response.json().await;

        let err = match error_body {
            Ok(body) => classify(status, &body.error.error_type, body.error.message),
            Err(_) => classify(status, "unknown", format!("HTTP {status}")),
        };
        tracing::warn!(status = %status, error = %err, "Stripe request failed");
        Err(err)
    }
}

fn coupon_form(terms: &CouponTerms) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("id", terms.code.clone()),
        ("duration", terms.duration.as_str().to_string()),
    ];
    if let Some(amount_off) = terms.amount_off {
        params.push(("amount_off", amount_off.to_string()));
    }
    if let Some(currency) = &terms.currency {
        params.push(("currency", currency.clone()));
    }
    if let Some(percent_off) = terms.percent_off {
        params.push(("percent_off", percent_off.to_string()));
    }
    if let Some(months) = terms.duration_in_months {
        params.push(("duration_in_months", months.to_string()));
    }
    if let Some(max) = terms.max_redemptions {
        params.push(("max_redemptions", max.to_string()));
    }
    if let Some(redeem_by) = terms.redeem_by {
        params.push(("redeem_by", redeem_by.timestamp().to_string()));
    }
    params
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_customer_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<RemoteCustomer, GatewayError> {
        let mut params = vec![
            ("source", request.token.clone()),
            ("email", request.email.clone()),
            ("plan", request.plan.clone()),
        ];
        if let Some(coupon) = &request.coupon {
            params.push(("coupon", coupon.clone()));
        }

        tracing::debug!(plan = %request.plan, "Creating Stripe customer with subscription");

        let response = self
            .post(&["customers"])
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&params)
            .send()
            .await?;

        let customer: Customer = Self::handle_response(response).await?;
        Ok(customer.into())
    }

    async fn update_subscription(
        &self,
        customer_id: &str,
        plan: &str,
        coupon: Option<String>,
    ) -> Result<RemoteSubscription, GatewayError> {
        let subscription_id = self.subscription_id(customer_id).await?;

        let mut params = vec![("plan", plan.to_string())];
        if let Some(coupon) = coupon {
            params.push(("coupon", coupon));
        }

        let response = self
            .post(&["subscriptions", subscription_id.as_str()])
            .form(&params)
            .send()
            .await?;

        let subscription: Subscription = Self::handle_response(response).await?;
        Ok(subscription.into())
    }

    async fn cancel_subscription(
        &self,
        customer_id: &str,
    ) -> Result<RemoteSubscription, GatewayError> {
        let subscription_id = self.subscription_id(customer_id).await?;

        let response = self
            .delete(&["subscriptions", subscription_id.as_str()])
            .send()
            .await?;

        let subscription: Subscription = Self::handle_response(response).await?;
        Ok(subscription.into())
    }

    async fn update_card(
        &self,
        customer_id: &str,
        token: &str,
    ) -> Result<RemoteCustomer, GatewayError> {
        let response = self
            .post(&["customers", customer_id])
            .form(&[("source", token)])
            .send()
            .await?;

        let customer: Customer = Self::handle_response(response).await?;
        Ok(customer.into())
    }

    async fn upcoming_invoice(&self, customer_id: &str) -> Result<serde_json::Value, GatewayError> {
        let response = self
            .get(&["invoices", "upcoming"])
            .query(&[("customer", customer_id)])
            .send()
            .await?;

        Self::handle_response(response).await
    }

    async fn create_coupon(&self, terms: &CouponTerms) -> Result<(), GatewayError> {
        let response = self
            .post(&["coupons"])
            .form(&coupon_form(terms))
            .send()
            .await?;

        let _: serde_json::Value = Self::handle_response(response).await?;
        Ok(())
    }

    async fn delete_coupon(&self, code: &str) -> Result<bool, GatewayError> {
        let response = self.delete(&["coupons", code]).send().await?;
        let deleted: Deleted = Self::handle_response(response).await?;
        Ok(deleted.deleted)
    }

    async fn retrieve_event(&self, event_id: &str) -> Result<RemoteEvent, GatewayError> {
        let response = self.get(&["events", event_id]).send().await?;
        let payload: serde_json::Value = Self::handle_response(response).await?;
        let header: EventHeader = serde_json::from_value(payload.clone())
            .map_err(|e| GatewayError::Api(format!("malformed event: {e}")))?;

        Ok(RemoteEvent {
            id: header.id,
            event_type: header.event_type,
            payload,
        })
    }

    async fn retrieve_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<RemoteCustomer>, GatewayError> {
        let response = self.get(&["customers", customer_id]).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let customer: Customer = Self::handle_response(response).await?;
        if customer.deleted {
            return Ok(None);
        }
        Ok(Some(customer.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catwatch_core::CouponParams;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> StripeClient {
        StripeClient::new("sk_test_xxx", server.uri(), Duration::from_secs(5)).unwrap()
    }

    fn customer_json() -> serde_json::Value {
        serde_json::json!({
            "id": "cus_000",
            "object": "customer",
            "sources": {
                "object": "list",
                "data": [{
                    "id": "card_000",
                    "brand": "Visa",
                    "last4": "4242",
                    "exp_month": 6,
                    "exp_year": 2016
                }],
                "has_more": false
            },
            "subscriptions": {
                "object": "list",
                "data": [{ "id": "sub_000", "status": "active", "plan": { "id": "gold" } }],
                "has_more": false
            }
        })
    }

    #[test]
    fn classifies_stripe_error_types() {
        let ok = StatusCode::PAYMENT_REQUIRED;
        assert!(matches!(
            classify(ok, "card_error", String::new()),
            GatewayError::CardDeclined(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, "invalid_request_error", String::new()),
            GatewayError::InvalidRequest(_)
        ));
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, "unknown", String::new()),
            GatewayError::Authentication(_)
        ));
        assert!(matches!(
            classify(StatusCode::INTERNAL_SERVER_ERROR, "api_error", String::new()),
            GatewayError::Api(_)
        ));
    }

    #[test]
    fn coupon_form_sends_cents_and_code_as_id() {
        let terms = CouponParams {
            code: Some("5off".into()),
            amount_off: Some(5.0),
            currency: Some("USD".into()),
            ..CouponParams::default()
        }
        .into_terms()
        .unwrap();

        let form = coupon_form(&terms);
        assert!(form.contains(&("id", "5OFF".to_string())));
        assert!(form.contains(&("amount_off", "500".to_string())));
        assert!(form.contains(&("currency", "usd".to_string())));
        assert!(!form.iter().any(|(k, _)| *k == "percent_off"));
    }

    #[tokio::test]
    async fn create_customer_sends_idempotency_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/customers"))
            .and(header("Idempotency-Key", "key-1"))
            .and(body_string_contains("plan=gold"))
            .respond_with(ResponseTemplate::new(200).set_body_json(customer_json()))
            .expect(1)
            .mount(&server)
            .await;

        let request = SubscriptionRequest {
            token: "tok_visa".into(),
            email: "foo@example.com".into(),
            plan: "gold".into(),
            coupon: None,
            idempotency_key: "key-1".into(),
        };
        let customer = client(&server)
            .create_customer_subscription(&request)
            .await
            .unwrap();

        assert_eq!(customer.id, "cus_000");
        assert_eq!(customer.card.unwrap().last4, "4242");
        assert_eq!(customer.subscriptions[0].id, "sub_000");
    }

    #[tokio::test]
    async fn declined_card_maps_to_card_declined() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/customers"))
            .respond_with(ResponseTemplate::new(402).set_body_json(serde_json::json!({
                "error": { "type": "card_error", "message": "Your card was declined.", "code": "card_declined" }
            })))
            .mount(&server)
            .await;

        let request = SubscriptionRequest {
            token: "tok_chargeDeclined".into(),
            email: "foo@example.com".into(),
            plan: "gold".into(),
            coupon: None,
            idempotency_key: "key-2".into(),
        };
        let err = client(&server)
            .create_customer_subscription(&request)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::CardDeclined(_)));
    }

    #[tokio::test]
    async fn cancel_deletes_first_subscription() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers/cus_000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(customer_json()))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/subscriptions/sub_000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "sub_000", "status": "canceled", "plan": { "id": "gold" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sub = client(&server).cancel_subscription("cus_000").await.unwrap();
        assert_eq!(sub.status, "canceled");
    }

    #[tokio::test]
    async fn missing_customer_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers/cus_gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": { "type": "invalid_request_error", "message": "No such customer" }
            })))
            .mount(&server)
            .await;

        assert!(client(&server)
            .retrieve_customer("cus_gone")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn ids_are_escaped_in_paths() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/coupons/SAVE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "SAVE", "deleted": true
            })))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/coupons/SAVE%2310"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "SAVE#10", "deleted": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client(&server).delete_coupon("SAVE#10").await.unwrap());

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.path(), "/coupons/SAVE%2310");
    }

    #[tokio::test]
    async fn slash_in_id_stays_in_one_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events/a%2Fb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "a/b", "type": "invoice.created", "data": { "object": {} }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let event = client(&server).retrieve_event("a/b").await.unwrap();
        assert_eq!(event.id, "a/b");
    }

    #[tokio::test]
    async fn base_path_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/customers/cus_000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(customer_json()))
            .expect(1)
            .mount(&server)
            .await;

        let client = StripeClient::new(
            "sk_test_xxx",
            format!("{}/v1/", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(client.retrieve_customer("cus_000").await.unwrap().is_some());
    }

    #[test]
    fn rejects_relative_base_url() {
        let result = StripeClient::new("sk_test_xxx", "api.stripe.com", Duration::from_secs(1));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unreachable_gateway_is_connection_error() {
        let client =
            StripeClient::new("sk_test_xxx", "http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        let err = client.retrieve_event("evt_000").await.unwrap_err();
        assert!(matches!(err, GatewayError::Connection(_)));
    }
}
