use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::models::subscriptions::BillingProvider;
use crate::payments::{
    plan_code, CheckoutRequest, CheckoutSession, CheckoutStatus, PaymentError, PaymentProvider,
    VerifiedCheckout, WebhookEvent,
};

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
    subscription: Option<String>,
    customer: Option<String>,
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    base_url: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            base_url: "https://api.stripe.com".to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    fn kind(&self) -> BillingProvider {
        BillingProvider::Stripe
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);
        let price = plan_code(request.tier, request.billing_cycle);

        let params = [
            ("mode", "subscription"),
            ("customer_email", &request.email),
            ("client_reference_id", &request.reference),
            ("success_url", &request.success_url),
            ("cancel_url", &request.cancel_url),
            ("line_items[0][price]", &price),
            ("line_items[0][quantity]", "1"),
        ];

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await?;

        if response.status().is_success() {
            let session = response
                .json::<StripeSession>()
                .await
                .map_err(|e| PaymentError::ParseError(e.to_string()))?;
            let checkout_url = session
                .url
                .ok_or_else(|| PaymentError::ParseError("session has no url".to_string()))?;
            // The session id is the handle everything downstream keys on.
            Ok(CheckoutSession {
                checkout_url,
                reference: session.id,
            })
        } else {
            let error = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(PaymentError::ServiceError(error))
        }
    }

    async fn verify_checkout(&self, reference: &str) -> Result<VerifiedCheckout, PaymentError> {
        let url = format!("{}/v1/checkout/sessions/{}", self.base_url, reference);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        if response.status().is_success() {
            let session = response
                .json::<StripeSession>()
                .await
                .map_err(|e| PaymentError::ParseError(e.to_string()))?;
            let status = match session.payment_status.as_deref() {
                Some("paid") | Some("no_payment_required") => CheckoutStatus::Paid,
                Some("unpaid") => CheckoutStatus::Pending,
                _ => CheckoutStatus::Failed,
            };
            Ok(VerifiedCheckout {
                status,
                external_subscription_id: session.subscription,
                external_customer_id: session.customer,
            })
        } else {
            let error = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(PaymentError::ServiceError(error))
        }
    }

    fn parse_webhook(&self, payload: &serde_json::Value) -> Option<WebhookEvent> {
        let event_type = payload.get("type")?.as_str()?;
        let object = payload.get("data")?.get("object")?;

        match event_type {
            "checkout.session.completed" => Some(WebhookEvent::CheckoutCompleted {
                reference: object.get("id")?.as_str()?.to_string(),
            }),
            "invoice.paid" => Some(WebhookEvent::Renewal {
                external_subscription_id: object.get("subscription")?.as_str()?.to_string(),
            }),
            "customer.subscription.deleted" => Some(WebhookEvent::Cancellation {
                external_subscription_id: object.get("id")?.as_str()?.to_string(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> StripeClient {
        StripeClient::new("sk_test_123".to_string())
            .with_base_url("http://localhost:0".to_string())
    }

    #[test]
    fn parses_checkout_completed() {
        let payload = json!({
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_test_a1", "client_reference_id": "ref-1" } }
        });
        assert_eq!(
            client().parse_webhook(&payload),
            Some(WebhookEvent::CheckoutCompleted {
                reference: "cs_test_a1".to_string()
            })
        );
    }

    #[test]
    fn parses_invoice_paid_as_renewal() {
        let payload = json!({
            "type": "invoice.paid",
            "data": { "object": { "id": "in_1", "subscription": "sub_123" } }
        });
        assert_eq!(
            client().parse_webhook(&payload),
            Some(WebhookEvent::Renewal {
                external_subscription_id: "sub_123".to_string()
            })
        );
    }

    #[test]
    fn parses_subscription_deleted_as_cancellation() {
        let payload = json!({
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": "sub_123" } }
        });
        assert_eq!(
            client().parse_webhook(&payload),
            Some(WebhookEvent::Cancellation {
                external_subscription_id: "sub_123".to_string()
            })
        );
    }

    #[test]
    fn ignores_unrelated_events() {
        let payload = json!({
            "type": "payment_intent.created",
            "data": { "object": { "id": "pi_1" } }
        });
        assert_eq!(client().parse_webhook(&payload), None);
    }

    #[test]
    fn ignores_malformed_payloads() {
        assert_eq!(client().parse_webhook(&json!({})), None);
        assert_eq!(client().parse_webhook(&json!({"type": "invoice.paid"})), None);
    }
}
