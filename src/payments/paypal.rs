use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::models::subscriptions::BillingProvider;
use crate::payments::{
    plan_code, CheckoutRequest, CheckoutSession, CheckoutStatus, PaymentError, PaymentProvider,
    VerifiedCheckout, WebhookEvent,
};

#[derive(Debug, Deserialize)]
struct PaypalTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PaypalSubscription {
    id: String,
    status: Option<String>,
    links: Option<Vec<PaypalLink>>,
    subscriber: Option<PaypalSubscriber>,
}

#[derive(Debug, Deserialize)]
struct PaypalLink {
    rel: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct PaypalSubscriber {
    payer_id: Option<String>,
}

#[derive(Clone)]
pub struct PaypalClient {
    client: Client,
    client_id: String,
    client_secret: String,
    base_url: String,
}

impl PaypalClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client: Client::new(),
            client_id,
            client_secret,
            base_url: "https://api-m.paypal.com".to_string(),
        }
    }

    pub fn new_sandbox(client_id: String, client_secret: String) -> Self {
        Self {
            client: Client::new(),
            client_id,
            client_secret,
            base_url: "https://api-m.sandbox.paypal.com".to_string(),
        }
    }

    /// Client-credentials grant. PayPal tokens last hours but requesting a
    /// fresh one per call keeps this client stateless.
    async fn access_token(&self) -> Result<String, PaymentError> {
        let url = format!("{}/v1/oauth2/token", self.base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if response.status().is_success() {
            response
                .json::<PaypalTokenResponse>()
                .await
                .map(|t| t.access_token)
                .map_err(|e| PaymentError::ParseError(e.to_string()))
        } else {
            let error = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(PaymentError::ServiceError(error))
        }
    }
}

#[async_trait]
impl PaymentProvider for PaypalClient {
    fn kind(&self) -> BillingProvider {
        BillingProvider::Paypal
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let token = self.access_token().await?;
        let url = format!("{}/v1/billing/subscriptions", self.base_url);

        let body = json!({
            "plan_id": plan_code(request.tier, request.billing_cycle),
            "custom_id": request.reference,
            "subscriber": { "email_address": request.email },
            "application_context": {
                "return_url": request.success_url,
                "cancel_url": request.cancel_url,
            },
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            let subscription = response
                .json::<PaypalSubscription>()
                .await
                .map_err(|e| PaymentError::ParseError(e.to_string()))?;
            let approve_url = subscription
                .links
                .unwrap_or_default()
                .into_iter()
                .find(|link| link.rel == "approve")
                .map(|link| link.href)
                .ok_or_else(|| PaymentError::ParseError("no approve link".to_string()))?;
            Ok(CheckoutSession {
                checkout_url: approve_url,
                reference: subscription.id,
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
        let token = self.access_token().await?;
        let url = format!("{}/v1/billing/subscriptions/{}", self.base_url, reference);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await?;

        if response.status().is_success() {
            let subscription = response
                .json::<PaypalSubscription>()
                .await
                .map_err(|e| PaymentError::ParseError(e.to_string()))?;
            let status = match subscription.status.as_deref() {
                Some("ACTIVE") => CheckoutStatus::Paid,
                Some("APPROVED") | Some("APPROVAL_PENDING") => CheckoutStatus::Pending,
                _ => CheckoutStatus::Failed,
            };
            Ok(VerifiedCheckout {
                status,
                external_subscription_id: Some(subscription.id),
                external_customer_id: subscription.subscriber.and_then(|s| s.payer_id),
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
        let event_type = payload.get("event_type")?.as_str()?;
        let resource = payload.get("resource")?;

        match event_type {
            "BILLING.SUBSCRIPTION.ACTIVATED" => Some(WebhookEvent::CheckoutCompleted {
                reference: resource.get("id")?.as_str()?.to_string(),
            }),
            "PAYMENT.SALE.COMPLETED" => Some(WebhookEvent::Renewal {
                external_subscription_id: resource
                    .get("billing_agreement_id")?
                    .as_str()?
                    .to_string(),
            }),
            "BILLING.SUBSCRIPTION.CANCELLED" | "BILLING.SUBSCRIPTION.EXPIRED" => {
                Some(WebhookEvent::Cancellation {
                    external_subscription_id: resource.get("id")?.as_str()?.to_string(),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PaypalClient {
        PaypalClient::new_sandbox("client-id".to_string(), "client-secret".to_string())
    }

    #[test]
    fn parses_subscription_activated_as_checkout() {
        let payload = json!({
            "event_type": "BILLING.SUBSCRIPTION.ACTIVATED",
            "resource": { "id": "I-ABC123" }
        });
        assert_eq!(
            client().parse_webhook(&payload),
            Some(WebhookEvent::CheckoutCompleted {
                reference: "I-ABC123".to_string()
            })
        );
    }

    #[test]
    fn parses_sale_completed_as_renewal() {
        let payload = json!({
            "event_type": "PAYMENT.SALE.COMPLETED",
            "resource": { "id": "SALE-1", "billing_agreement_id": "I-ABC123" }
        });
        assert_eq!(
            client().parse_webhook(&payload),
            Some(WebhookEvent::Renewal {
                external_subscription_id: "I-ABC123".to_string()
            })
        );
    }

    #[test]
    fn parses_cancellation_and_expiry() {
        for event_type in ["BILLING.SUBSCRIPTION.CANCELLED", "BILLING.SUBSCRIPTION.EXPIRED"] {
            let payload = json!({
                "event_type": event_type,
                "resource": { "id": "I-ABC123" }
            });
            assert_eq!(
                client().parse_webhook(&payload),
                Some(WebhookEvent::Cancellation {
                    external_subscription_id: "I-ABC123".to_string()
                })
            );
        }
    }

    #[test]
    fn ignores_unknown_events() {
        let payload = json!({
            "event_type": "CHECKOUT.ORDER.APPROVED",
            "resource": { "id": "5O190127TN364715T" }
        });
        assert_eq!(client().parse_webhook(&payload), None);
    }
}
