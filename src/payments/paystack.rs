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
struct PaystackResponse<T> {
    status: bool,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PaystackInitData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct PaystackVerifyData {
    status: String,
    subscription_code: Option<String>,
    customer: Option<PaystackCustomer>,
}

#[derive(Debug, Deserialize)]
struct PaystackCustomer {
    customer_code: Option<String>,
}

#[derive(Clone)]
pub struct PaystackClient {
    client: Client,
    secret_key: String,
    base_url: String,
}

impl PaystackClient {
    pub fn new(secret_key: String) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            base_url: "https://api.paystack.co".to_string(),
        }
    }
}

#[async_trait]
impl PaymentProvider for PaystackClient {
    fn kind(&self) -> BillingProvider {
        BillingProvider::Paystack
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let url = format!("{}/transaction/initialize", self.base_url);

        let body = json!({
            "email": request.email,
            "plan": plan_code(request.tier, request.billing_cycle),
            "reference": request.reference,
            "callback_url": request.success_url,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            let parsed = response
                .json::<PaystackResponse<PaystackInitData>>()
                .await
                .map_err(|e| PaymentError::ParseError(e.to_string()))?;
            let data = parsed
                .data
                .filter(|_| parsed.status)
                .ok_or_else(|| PaymentError::ServiceError("initialize declined".to_string()))?;
            Ok(CheckoutSession {
                checkout_url: data.authorization_url,
                reference: data.reference,
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
        let url = format!("{}/transaction/verify/{}", self.base_url, reference);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        if response.status().is_success() {
            let parsed = response
                .json::<PaystackResponse<PaystackVerifyData>>()
                .await
                .map_err(|e| PaymentError::ParseError(e.to_string()))?;
            let data = parsed
                .data
                .filter(|_| parsed.status)
                .ok_or_else(|| PaymentError::ServiceError("verify declined".to_string()))?;
            let status = match data.status.as_str() {
                "success" => CheckoutStatus::Paid,
                "pending" | "ongoing" => CheckoutStatus::Pending,
                _ => CheckoutStatus::Failed,
            };
            // Plan charges do not always echo a subscription code; the
            // transaction reference stays usable as a stable handle.
            let external_subscription_id = data
                .subscription_code
                .or_else(|| Some(reference.to_string()));
            Ok(VerifiedCheckout {
                status,
                external_subscription_id,
                external_customer_id: data.customer.and_then(|c| c.customer_code),
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
        let event = payload.get("event")?.as_str()?;
        let data = payload.get("data")?;

        match event {
            "charge.success" => Some(WebhookEvent::CheckoutCompleted {
                reference: data.get("reference")?.as_str()?.to_string(),
            }),
            "invoice.update" => {
                if !data.get("paid")?.as_bool()? {
                    return None;
                }
                let code = data
                    .get("subscription")?
                    .get("subscription_code")?
                    .as_str()?;
                Some(WebhookEvent::Renewal {
                    external_subscription_id: code.to_string(),
                })
            }
            "subscription.disable" => Some(WebhookEvent::Cancellation {
                external_subscription_id: data.get("subscription_code")?.as_str()?.to_string(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PaystackClient {
        PaystackClient::new("sk_test_ps".to_string())
    }

    #[test]
    fn parses_charge_success_as_checkout() {
        let payload = json!({
            "event": "charge.success",
            "data": { "reference": "memora-ref-9" }
        });
        assert_eq!(
            client().parse_webhook(&payload),
            Some(WebhookEvent::CheckoutCompleted {
                reference: "memora-ref-9".to_string()
            })
        );
    }

    #[test]
    fn parses_paid_invoice_update_as_renewal() {
        let payload = json!({
            "event": "invoice.update",
            "data": {
                "paid": true,
                "subscription": { "subscription_code": "SUB_abc" }
            }
        });
        assert_eq!(
            client().parse_webhook(&payload),
            Some(WebhookEvent::Renewal {
                external_subscription_id: "SUB_abc".to_string()
            })
        );
    }

    #[test]
    fn unpaid_invoice_update_is_ignored() {
        let payload = json!({
            "event": "invoice.update",
            "data": {
                "paid": false,
                "subscription": { "subscription_code": "SUB_abc" }
            }
        });
        assert_eq!(client().parse_webhook(&payload), None);
    }

    #[test]
    fn parses_subscription_disable_as_cancellation() {
        let payload = json!({
            "event": "subscription.disable",
            "data": { "subscription_code": "SUB_abc" }
        });
        assert_eq!(
            client().parse_webhook(&payload),
            Some(WebhookEvent::Cancellation {
                external_subscription_id: "SUB_abc".to_string()
            })
        );
    }

    #[test]
    fn ignores_unknown_events() {
        let payload = json!({ "event": "transfer.success", "data": {} });
        assert_eq!(client().parse_webhook(&payload), None);
    }
}
