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
struct FlutterwaveResponse<T> {
    status: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct FlutterwavePaymentData {
    link: String,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveVerifyData {
    status: String,
    customer: Option<FlutterwaveCustomer>,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveCustomer {
    id: Option<i64>,
}

#[derive(Clone)]
pub struct FlutterwaveClient {
    client: Client,
    secret_key: String,
    base_url: String,
}

impl FlutterwaveClient {
    pub fn new(secret_key: String) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            base_url: "https://api.flutterwave.com".to_string(),
        }
    }
}

#[async_trait]
impl PaymentProvider for FlutterwaveClient {
    fn kind(&self) -> BillingProvider {
        BillingProvider::Flutterwave
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let url = format!("{}/v3/payments", self.base_url);

        let body = json!({
            "tx_ref": request.reference,
            "currency": "USD",
            "redirect_url": request.success_url,
            "payment_plan": plan_code(request.tier, request.billing_cycle),
            "customer": { "email": request.email },
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
                .json::<FlutterwaveResponse<FlutterwavePaymentData>>()
                .await
                .map_err(|e| PaymentError::ParseError(e.to_string()))?;
            let data = parsed
                .data
                .filter(|_| parsed.status == "success")
                .ok_or_else(|| PaymentError::ServiceError("payment declined".to_string()))?;
            Ok(CheckoutSession {
                checkout_url: data.link,
                reference: request.reference.clone(),
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
        let url = format!(
            "{}/v3/transactions/verify_by_reference?tx_ref={}",
            self.base_url, reference
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        if response.status().is_success() {
            let parsed = response
                .json::<FlutterwaveResponse<FlutterwaveVerifyData>>()
                .await
                .map_err(|e| PaymentError::ParseError(e.to_string()))?;
            let data = parsed
                .data
                .filter(|_| parsed.status == "success")
                .ok_or_else(|| PaymentError::ServiceError("verify declined".to_string()))?;
            let status = match data.status.as_str() {
                "successful" => CheckoutStatus::Paid,
                "pending" => CheckoutStatus::Pending,
                _ => CheckoutStatus::Failed,
            };
            Ok(VerifiedCheckout {
                status,
                external_subscription_id: Some(reference.to_string()),
                external_customer_id: data
                    .customer
                    .and_then(|c| c.id)
                    .map(|id| id.to_string()),
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
            "charge.completed" => {
                if data.get("status")?.as_str()? != "successful" {
                    return None;
                }
                Some(WebhookEvent::CheckoutCompleted {
                    reference: data.get("tx_ref")?.as_str()?.to_string(),
                })
            }
            "subscription.cancelled" => {
                // Cancellation events carry the originating transaction
                // reference, which is what we stored at activation.
                Some(WebhookEvent::Cancellation {
                    external_subscription_id: data.get("tx_ref")?.as_str()?.to_string(),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> FlutterwaveClient {
        FlutterwaveClient::new("FLWSECK_TEST".to_string())
    }

    #[test]
    fn parses_successful_charge_as_checkout() {
        let payload = json!({
            "event": "charge.completed",
            "data": { "status": "successful", "tx_ref": "memora-ref-3" }
        });
        assert_eq!(
            client().parse_webhook(&payload),
            Some(WebhookEvent::CheckoutCompleted {
                reference: "memora-ref-3".to_string()
            })
        );
    }

    #[test]
    fn failed_charges_are_ignored() {
        let payload = json!({
            "event": "charge.completed",
            "data": { "status": "failed", "tx_ref": "memora-ref-3" }
        });
        assert_eq!(client().parse_webhook(&payload), None);
    }

    #[test]
    fn parses_subscription_cancelled() {
        let payload = json!({
            "event": "subscription.cancelled",
            "data": { "tx_ref": "memora-ref-3" }
        });
        assert_eq!(
            client().parse_webhook(&payload),
            Some(WebhookEvent::Cancellation {
                external_subscription_id: "memora-ref-3".to_string()
            })
        );
    }

    #[test]
    fn ignores_unknown_events() {
        let payload = json!({ "event": "transfer.completed", "data": {} });
        assert_eq!(client().parse_webhook(&payload), None);
    }
}
