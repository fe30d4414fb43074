pub mod flutterwave;
pub mod paypal;
pub mod paystack;
pub mod reconcile;
pub mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::subscriptions::{BillingCycle, BillingProvider, SubscriptionTier};

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("Service error: {0}")]
    ServiceError(String),
    #[error("Provider not configured")]
    NotConfigured,
}

/// What we ask a provider to open a checkout for.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub reference: String,
    pub email: String,
    pub tier: SubscriptionTier,
    pub billing_cycle: BillingCycle,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub checkout_url: String,
    pub reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStatus {
    Paid,
    Pending,
    Failed,
}

/// Provider-neutral view of a finished (or not) checkout, pulled from the
/// provider's verification API rather than trusted from the webhook body.
#[derive(Debug, Clone)]
pub struct VerifiedCheckout {
    pub status: CheckoutStatus,
    pub external_subscription_id: Option<String>,
    pub external_customer_id: Option<String>,
}

/// Events we care about from provider webhooks, after each provider's
/// payload shape has been normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    CheckoutCompleted { reference: String },
    Renewal { external_subscription_id: String },
    Cancellation { external_subscription_id: String },
}

/// Checkout state parked between "user clicked upgrade" and the provider
/// confirming payment. Lives in the TTL cache keyed by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCheckout {
    pub user_uuid: Uuid,
    pub provider: BillingProvider,
    pub tier: SubscriptionTier,
    pub billing_cycle: BillingCycle,
}

/// Plan identifier shared with provider dashboards. Plans are created by
/// hand on each provider under this naming scheme.
pub fn plan_code(tier: SubscriptionTier, cycle: BillingCycle) -> String {
    format!("memora-{}-{}", tier.as_str(), cycle.as_str())
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn kind(&self) -> BillingProvider;

    /// Opens a hosted checkout and returns the URL to send the user to.
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Confirms a checkout directly with the provider.
    async fn verify_checkout(&self, reference: &str) -> Result<VerifiedCheckout, PaymentError>;

    /// Normalizes a raw webhook payload into an event, or `None` for event
    /// types this service ignores.
    fn parse_webhook(&self, payload: &serde_json::Value) -> Option<WebhookEvent>;
}

/// The configured providers. Any subset may be live; checkout against an
/// unconfigured provider fails with `NotConfigured`.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    pub stripe: Option<stripe::StripeClient>,
    pub paystack: Option<paystack::PaystackClient>,
    pub flutterwave: Option<flutterwave::FlutterwaveClient>,
    pub paypal: Option<paypal::PaypalClient>,
}

impl ProviderRegistry {
    pub fn get(&self, kind: BillingProvider) -> Option<&dyn PaymentProvider> {
        match kind {
            BillingProvider::Stripe => self.stripe.as_ref().map(|c| c as &dyn PaymentProvider),
            BillingProvider::Paystack => self.paystack.as_ref().map(|c| c as &dyn PaymentProvider),
            BillingProvider::Flutterwave => self
                .flutterwave
                .as_ref()
                .map(|c| c as &dyn PaymentProvider),
            BillingProvider::Paypal => self.paypal.as_ref().map(|c| c as &dyn PaymentProvider),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_codes_follow_the_dashboard_naming() {
        assert_eq!(
            plan_code(SubscriptionTier::Pro, BillingCycle::Monthly),
            "memora-pro-monthly"
        );
        assert_eq!(
            plan_code(SubscriptionTier::Studio, BillingCycle::Yearly),
            "memora-studio-yearly"
        );
    }
}
