use crate::models::subscriptions::BillingProvider;
use crate::payments::reconcile::handle_webhook_event;
use crate::{ApiError, AppState};
use axum::{extract::State, routing::post, Json, Router};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

pub fn router(app_state: Arc<AppState>) -> Router<()> {
    Router::new()
        .route("/webhooks/stripe", post(stripe_webhook))
        .route("/webhooks/paystack", post(paystack_webhook))
        .route("/webhooks/flutterwave", post(flutterwave_webhook))
        .route("/webhooks/paypal", post(paypal_webhook))
        .with_state(app_state)
}

/// Shared webhook path: normalize the payload through the provider client,
/// reconcile, and ack. Providers retry on non-2xx, so events we can never
/// process (unconfigured provider, unrecognized event type) are acked rather
/// than bounced forever.
async fn handle_provider_webhook(
    data: Arc<AppState>,
    kind: BillingProvider,
    payload: serde_json::Value,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(provider) = data.providers.get(kind) else {
        error!("Webhook received for unconfigured provider {}", kind.as_str());
        return Ok(Json(json!({ "received": true })));
    };

    match provider.parse_webhook(&payload) {
        Some(event) => {
            debug!("Processing {} webhook event", kind.as_str());
            handle_webhook_event(&data, kind, event).await?;
        }
        None => debug!("Ignoring {} webhook event", kind.as_str()),
    }

    Ok(Json(json!({ "received": true })))
}

async fn stripe_webhook(
    State(data): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    handle_provider_webhook(data, BillingProvider::Stripe, payload).await
}

async fn paystack_webhook(
    State(data): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    handle_provider_webhook(data, BillingProvider::Paystack, payload).await
}

async fn flutterwave_webhook(
    State(data): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    handle_provider_webhook(data, BillingProvider::Flutterwave, payload).await
}

async fn paypal_webhook(
    State(data): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    handle_provider_webhook(data, BillingProvider::Paypal, payload).await
}
