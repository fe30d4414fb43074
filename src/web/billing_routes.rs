use crate::models::subscription_history::SubscriptionHistory;
use crate::models::subscriptions::{
    BillingCycle, BillingProvider, Subscription, SubscriptionTier,
};
use crate::payments::reconcile::start_checkout;
use crate::payments::CheckoutSession;
use crate::{ApiError, AppState, User};
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub fn router(app_state: Arc<AppState>) -> Router<()> {
    Router::new()
        .route("/billing/checkout", post(create_checkout))
        .route("/billing/subscription", get(get_subscription))
        .route("/billing/cancel", post(cancel_subscription))
        .with_state(app_state)
}

#[derive(Deserialize, Clone)]
pub struct CreateCheckoutRequest {
    pub provider: String,
    pub tier: String,
    pub billing_cycle: String,
}

#[derive(Serialize)]
pub struct SubscriptionResponse {
    pub subscription: Option<Subscription>,
    pub history: Vec<SubscriptionHistory>,
}

async fn create_checkout(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(checkout_request): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutSession>, ApiError> {
    debug!("Creating billing checkout");

    let provider = BillingProvider::parse(&checkout_request.provider).ok_or_else(|| {
        ApiError::ValidationError(format!(
            "Unknown payment provider: {}",
            checkout_request.provider
        ))
    })?;
    let tier = SubscriptionTier::parse(&checkout_request.tier).ok_or_else(|| {
        ApiError::ValidationError(format!("Unknown tier: {}", checkout_request.tier))
    })?;
    let cycle = BillingCycle::parse(&checkout_request.billing_cycle).ok_or_else(|| {
        ApiError::ValidationError(format!(
            "Unknown billing cycle: {}",
            checkout_request.billing_cycle
        ))
    })?;

    let session = start_checkout(&data, &user, provider, tier, cycle).await?;
    Ok(Json(session))
}

async fn get_subscription(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    debug!("Fetching subscription");

    let subscription = data.db.get_current_subscription(user.uuid)?;
    let history = data.db.get_subscription_history(user.uuid)?;

    Ok(Json(SubscriptionResponse {
        subscription,
        history,
    }))
}

/// Local cancellation only. The provider-side subscription winds down on its
/// own; a later provider webhook for the same subscription is a no-op once
/// the row is canceled.
async fn cancel_subscription(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!("Canceling subscription");

    let subscription = data
        .db
        .get_current_subscription(user.uuid)?
        .ok_or(ApiError::NotFound)?;

    data.db.cancel_subscription(&subscription)?;

    Ok(Json(json!({ "message": "Subscription canceled" })))
}
