use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::spawn;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::models::subscriptions::{
    BillingCycle, BillingProvider, NewSubscription, SubscriptionTier,
};
use crate::models::users::User;
use crate::payments::{
    CheckoutRequest, CheckoutSession, CheckoutStatus, PendingCheckout, VerifiedCheckout,
    WebhookEvent,
};
use crate::{ApiError, AppState};

/// Pending checkouts wait this long for the provider to confirm before the
/// cache forgets them.
pub const PENDING_CHECKOUT_TTL: StdDuration = StdDuration::from_secs(30 * 60);

/// Period bounds are computed locally from the billing cycle rather than
/// parsed out of each provider's payload shape.
pub fn period_bounds(
    cycle: BillingCycle,
    from: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let length = match cycle {
        BillingCycle::Monthly => Duration::days(30),
        BillingCycle::Yearly => Duration::days(365),
    };
    (from, from + length)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CheckoutAction {
    Activate,
    AlreadyRecorded,
    NoContext,
    NotPaid,
}

/// The activation decision, separated from I/O: a checkout activates only
/// when we still hold its pending context, the provider says it is paid, and
/// no subscription with the same external id has been recorded yet.
pub(crate) fn checkout_decision(
    has_pending: bool,
    status: CheckoutStatus,
    already_recorded: bool,
) -> CheckoutAction {
    if already_recorded {
        return CheckoutAction::AlreadyRecorded;
    }
    if !has_pending {
        return CheckoutAction::NoContext;
    }
    match status {
        CheckoutStatus::Paid => CheckoutAction::Activate,
        _ => CheckoutAction::NotPaid,
    }
}

/// Opens a provider checkout for the user and parks the context in the
/// pending-checkout cache under the provider's reference.
pub async fn start_checkout(
    data: &AppState,
    user: &User,
    provider_kind: BillingProvider,
    tier: SubscriptionTier,
    cycle: BillingCycle,
) -> Result<CheckoutSession, ApiError> {
    let provider = data.providers.get(provider_kind).ok_or_else(|| {
        error!("Checkout requested for unconfigured provider: {:?}", provider_kind);
        ApiError::BadRequest
    })?;

    let frontend = data.app_mode.frontend_url();
    let request = CheckoutRequest {
        reference: format!("memora-{}", Uuid::new_v4().simple()),
        email: user.email.clone(),
        tier,
        billing_cycle: cycle,
        success_url: format!("{}/billing/callback?status=success", frontend),
        cancel_url: format!("{}/billing/callback?status=cancelled", frontend),
    };

    let session = provider.create_checkout(&request).await.map_err(|e| {
        error!("Failed to create checkout: {:?}", e);
        ApiError::InternalServerError
    })?;

    let pending = PendingCheckout {
        user_uuid: user.uuid,
        provider: provider_kind,
        tier,
        billing_cycle: cycle,
    };
    data.pending_checkouts
        .insert(session.reference.clone(), pending, PENDING_CHECKOUT_TTL)
        .await;

    Ok(session)
}

/// Applies one normalized provider event. Ignored events return `Ok` so the
/// webhook endpoint can acknowledge them; only infrastructure failures bubble
/// up, prompting the provider to retry.
pub async fn handle_webhook_event(
    data: &AppState,
    provider_kind: BillingProvider,
    event: WebhookEvent,
) -> Result<(), ApiError> {
    match event {
        WebhookEvent::CheckoutCompleted { reference } => {
            handle_checkout_completed(data, provider_kind, reference).await
        }
        WebhookEvent::Renewal {
            external_subscription_id,
        } => handle_renewal(data, provider_kind, external_subscription_id).await,
        WebhookEvent::Cancellation {
            external_subscription_id,
        } => handle_cancellation(data, provider_kind, external_subscription_id).await,
    }
}

async fn handle_checkout_completed(
    data: &AppState,
    provider_kind: BillingProvider,
    reference: String,
) -> Result<(), ApiError> {
    let provider = data
        .providers
        .get(provider_kind)
        .ok_or(ApiError::InternalServerError)?;

    let pending = data.pending_checkouts.get(&reference).await;

    let verified = provider.verify_checkout(&reference).await.map_err(|e| {
        error!("Checkout verification failed: {:?}", e);
        ApiError::InternalServerError
    })?;

    let already_recorded = match &verified.external_subscription_id {
        Some(external_id) => data
            .db
            .get_subscription_by_external_id(provider_kind, external_id)
            .map_err(|e| {
                error!("Subscription lookup failed: {:?}", e);
                ApiError::InternalServerError
            })?
            .is_some(),
        None => false,
    };

    match checkout_decision(pending.is_some(), verified.status, already_recorded) {
        CheckoutAction::AlreadyRecorded => {
            debug!("Checkout already reconciled, acknowledging");
            data.pending_checkouts.remove(&reference).await;
            Ok(())
        }
        CheckoutAction::NoContext => {
            debug!("No pending checkout for reference, ignoring");
            Ok(())
        }
        CheckoutAction::NotPaid => {
            debug!("Checkout not yet paid, leaving pending context in place");
            Ok(())
        }
        CheckoutAction::Activate => {
            let pending = pending.ok_or(ApiError::InternalServerError)?;
            activate_checkout(data, pending, verified).await?;
            data.pending_checkouts.remove(&reference).await;
            Ok(())
        }
    }
}

async fn activate_checkout(
    data: &AppState,
    pending: PendingCheckout,
    verified: VerifiedCheckout,
) -> Result<(), ApiError> {
    let user = data.db.get_user_by_uuid(pending.user_uuid).map_err(|e| {
        error!("Failed to load user for checkout activation: {:?}", e);
        ApiError::InternalServerError
    })?;

    let (start, end) = period_bounds(pending.billing_cycle, Utc::now());
    let new_subscription = NewSubscription::new(
        user.uuid,
        pending.provider,
        pending.tier,
        pending.billing_cycle,
        start,
        end,
    )
    .with_external_ids(
        verified.external_subscription_id,
        verified.external_customer_id,
    );

    let subscription = data
        .db
        .reconcile_subscription_transaction(new_subscription)
        .map_err(|e| {
            error!("Subscription reconciliation failed: {:?}", e);
            ApiError::InternalServerError
        })?;

    info!(
        "Activated {} {} subscription for user",
        subscription.provider, subscription.tier
    );

    let app_mode = data.app_mode.clone();
    let resend_api_key = data.config.resend_api_key.clone();
    let to_email = user.email.clone();
    let tier = subscription.tier.clone();
    let cycle = subscription.billing_cycle.clone();
    spawn(async move {
        if let Err(e) = crate::email::send_subscription_active_email(
            app_mode,
            resend_api_key,
            to_email,
            tier,
            cycle,
        )
        .await
        {
            error!("Failed to send subscription email: {:?}", e);
        }
    });

    Ok(())
}

async fn handle_renewal(
    data: &AppState,
    provider_kind: BillingProvider,
    external_subscription_id: String,
) -> Result<(), ApiError> {
    let subscription = match data
        .db
        .get_subscription_by_external_id(provider_kind, &external_subscription_id)
        .map_err(|e| {
            error!("Subscription lookup failed: {:?}", e);
            ApiError::InternalServerError
        })? {
        Some(subscription) => subscription,
        None => {
            debug!("Renewal for unknown subscription, ignoring");
            return Ok(());
        }
    };

    let cycle = BillingCycle::parse(&subscription.billing_cycle)
        .unwrap_or(BillingCycle::Monthly);
    let (start, end) = period_bounds(cycle, Utc::now());

    data.db
        .renew_subscription(&subscription, start, end)
        .map_err(|e| {
            error!("Subscription renewal failed: {:?}", e);
            ApiError::InternalServerError
        })?;

    info!("Renewed {} subscription", subscription.provider);
    Ok(())
}

async fn handle_cancellation(
    data: &AppState,
    provider_kind: BillingProvider,
    external_subscription_id: String,
) -> Result<(), ApiError> {
    let subscription = match data
        .db
        .get_subscription_by_external_id(provider_kind, &external_subscription_id)
        .map_err(|e| {
            error!("Subscription lookup failed: {:?}", e);
            ApiError::InternalServerError
        })? {
        Some(subscription) => subscription,
        None => {
            debug!("Cancellation for unknown subscription, ignoring");
            return Ok(());
        }
    };

    if !subscription.status().is_current() {
        debug!("Subscription already inactive, acknowledging");
        return Ok(());
    }

    data.db.cancel_subscription(&subscription).map_err(|e| {
        error!("Subscription cancellation failed: {:?}", e);
        ApiError::InternalServerError
    })?;

    info!("Canceled {} subscription", subscription.provider);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monthly_period_is_thirty_days() {
        let from = Utc::now();
        let (start, end) = period_bounds(BillingCycle::Monthly, from);
        assert_eq!(start, from);
        assert_eq!(end - start, Duration::days(30));
    }

    #[test]
    fn yearly_period_is_a_year() {
        let from = Utc::now();
        let (_, end) = period_bounds(BillingCycle::Yearly, from);
        assert_eq!(end - from, Duration::days(365));
    }

    #[test]
    fn duplicate_checkout_is_a_no_op() {
        assert_eq!(
            checkout_decision(true, CheckoutStatus::Paid, true),
            CheckoutAction::AlreadyRecorded
        );
        // Even without pending context, a recorded external id wins.
        assert_eq!(
            checkout_decision(false, CheckoutStatus::Paid, true),
            CheckoutAction::AlreadyRecorded
        );
    }

    #[test]
    fn checkout_without_context_is_ignored() {
        assert_eq!(
            checkout_decision(false, CheckoutStatus::Paid, false),
            CheckoutAction::NoContext
        );
    }

    #[test]
    fn unpaid_checkout_waits() {
        assert_eq!(
            checkout_decision(true, CheckoutStatus::Pending, false),
            CheckoutAction::NotPaid
        );
        assert_eq!(
            checkout_decision(true, CheckoutStatus::Failed, false),
            CheckoutAction::NotPaid
        );
    }

    #[test]
    fn paid_checkout_with_context_activates() {
        assert_eq!(
            checkout_decision(true, CheckoutStatus::Paid, false),
            CheckoutAction::Activate
        );
    }
}
