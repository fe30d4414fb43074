use crate::models::schema::subscriptions;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BillingProvider {
    Stripe,
    Paystack,
    Flutterwave,
    Paypal,
}

impl BillingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingProvider::Stripe => "stripe",
            BillingProvider::Paystack => "paystack",
            BillingProvider::Flutterwave => "flutterwave",
            BillingProvider::Paypal => "paypal",
        }
    }

    pub fn parse(s: &str) -> Option<BillingProvider> {
        match s.to_lowercase().as_str() {
            "stripe" => Some(BillingProvider::Stripe),
            "paystack" => Some(BillingProvider::Paystack),
            "flutterwave" => Some(BillingProvider::Flutterwave),
            "paypal" => Some(BillingProvider::Paypal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Basic,
    Pro,
    Studio,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Basic => "basic",
            SubscriptionTier::Pro => "pro",
            SubscriptionTier::Studio => "studio",
        }
    }

    pub fn parse(s: &str) -> Option<SubscriptionTier> {
        match s.to_lowercase().as_str() {
            "basic" => Some(SubscriptionTier::Basic),
            "pro" => Some(SubscriptionTier::Pro),
            "studio" => Some(SubscriptionTier::Studio),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Option<BillingCycle> {
        match s.to_lowercase().as_str() {
            "monthly" => Some(BillingCycle::Monthly),
            "yearly" => Some(BillingCycle::Yearly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    Canceled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    pub fn is_current(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

impl From<String> for SubscriptionStatus {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "canceled" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::Expired,
        }
    }
}

#[derive(Queryable, Identifiable, AsChangeset, Serialize, Deserialize, Clone, Debug, Selectable)]
#[diesel(table_name = subscriptions)]
pub struct Subscription {
    pub id: i32,
    pub user_id: Uuid,
    pub provider: String,
    pub external_subscription_id: Option<String>,
    pub external_customer_id: Option<String>,
    pub tier: String,
    pub billing_cycle: String,
    pub status: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn status(&self) -> SubscriptionStatus {
        self.status.clone().into()
    }

    /// The subscription that currently entitles the user, if any. A user has
    /// at most one active-or-trialing row; older rows stay behind as history.
    pub fn get_current_for_user(
        conn: &mut PgConnection,
        lookup_user_id: Uuid,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        subscriptions::table
            .filter(subscriptions::user_id.eq(lookup_user_id))
            .filter(subscriptions::status.eq_any(vec!["active", "trialing"]))
            .order(subscriptions::created_at.desc())
            .first(conn)
            .optional()
            .map_err(SubscriptionError::DatabaseError)
    }

    pub fn get_by_external_id(
        conn: &mut PgConnection,
        lookup_provider: BillingProvider,
        lookup_external_id: &str,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        subscriptions::table
            .filter(subscriptions::provider.eq(lookup_provider.as_str()))
            .filter(subscriptions::external_subscription_id.eq(lookup_external_id))
            .first(conn)
            .optional()
            .map_err(SubscriptionError::DatabaseError)
    }

    pub fn set_status(
        &self,
        conn: &mut PgConnection,
        new_status: SubscriptionStatus,
    ) -> Result<(), SubscriptionError> {
        diesel::update(subscriptions::table)
            .filter(subscriptions::id.eq(self.id))
            .set((
                subscriptions::status.eq(new_status.as_str()),
                subscriptions::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .map(|_| ())
            .map_err(SubscriptionError::DatabaseError)
    }

    pub fn update_period(
        &self,
        conn: &mut PgConnection,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), SubscriptionError> {
        diesel::update(subscriptions::table)
            .filter(subscriptions::id.eq(self.id))
            .set((
                subscriptions::current_period_start.eq(start),
                subscriptions::current_period_end.eq(end),
                subscriptions::status.eq(SubscriptionStatus::Active.as_str()),
                subscriptions::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .map(|_| ())
            .map_err(SubscriptionError::DatabaseError)
    }
}

#[derive(Insertable)]
#[diesel(table_name = subscriptions)]
pub struct NewSubscription {
    pub user_id: Uuid,
    pub provider: String,
    pub external_subscription_id: Option<String>,
    pub external_customer_id: Option<String>,
    pub tier: String,
    pub billing_cycle: String,
    pub status: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
}

impl NewSubscription {
    pub fn new(
        user_id: Uuid,
        provider: BillingProvider,
        tier: SubscriptionTier,
        billing_cycle: BillingCycle,
        current_period_start: DateTime<Utc>,
        current_period_end: DateTime<Utc>,
    ) -> Self {
        NewSubscription {
            user_id,
            provider: provider.as_str().to_string(),
            external_subscription_id: None,
            external_customer_id: None,
            tier: tier.as_str().to_string(),
            billing_cycle: billing_cycle.as_str().to_string(),
            status: SubscriptionStatus::Active.as_str().to_string(),
            current_period_start,
            current_period_end,
        }
    }

    pub fn with_external_ids(
        mut self,
        subscription_id: Option<String>,
        customer_id: Option<String>,
    ) -> Self {
        self.external_subscription_id = subscription_id;
        self.external_customer_id = customer_id;
        self
    }

    pub fn insert(&self, conn: &mut PgConnection) -> Result<Subscription, SubscriptionError> {
        diesel::insert_into(subscriptions::table)
            .values(self)
            .get_result::<Subscription>(conn)
            .map_err(SubscriptionError::DatabaseError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parsing() {
        assert_eq!(BillingProvider::parse("stripe"), Some(BillingProvider::Stripe));
        assert_eq!(BillingProvider::parse("PayPal"), Some(BillingProvider::Paypal));
        assert_eq!(BillingProvider::parse("square"), None);
    }

    #[test]
    fn tier_and_cycle_parsing() {
        assert_eq!(SubscriptionTier::parse("pro"), Some(SubscriptionTier::Pro));
        assert_eq!(SubscriptionTier::parse("enterprise"), None);
        assert_eq!(BillingCycle::parse("yearly"), Some(BillingCycle::Yearly));
        assert_eq!(BillingCycle::parse("weekly"), None);
    }

    #[test]
    fn current_status_covers_trialing() {
        assert!(SubscriptionStatus::Active.is_current());
        assert!(SubscriptionStatus::Trialing.is_current());
        assert!(!SubscriptionStatus::Canceled.is_current());
        assert!(!SubscriptionStatus::Expired.is_current());
    }
}
