use crate::models::schema::subscription_history;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SubscriptionHistoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Superseded,
    Canceled,
    WebhookRenewal,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Superseded => "superseded",
            HistoryAction::Canceled => "canceled",
            HistoryAction::WebhookRenewal => "webhook_renewal",
        }
    }
}

#[derive(Queryable, Identifiable, Serialize, Deserialize, Clone, Debug, Selectable)]
#[diesel(table_name = subscription_history)]
pub struct SubscriptionHistory {
    pub id: i32,
    pub user_id: Uuid,
    pub subscription_id: i32,
    pub action: String,
    pub provider: String,
    pub tier: String,
    pub recorded_at: DateTime<Utc>,
}

impl SubscriptionHistory {
    pub fn get_all_for_user(
        conn: &mut PgConnection,
        lookup_user_id: Uuid,
    ) -> Result<Vec<SubscriptionHistory>, SubscriptionHistoryError> {
        subscription_history::table
            .filter(subscription_history::user_id.eq(lookup_user_id))
            .order(subscription_history::recorded_at.desc())
            .load::<SubscriptionHistory>(conn)
            .map_err(SubscriptionHistoryError::DatabaseError)
    }
}

#[derive(Insertable)]
#[diesel(table_name = subscription_history)]
pub struct NewSubscriptionHistory {
    pub user_id: Uuid,
    pub subscription_id: i32,
    pub action: String,
    pub provider: String,
    pub tier: String,
}

impl NewSubscriptionHistory {
    pub fn new(
        user_id: Uuid,
        subscription_id: i32,
        action: HistoryAction,
        provider: &str,
        tier: &str,
    ) -> Self {
        NewSubscriptionHistory {
            user_id,
            subscription_id,
            action: action.as_str().to_string(),
            provider: provider.to_string(),
            tier: tier.to_string(),
        }
    }

    pub fn insert(
        &self,
        conn: &mut PgConnection,
    ) -> Result<SubscriptionHistory, SubscriptionHistoryError> {
        diesel::insert_into(subscription_history::table)
            .values(self)
            .get_result::<SubscriptionHistory>(conn)
            .map_err(SubscriptionHistoryError::DatabaseError)
    }
}
