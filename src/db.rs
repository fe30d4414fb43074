use crate::limits::{self, LimitScope, LimitUsage};
use crate::models::guest_tokens::{GuestToken, GuestTokenError, NewGuestToken};
use crate::models::media::{Media, MediaError, NewMedia};
use crate::models::media_sets::{MediaSet, MediaSetError, NewMediaSet};
use crate::models::phases::{NewPhase, Phase, PhaseError, PhaseStatus};
use crate::models::projects::{NewProject, Project, ProjectError};
use crate::models::subscription_history::{
    HistoryAction, NewSubscriptionHistory, SubscriptionHistory, SubscriptionHistoryError,
};
use crate::models::subscriptions::{
    BillingProvider, NewSubscription, Subscription, SubscriptionError, SubscriptionStatus,
};
use crate::models::users::{NewUser, User, UserError};
use chrono::{DateTime, Utc};
use diesel::Connection;
use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, Pool},
};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum DBError {
    #[error("Database connection error")]
    ConnectionError,
    #[error("Database query error: {0}")]
    QueryError(#[from] diesel::result::Error),
    #[error("User error: {0}")]
    UserError(#[from] UserError),
    #[error("User not found")]
    UserNotFound,
    #[error("Project error: {0}")]
    ProjectError(#[from] ProjectError),
    #[error("Project not found")]
    ProjectNotFound,
    #[error("Phase error: {0}")]
    PhaseError(#[from] PhaseError),
    #[error("Phase not found")]
    PhaseNotFound,
    #[error("Media set error: {0}")]
    MediaSetError(#[from] MediaSetError),
    #[error("Media set not found")]
    MediaSetNotFound,
    #[error("Media error: {0}")]
    MediaError(#[from] MediaError),
    #[error("Media not found")]
    MediaNotFound,
    #[error("Guest token error: {0}")]
    GuestTokenError(#[from] GuestTokenError),
    #[error("Guest token not found")]
    GuestTokenNotFound,
    #[error("Subscription error: {0}")]
    SubscriptionError(#[from] SubscriptionError),
    #[error("Subscription not found")]
    SubscriptionNotFound,
    #[error("Subscription history error: {0}")]
    SubscriptionHistoryError(#[from] SubscriptionHistoryError),
    #[error("Selection limit of {0} reached")]
    SelectionLimitReached(i32),
}

pub trait DBConnection {
    // User methods
    fn create_user(&self, new_user: NewUser) -> Result<User, DBError>;
    fn get_user_by_uuid(&self, uuid: Uuid) -> Result<User, DBError>;
    fn get_user_by_email(&self, email: &str) -> Result<User, DBError>;

    // Project methods
    fn create_project(&self, new_project: NewProject) -> Result<Project, DBError>;
    fn get_project_by_id(&self, project_id: i32) -> Result<Project, DBError>;
    fn get_project_by_uuid(&self, uuid: Uuid) -> Result<Project, DBError>;
    fn get_projects_for_owner(
        &self,
        owner_id: Uuid,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Project>, i64), DBError>;
    fn update_project(&self, project: &Project) -> Result<(), DBError>;
    fn delete_project(&self, project: &Project) -> Result<(), DBError>;

    // Phase methods
    fn create_phase(&self, new_phase: NewPhase) -> Result<Phase, DBError>;
    fn get_phase_by_id(&self, phase_id: i32) -> Result<Phase, DBError>;
    fn get_phase_by_uuid(&self, uuid: Uuid) -> Result<Phase, DBError>;
    fn get_phases_for_project(&self, project_id: i32) -> Result<Vec<Phase>, DBError>;
    fn update_phase(&self, phase: &Phase) -> Result<(), DBError>;
    fn set_phase_status(&self, phase: &Phase, status: PhaseStatus) -> Result<(), DBError>;
    fn reset_phase_limit(&self, phase: &Phase) -> Result<(), DBError>;
    fn soft_delete_phase(&self, phase: &Phase) -> Result<(), DBError>;

    // Media set methods
    fn create_media_set(&self, new_set: NewMediaSet) -> Result<MediaSet, DBError>;
    fn get_media_set_by_id(&self, set_id: i32) -> Result<MediaSet, DBError>;
    fn get_media_set_by_uuid(&self, uuid: Uuid) -> Result<MediaSet, DBError>;
    fn get_media_sets_for_phase(&self, phase_id: i32) -> Result<Vec<MediaSet>, DBError>;
    fn update_media_set(&self, set: &MediaSet) -> Result<(), DBError>;
    fn delete_media_set(&self, set: &MediaSet) -> Result<(), DBError>;

    // Media methods
    fn create_media_batch(&self, items: Vec<NewMedia>) -> Result<Vec<Media>, DBError>;
    fn get_media_by_uuid(&self, uuid: Uuid) -> Result<Media, DBError>;
    fn get_media_with_phase(&self, uuid: Uuid) -> Result<(Media, i32), DBError>;
    fn get_media_page_for_set(
        &self,
        set_id: i32,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Media>, i64), DBError>;
    fn get_media_page_for_phase(
        &self,
        phase_id: i32,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Media>, i64), DBError>;
    fn get_selected_media_for_phase(&self, phase_id: i32) -> Result<Vec<Media>, DBError>;
    fn soft_delete_media(&self, media: &Media) -> Result<(), DBError>;

    // Selection methods. The select path runs inside a transaction that
    // locks the phase row so concurrent attempts cannot both pass the limit
    // check.
    fn select_media_transaction(&self, media: &Media) -> Result<(), DBError>;
    fn unselect_media(&self, media: &Media) -> Result<(), DBError>;
    fn set_media_rejected(&self, media: &Media, rejected: bool) -> Result<(), DBError>;
    fn complete_phase_transaction(&self, phase: &Phase) -> Result<usize, DBError>;
    fn get_limit_usage(
        &self,
        phase: &Phase,
        set: Option<&MediaSet>,
    ) -> Result<LimitUsage, DBError>;

    // Guest token methods
    fn create_guest_token(&self, new_token: NewGuestToken) -> Result<GuestToken, DBError>;
    fn get_guest_token(&self, token: &str) -> Result<Option<GuestToken>, DBError>;
    fn get_guest_tokens_for_phase(&self, phase_id: i32) -> Result<Vec<GuestToken>, DBError>;
    fn mark_guest_token_used(&self, token: &GuestToken) -> Result<(), DBError>;
    fn delete_expired_guest_tokens(&self) -> Result<usize, DBError>;

    // Subscription methods
    fn get_current_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>, DBError>;
    fn get_subscription_by_external_id(
        &self,
        provider: BillingProvider,
        external_id: &str,
    ) -> Result<Option<Subscription>, DBError>;
    fn reconcile_subscription_transaction(
        &self,
        new_subscription: NewSubscription,
    ) -> Result<Subscription, DBError>;
    fn renew_subscription(
        &self,
        subscription: &Subscription,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<(), DBError>;
    fn cancel_subscription(&self, subscription: &Subscription) -> Result<(), DBError>;
    fn get_subscription_history(&self, user_id: Uuid)
        -> Result<Vec<SubscriptionHistory>, DBError>;
}

pub(crate) struct PostgresConnection {
    db: Pool<ConnectionManager<PgConnection>>,
}

impl DBConnection for PostgresConnection {
    fn create_user(&self, new_user: NewUser) -> Result<User, DBError> {
        debug!("Creating new user");
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        let result = new_user.insert(conn).map_err(DBError::from);
        if let Err(ref e) = result {
            error!("Failed to create user: {:?}", e);
        }
        result
    }

    fn get_user_by_uuid(&self, uuid: Uuid) -> Result<User, DBError> {
        debug!("Getting user by UUID");
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        User::get_by_uuid(conn, uuid)?.ok_or(DBError::UserNotFound)
    }

    fn get_user_by_email(&self, email: &str) -> Result<User, DBError> {
        debug!("Getting user by email");
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        User::get_by_email(conn, email)?.ok_or(DBError::UserNotFound)
    }

    fn create_project(&self, new_project: NewProject) -> Result<Project, DBError> {
        debug!("Creating new project");
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        let result = new_project.insert(conn).map_err(DBError::from);
        if let Err(ref e) = result {
            error!("Failed to create project: {:?}", e);
        }
        result
    }

    fn get_project_by_id(&self, project_id: i32) -> Result<Project, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        Project::get_by_id(conn, project_id)?.ok_or(DBError::ProjectNotFound)
    }

    fn get_project_by_uuid(&self, uuid: Uuid) -> Result<Project, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        Project::get_by_uuid(conn, uuid)?.ok_or(DBError::ProjectNotFound)
    }

    fn get_projects_for_owner(
        &self,
        owner_id: Uuid,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Project>, i64), DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        let total = Project::count_for_owner(conn, owner_id)?;
        let projects = Project::get_page_for_owner(conn, owner_id, page, per_page)?;
        Ok((projects, total))
    }

    fn update_project(&self, project: &Project) -> Result<(), DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        project.update(conn).map_err(DBError::from)
    }

    fn delete_project(&self, project: &Project) -> Result<(), DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        project.delete(conn).map_err(DBError::from)
    }

    fn create_phase(&self, new_phase: NewPhase) -> Result<Phase, DBError> {
        debug!("Creating new phase");
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        let result = new_phase.insert(conn).map_err(DBError::from);
        if let Err(ref e) = result {
            error!("Failed to create phase: {:?}", e);
        }
        result
    }

    fn get_phase_by_id(&self, phase_id: i32) -> Result<Phase, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        Phase::get_by_id(conn, phase_id)?.ok_or(DBError::PhaseNotFound)
    }

    fn get_phase_by_uuid(&self, uuid: Uuid) -> Result<Phase, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        Phase::get_by_uuid(conn, uuid)?.ok_or(DBError::PhaseNotFound)
    }

    fn get_phases_for_project(&self, project_id: i32) -> Result<Vec<Phase>, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        Phase::get_all_for_project(conn, project_id).map_err(DBError::from)
    }

    fn update_phase(&self, phase: &Phase) -> Result<(), DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        phase.update(conn).map_err(DBError::from)
    }

    fn set_phase_status(&self, phase: &Phase, status: PhaseStatus) -> Result<(), DBError> {
        debug!("Setting phase status to {}", status.as_str());
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        phase.set_status(conn, status).map_err(DBError::from)
    }

    fn reset_phase_limit(&self, phase: &Phase) -> Result<(), DBError> {
        debug!("Resetting phase selection limit");
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        phase.reset_limit(conn).map_err(DBError::from)
    }

    fn soft_delete_phase(&self, phase: &Phase) -> Result<(), DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        phase.soft_delete(conn).map_err(DBError::from)
    }

    fn create_media_set(&self, new_set: NewMediaSet) -> Result<MediaSet, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        new_set.insert(conn).map_err(DBError::from)
    }

    fn get_media_set_by_id(&self, set_id: i32) -> Result<MediaSet, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        MediaSet::get_by_id(conn, set_id)?.ok_or(DBError::MediaSetNotFound)
    }

    fn get_media_set_by_uuid(&self, uuid: Uuid) -> Result<MediaSet, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        MediaSet::get_by_uuid(conn, uuid)?.ok_or(DBError::MediaSetNotFound)
    }

    fn get_media_sets_for_phase(&self, phase_id: i32) -> Result<Vec<MediaSet>, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        MediaSet::get_all_for_phase(conn, phase_id).map_err(DBError::from)
    }

    fn update_media_set(&self, set: &MediaSet) -> Result<(), DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        set.update(conn).map_err(DBError::from)
    }

    fn delete_media_set(&self, set: &MediaSet) -> Result<(), DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        set.delete(conn).map_err(DBError::from)
    }

    fn create_media_batch(&self, items: Vec<NewMedia>) -> Result<Vec<Media>, DBError> {
        debug!("Inserting {} media items", items.len());
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        NewMedia::insert_batch(conn, &items).map_err(DBError::from)
    }

    fn get_media_by_uuid(&self, uuid: Uuid) -> Result<Media, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        Media::get_by_uuid(conn, uuid)?.ok_or(DBError::MediaNotFound)
    }

    fn get_media_with_phase(&self, uuid: Uuid) -> Result<(Media, i32), DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        Media::get_by_uuid_with_phase(conn, uuid)?.ok_or(DBError::MediaNotFound)
    }

    fn get_media_page_for_set(
        &self,
        set_id: i32,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Media>, i64), DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        let total = Media::count_for_set(conn, set_id)?;
        let items = Media::get_page_for_set(conn, set_id, page, per_page)?;
        Ok((items, total))
    }

    fn get_media_page_for_phase(
        &self,
        phase_id: i32,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Media>, i64), DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        let total = Media::count_for_phase(conn, phase_id)?;
        let items = Media::get_page_for_phase(conn, phase_id, page, per_page)?;
        Ok((items, total))
    }

    fn get_selected_media_for_phase(&self, phase_id: i32) -> Result<Vec<Media>, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        Media::get_selected_for_phase(conn, phase_id).map_err(DBError::from)
    }

    fn soft_delete_media(&self, media: &Media) -> Result<(), DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        media.soft_delete(conn).map_err(DBError::from)
    }

    fn select_media_transaction(&self, media: &Media) -> Result<(), DBError> {
        debug!("Starting media selection transaction");
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;

        conn.transaction(|conn| {
            let set =
                MediaSet::get_by_id(conn, media.set_id)?.ok_or(DBError::MediaSetNotFound)?;

            // Locks the phase row; every selection in this phase serializes
            // here, so the count below cannot race another guest.
            let phase =
                Phase::get_by_id_locked(conn, set.phase_id)?.ok_or(DBError::PhaseNotFound)?;

            // Selecting an already selected item is a no-op, not a second
            // slot against the quota.
            if media.is_selected {
                return Ok(());
            }

            if let Some(policy) = limits::resolve_policy(&phase, &set) {
                let used = match policy.scope {
                    LimitScope::Set => {
                        Media::count_selected_in_set(conn, set.id, policy.counts_since)?
                    }
                    LimitScope::Phase => {
                        Media::count_selected_in_phase(conn, phase.id, policy.counts_since)?
                    }
                };
                if let limits::LimitDecision::Reached { limit } =
                    limits::check(Some(&policy), used)
                {
                    return Err(DBError::SelectionLimitReached(limit));
                }
            }

            media.set_selected(conn, true).map_err(DBError::from)
        })
    }

    fn unselect_media(&self, media: &Media) -> Result<(), DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        media.set_selected(conn, false).map_err(DBError::from)
    }

    fn set_media_rejected(&self, media: &Media, rejected: bool) -> Result<(), DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        media.set_rejected(conn, rejected).map_err(DBError::from)
    }

    fn complete_phase_transaction(&self, phase: &Phase) -> Result<usize, DBError> {
        debug!("Starting phase completion transaction");
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;

        conn.transaction(|conn| {
            phase.set_status(conn, PhaseStatus::Completed)?;
            let frozen = Media::complete_selected_in_phase(conn, phase.id)?;
            Ok(frozen)
        })
    }

    fn get_limit_usage(
        &self,
        phase: &Phase,
        set: Option<&MediaSet>,
    ) -> Result<LimitUsage, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;

        let policy = match set {
            Some(s) => limits::resolve_policy(phase, s),
            None => limits::phase_policy(phase),
        };

        match policy {
            None => {
                let used = Media::count_selected_in_phase(conn, phase.id, phase.reset_limit_at)?;
                Ok(LimitUsage::unlimited(used))
            }
            Some(policy) => {
                let used = match policy.scope {
                    LimitScope::Set => {
                        // Set scope implies a set was passed in.
                        let set_id = set.map(|s| s.id).ok_or(DBError::MediaSetNotFound)?;
                        Media::count_selected_in_set(conn, set_id, policy.counts_since)?
                    }
                    LimitScope::Phase => {
                        Media::count_selected_in_phase(conn, phase.id, policy.counts_since)?
                    }
                };
                Ok(LimitUsage::from_policy(&policy, used))
            }
        }
    }

    fn create_guest_token(&self, new_token: NewGuestToken) -> Result<GuestToken, DBError> {
        debug!("Creating new guest token");
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        let result = new_token.insert(conn).map_err(DBError::from);
        if let Err(ref e) = result {
            error!("Failed to create guest token: {:?}", e);
        }
        result
    }

    fn get_guest_token(&self, token: &str) -> Result<Option<GuestToken>, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        GuestToken::get_by_token(conn, token).map_err(DBError::from)
    }

    fn get_guest_tokens_for_phase(&self, phase_id: i32) -> Result<Vec<GuestToken>, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        GuestToken::get_all_for_phase(conn, phase_id).map_err(DBError::from)
    }

    fn mark_guest_token_used(&self, token: &GuestToken) -> Result<(), DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        token.mark_used(conn).map_err(DBError::from)
    }

    fn delete_expired_guest_tokens(&self) -> Result<usize, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        GuestToken::delete_expired(conn).map_err(DBError::from)
    }

    fn get_current_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        Subscription::get_current_for_user(conn, user_id).map_err(DBError::from)
    }

    fn get_subscription_by_external_id(
        &self,
        provider: BillingProvider,
        external_id: &str,
    ) -> Result<Option<Subscription>, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        Subscription::get_by_external_id(conn, provider, external_id).map_err(DBError::from)
    }

    fn reconcile_subscription_transaction(
        &self,
        new_subscription: NewSubscription,
    ) -> Result<Subscription, DBError> {
        debug!("Starting subscription reconciliation transaction");
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;

        conn.transaction(|conn| {
            if let Some(prior) =
                Subscription::get_current_for_user(conn, new_subscription.user_id)?
            {
                prior.set_status(conn, SubscriptionStatus::Canceled)?;
                NewSubscriptionHistory::new(
                    prior.user_id,
                    prior.id,
                    HistoryAction::Superseded,
                    &prior.provider,
                    &prior.tier,
                )
                .insert(conn)?;
            }

            let subscription = new_subscription.insert(conn)?;
            NewSubscriptionHistory::new(
                subscription.user_id,
                subscription.id,
                HistoryAction::Created,
                &subscription.provider,
                &subscription.tier,
            )
            .insert(conn)?;

            Ok(subscription)
        })
    }

    fn renew_subscription(
        &self,
        subscription: &Subscription,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<(), DBError> {
        debug!("Renewing subscription period");
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;

        conn.transaction(|conn| {
            subscription.update_period(conn, period_start, period_end)?;
            NewSubscriptionHistory::new(
                subscription.user_id,
                subscription.id,
                HistoryAction::WebhookRenewal,
                &subscription.provider,
                &subscription.tier,
            )
            .insert(conn)?;
            Ok(())
        })
    }

    fn cancel_subscription(&self, subscription: &Subscription) -> Result<(), DBError> {
        debug!("Canceling subscription");
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;

        conn.transaction(|conn| {
            subscription.set_status(conn, SubscriptionStatus::Canceled)?;
            NewSubscriptionHistory::new(
                subscription.user_id,
                subscription.id,
                HistoryAction::Canceled,
                &subscription.provider,
                &subscription.tier,
            )
            .insert(conn)?;
            Ok(())
        })
    }

    fn get_subscription_history(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<SubscriptionHistory>, DBError> {
        let conn = &mut self.db.get().map_err(|_| DBError::ConnectionError)?;
        SubscriptionHistory::get_all_for_user(conn, user_id).map_err(DBError::from)
    }
}

pub(crate) fn setup_db(url: String) -> Arc<dyn DBConnection + Send + Sync> {
    info!("Connecting to database...");
    let manager = ConnectionManager::<PgConnection>::new(url);
    let pool = Pool::builder()
        .max_size(10)
        .test_on_check_out(true)
        .build(manager)
        .expect("Unable to build DB connection pool");
    info!("Connected to database");
    Arc::new(PostgresConnection { db: pool })
}
