use crate::models::schema::phases;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
    #[error("Invalid status transition")]
    InvalidTransition,
}

/// The workflow stage a phase represents. The original product shipped these
/// as separate resources with separate limit columns; here one table carries
/// all four kinds and the limit logic is shared.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Selection,
    Proofing,
    RawFiles,
    Collection,
}

impl PhaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Selection => "selection",
            PhaseKind::Proofing => "proofing",
            PhaseKind::RawFiles => "raw_files",
            PhaseKind::Collection => "collection",
        }
    }

    /// Kinds where guests mark media selected and a limit can apply.
    pub fn supports_selection(&self) -> bool {
        matches!(self, PhaseKind::Selection | PhaseKind::RawFiles)
    }

    /// Kinds where guests approve or reject media.
    pub fn supports_review(&self) -> bool {
        matches!(self, PhaseKind::Proofing)
    }

    /// Strict parse for request payloads, where an unknown kind is a client
    /// error rather than something to default away.
    pub fn parse(s: &str) -> Option<PhaseKind> {
        match s.to_lowercase().as_str() {
            "selection" => Some(PhaseKind::Selection),
            "proofing" => Some(PhaseKind::Proofing),
            "raw_files" => Some(PhaseKind::RawFiles),
            "collection" => Some(PhaseKind::Collection),
            _ => None,
        }
    }
}

impl From<String> for PhaseKind {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "proofing" => PhaseKind::Proofing,
            "raw_files" => PhaseKind::RawFiles,
            "collection" => PhaseKind::Collection,
            _ => PhaseKind::Selection,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Draft,
    Active,
    Completed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Draft => "draft",
            PhaseStatus::Active => "active",
            PhaseStatus::Completed => "completed",
        }
    }
}

impl From<String> for PhaseStatus {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "active" => PhaseStatus::Active,
            "completed" => PhaseStatus::Completed,
            _ => PhaseStatus::Draft,
        }
    }
}

#[derive(Queryable, Identifiable, AsChangeset, Serialize, Deserialize, Clone, Debug, Selectable)]
#[diesel(table_name = phases)]
pub struct Phase {
    pub id: i32,
    pub uuid: Uuid,
    pub project_id: i32,
    pub kind: String,
    pub name: String,
    pub status: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing)]
    pub download_pin_hash: Option<String>,
    pub allowed_emails: Option<Vec<String>>,
    pub media_limit: Option<i32>,
    pub reset_limit_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        self.kind.clone().into()
    }

    pub fn status(&self) -> PhaseStatus {
        self.status.clone().into()
    }

    /// Whether the phase's allow-list admits the given email. An absent or
    /// empty list admits everyone.
    pub fn allows_email(&self, email: &str) -> bool {
        match &self.allowed_emails {
            None => true,
            Some(list) if list.is_empty() => true,
            Some(list) => {
                let needle = email.to_lowercase();
                list.iter().any(|e| e.to_lowercase() == needle)
            }
        }
    }

    pub fn get_by_id(conn: &mut PgConnection, lookup_id: i32) -> Result<Option<Phase>, PhaseError> {
        phases::table
            .filter(phases::id.eq(lookup_id))
            .filter(phases::deleted_at.is_null())
            .select(Phase::as_select())
            .first(conn)
            .optional()
            .map_err(PhaseError::DatabaseError)
    }

    pub fn get_by_uuid(
        conn: &mut PgConnection,
        lookup_uuid: Uuid,
    ) -> Result<Option<Phase>, PhaseError> {
        phases::table
            .filter(phases::uuid.eq(lookup_uuid))
            .filter(phases::deleted_at.is_null())
            .select(Phase::as_select())
            .first(conn)
            .optional()
            .map_err(PhaseError::DatabaseError)
    }

    /// Row-locking variant used inside the selection transaction so two
    /// concurrent limit checks on the same phase serialize.
    pub fn get_by_id_locked(
        conn: &mut PgConnection,
        lookup_id: i32,
    ) -> Result<Option<Phase>, PhaseError> {
        phases::table
            .filter(phases::id.eq(lookup_id))
            .filter(phases::deleted_at.is_null())
            .for_update()
            .select(Phase::as_select())
            .first(conn)
            .optional()
            .map_err(PhaseError::DatabaseError)
    }

    pub fn get_all_for_project(
        conn: &mut PgConnection,
        lookup_project_id: i32,
    ) -> Result<Vec<Phase>, PhaseError> {
        phases::table
            .filter(phases::project_id.eq(lookup_project_id))
            .filter(phases::deleted_at.is_null())
            .order(phases::created_at.asc())
            .select(Phase::as_select())
            .load::<Phase>(conn)
            .map_err(PhaseError::DatabaseError)
    }

    pub fn update(&self, conn: &mut PgConnection) -> Result<(), PhaseError> {
        diesel::update(phases::table)
            .filter(phases::id.eq(self.id))
            .set((
                phases::name.eq(&self.name),
                phases::password_hash.eq(&self.password_hash),
                phases::download_pin_hash.eq(&self.download_pin_hash),
                phases::allowed_emails.eq(&self.allowed_emails),
                phases::media_limit.eq(self.media_limit),
                phases::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .map(|_| ())
            .map_err(PhaseError::DatabaseError)
    }

    /// Transitions draft -> active -> completed. Anything else is refused.
    pub fn set_status(
        &self,
        conn: &mut PgConnection,
        new_status: PhaseStatus,
    ) -> Result<(), PhaseError> {
        let allowed = matches!(
            (self.status(), new_status),
            (PhaseStatus::Draft, PhaseStatus::Active)
                | (PhaseStatus::Active, PhaseStatus::Completed)
        );
        if !allowed {
            return Err(PhaseError::InvalidTransition);
        }

        diesel::update(phases::table)
            .filter(phases::id.eq(self.id))
            .set((
                phases::status.eq(new_status.as_str()),
                phases::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .map(|_| ())
            .map_err(PhaseError::DatabaseError)
    }

    /// Restarts the selection quota without touching existing selections;
    /// only media selected after this instant count against the limit.
    pub fn reset_limit(&self, conn: &mut PgConnection) -> Result<(), PhaseError> {
        diesel::update(phases::table)
            .filter(phases::id.eq(self.id))
            .set((
                phases::reset_limit_at.eq(diesel::dsl::now),
                phases::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .map(|_| ())
            .map_err(PhaseError::DatabaseError)
    }

    pub fn soft_delete(&self, conn: &mut PgConnection) -> Result<(), PhaseError> {
        diesel::update(phases::table)
            .filter(phases::id.eq(self.id))
            .set((
                phases::deleted_at.eq(diesel::dsl::now),
                phases::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .map(|_| ())
            .map_err(PhaseError::DatabaseError)
    }
}

#[derive(Insertable)]
#[diesel(table_name = phases)]
pub struct NewPhase {
    pub uuid: Uuid,
    pub project_id: i32,
    pub kind: String,
    pub name: String,
    pub status: String,
    pub password_hash: Option<String>,
    pub download_pin_hash: Option<String>,
    pub allowed_emails: Option<Vec<String>>,
    pub media_limit: Option<i32>,
}

impl NewPhase {
    pub fn new(project_id: i32, kind: PhaseKind, name: String) -> Self {
        NewPhase {
            uuid: Uuid::new_v4(),
            project_id,
            kind: kind.as_str().to_string(),
            name,
            status: PhaseStatus::Draft.as_str().to_string(),
            password_hash: None,
            download_pin_hash: None,
            allowed_emails: None,
            media_limit: None,
        }
    }

    pub fn with_media_limit(mut self, limit: Option<i32>) -> Self {
        self.media_limit = limit;
        self
    }

    pub fn with_allowed_emails(mut self, emails: Option<Vec<String>>) -> Self {
        self.allowed_emails = emails;
        self
    }

    pub fn insert(&self, conn: &mut PgConnection) -> Result<Phase, PhaseError> {
        diesel::insert_into(phases::table)
            .values(self)
            .get_result::<Phase>(conn)
            .map_err(PhaseError::DatabaseError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase_with_emails(allowed: Option<Vec<String>>) -> Phase {
        Phase {
            id: 1,
            uuid: Uuid::new_v4(),
            project_id: 1,
            kind: "selection".to_string(),
            name: "Wedding picks".to_string(),
            status: "active".to_string(),
            password_hash: None,
            download_pin_hash: None,
            allowed_emails: allowed,
            media_limit: None,
            reset_limit_at: None,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn absent_allow_list_admits_everyone() {
        let phase = phase_with_emails(None);
        assert!(phase.allows_email("anyone@example.com"));
    }

    #[test]
    fn empty_allow_list_admits_everyone() {
        let phase = phase_with_emails(Some(vec![]));
        assert!(phase.allows_email("anyone@example.com"));
    }

    #[test]
    fn allow_list_is_case_insensitive() {
        let phase = phase_with_emails(Some(vec!["Bride@Example.com".to_string()]));
        assert!(phase.allows_email("bride@example.com"));
        assert!(!phase.allows_email("groom@example.com"));
    }

    #[test]
    fn kind_round_trips_through_text() {
        for kind in [
            PhaseKind::Selection,
            PhaseKind::Proofing,
            PhaseKind::RawFiles,
            PhaseKind::Collection,
        ] {
            assert_eq!(PhaseKind::from(kind.as_str().to_string()), kind);
        }
    }

    #[test]
    fn selection_support_by_kind() {
        assert!(PhaseKind::Selection.supports_selection());
        assert!(PhaseKind::RawFiles.supports_selection());
        assert!(!PhaseKind::Proofing.supports_selection());
        assert!(PhaseKind::Proofing.supports_review());
        assert!(!PhaseKind::Collection.supports_selection());
    }
}
