use crate::models::schema::guest_tokens;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Guest tokens outlive a browser session but not the shoot. A week covers
/// the usual turnaround between sending a gallery and the client finishing.
const TOKEN_TTL_DAYS: i64 = 7;

#[derive(Error, Debug)]
pub enum GuestTokenError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

#[derive(Queryable, Identifiable, AsChangeset, Serialize, Deserialize, Clone, Debug, Selectable)]
#[diesel(table_name = guest_tokens)]
pub struct GuestToken {
    pub id: i32,
    #[serde(skip_serializing)]
    pub token: String,
    pub phase_id: i32,
    pub email: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl GuestToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    pub fn get_by_token(
        conn: &mut PgConnection,
        lookup_token: &str,
    ) -> Result<Option<GuestToken>, GuestTokenError> {
        guest_tokens::table
            .filter(guest_tokens::token.eq(lookup_token))
            .first(conn)
            .optional()
            .map_err(GuestTokenError::DatabaseError)
    }

    pub fn get_all_for_phase(
        conn: &mut PgConnection,
        lookup_phase_id: i32,
    ) -> Result<Vec<GuestToken>, GuestTokenError> {
        guest_tokens::table
            .filter(guest_tokens::phase_id.eq(lookup_phase_id))
            .order(guest_tokens::created_at.desc())
            .load::<GuestToken>(conn)
            .map_err(GuestTokenError::DatabaseError)
    }

    /// Stamps consumption. Later calls are no-ops so the stamp keeps the
    /// original timestamp; a consumed token still grants read access until
    /// it expires.
    pub fn mark_used(&self, conn: &mut PgConnection) -> Result<(), GuestTokenError> {
        diesel::update(guest_tokens::table)
            .filter(guest_tokens::id.eq(self.id))
            .filter(guest_tokens::used_at.is_null())
            .set(guest_tokens::used_at.eq(diesel::dsl::now))
            .execute(conn)
            .map(|_| ())
            .map_err(GuestTokenError::DatabaseError)
    }

    pub fn delete_expired(conn: &mut PgConnection) -> Result<usize, GuestTokenError> {
        diesel::delete(guest_tokens::table)
            .filter(guest_tokens::expires_at.lt(diesel::dsl::now))
            .execute(conn)
            .map_err(GuestTokenError::DatabaseError)
    }
}

#[derive(Insertable)]
#[diesel(table_name = guest_tokens)]
pub struct NewGuestToken {
    pub token: String,
    pub phase_id: i32,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl NewGuestToken {
    pub fn new(phase_id: i32, email: String) -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        NewGuestToken {
            token: hex::encode(bytes),
            phase_id,
            email: email.to_lowercase(),
            expires_at: Utc::now() + Duration::days(TOKEN_TTL_DAYS),
        }
    }

    pub fn insert(&self, conn: &mut PgConnection) -> Result<GuestToken, GuestTokenError> {
        diesel::insert_into(guest_tokens::table)
            .values(self)
            .get_result::<GuestToken>(conn)
            .map_err(GuestTokenError::DatabaseError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_token_is_64_hex_chars() {
        let token = NewGuestToken::new(1, "guest@example.com".to_string());
        assert_eq!(token.token.len(), 64);
        assert!(token.token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn new_tokens_are_unique() {
        let a = NewGuestToken::new(1, "guest@example.com".to_string());
        let b = NewGuestToken::new(1, "guest@example.com".to_string());
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn email_is_normalized_to_lowercase() {
        let token = NewGuestToken::new(1, "Guest@Example.COM".to_string());
        assert_eq!(token.email, "guest@example.com");
    }

    #[test]
    fn expiry_is_seven_days_out() {
        let token = NewGuestToken::new(1, "guest@example.com".to_string());
        let delta = token.expires_at - Utc::now();
        assert!(delta > Duration::days(6));
        assert!(delta <= Duration::days(7));
    }

    #[test]
    fn expired_detection() {
        let mut token = GuestToken {
            id: 1,
            token: "a".repeat(64),
            phase_id: 1,
            email: "guest@example.com".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            used_at: None,
            created_at: Utc::now(),
        };
        assert!(!token.is_expired());
        token.expires_at = Utc::now() - Duration::hours(1);
        assert!(token.is_expired());
    }
}
