use crate::models::schema::media_sets;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum MediaSetError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

/// A named grouping of media inside a phase, e.g. "Ceremony" or "Reception".
/// Sets can carry their own selection limit which takes precedence over the
/// phase-wide one.
#[derive(Queryable, Identifiable, AsChangeset, Serialize, Deserialize, Clone, Debug, Selectable)]
#[diesel(table_name = media_sets)]
pub struct MediaSet {
    pub id: i32,
    pub uuid: Uuid,
    pub phase_id: i32,
    pub name: String,
    pub position: i32,
    pub media_limit: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaSet {
    pub fn get_by_id(
        conn: &mut PgConnection,
        lookup_id: i32,
    ) -> Result<Option<MediaSet>, MediaSetError> {
        media_sets::table
            .filter(media_sets::id.eq(lookup_id))
            .first(conn)
            .optional()
            .map_err(MediaSetError::DatabaseError)
    }

    pub fn get_by_uuid(
        conn: &mut PgConnection,
        lookup_uuid: Uuid,
    ) -> Result<Option<MediaSet>, MediaSetError> {
        media_sets::table
            .filter(media_sets::uuid.eq(lookup_uuid))
            .first(conn)
            .optional()
            .map_err(MediaSetError::DatabaseError)
    }

    pub fn get_all_for_phase(
        conn: &mut PgConnection,
        lookup_phase_id: i32,
    ) -> Result<Vec<MediaSet>, MediaSetError> {
        media_sets::table
            .filter(media_sets::phase_id.eq(lookup_phase_id))
            .order(media_sets::position.asc())
            .load::<MediaSet>(conn)
            .map_err(MediaSetError::DatabaseError)
    }

    pub fn update(&self, conn: &mut PgConnection) -> Result<(), MediaSetError> {
        diesel::update(media_sets::table)
            .filter(media_sets::id.eq(self.id))
            .set((
                media_sets::name.eq(&self.name),
                media_sets::position.eq(self.position),
                media_sets::media_limit.eq(self.media_limit),
                media_sets::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .map(|_| ())
            .map_err(MediaSetError::DatabaseError)
    }

    pub fn delete(&self, conn: &mut PgConnection) -> Result<(), MediaSetError> {
        diesel::delete(media_sets::table)
            .filter(media_sets::id.eq(self.id))
            .execute(conn)
            .map(|_| ())
            .map_err(MediaSetError::DatabaseError)
    }
}

#[derive(Insertable)]
#[diesel(table_name = media_sets)]
pub struct NewMediaSet {
    pub uuid: Uuid,
    pub phase_id: i32,
    pub name: String,
    pub position: i32,
    pub media_limit: Option<i32>,
}

impl NewMediaSet {
    pub fn new(phase_id: i32, name: String, position: i32, media_limit: Option<i32>) -> Self {
        NewMediaSet {
            uuid: Uuid::new_v4(),
            phase_id,
            name,
            position,
            media_limit,
        }
    }

    pub fn insert(&self, conn: &mut PgConnection) -> Result<MediaSet, MediaSetError> {
        diesel::insert_into(media_sets::table)
            .values(self)
            .get_result::<MediaSet>(conn)
            .map_err(MediaSetError::DatabaseError)
    }
}
