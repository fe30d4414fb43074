use crate::models::schema::{media, media_sets};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

#[derive(Queryable, Identifiable, AsChangeset, Serialize, Deserialize, Clone, Debug, Selectable)]
#[diesel(table_name = media)]
pub struct Media {
    pub id: i32,
    pub uuid: Uuid,
    pub set_id: i32,
    pub file_name: String,
    pub file_path: String,
    pub is_selected: bool,
    pub selected_at: Option<DateTime<Utc>>,
    pub is_completed: bool,
    pub is_rejected: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Media {
    pub fn get_by_uuid(
        conn: &mut PgConnection,
        lookup_uuid: Uuid,
    ) -> Result<Option<Media>, MediaError> {
        media::table
            .filter(media::uuid.eq(lookup_uuid))
            .filter(media::deleted_at.is_null())
            .select(Media::as_select())
            .first(conn)
            .optional()
            .map_err(MediaError::DatabaseError)
    }

    /// Looks up a media item together with the phase it belongs to, so guest
    /// handlers can verify the item sits inside the phase their token grants.
    pub fn get_by_uuid_with_phase(
        conn: &mut PgConnection,
        lookup_uuid: Uuid,
    ) -> Result<Option<(Media, i32)>, MediaError> {
        media::table
            .inner_join(media_sets::table)
            .filter(media::uuid.eq(lookup_uuid))
            .filter(media::deleted_at.is_null())
            .select((Media::as_select(), media_sets::phase_id))
            .first::<(Media, i32)>(conn)
            .optional()
            .map_err(MediaError::DatabaseError)
    }

    pub fn get_page_for_set(
        conn: &mut PgConnection,
        lookup_set_id: i32,
        page: i64,
        per_page: i64,
    ) -> Result<Vec<Media>, MediaError> {
        media::table
            .filter(media::set_id.eq(lookup_set_id))
            .filter(media::deleted_at.is_null())
            .order(media::created_at.asc())
            .offset((page - 1) * per_page)
            .limit(per_page)
            .select(Media::as_select())
            .load::<Media>(conn)
            .map_err(MediaError::DatabaseError)
    }

    pub fn count_for_set(
        conn: &mut PgConnection,
        lookup_set_id: i32,
    ) -> Result<i64, MediaError> {
        media::table
            .filter(media::set_id.eq(lookup_set_id))
            .filter(media::deleted_at.is_null())
            .count()
            .get_result(conn)
            .map_err(MediaError::DatabaseError)
    }

    pub fn get_page_for_phase(
        conn: &mut PgConnection,
        lookup_phase_id: i32,
        page: i64,
        per_page: i64,
    ) -> Result<Vec<Media>, MediaError> {
        media::table
            .inner_join(media_sets::table)
            .filter(media_sets::phase_id.eq(lookup_phase_id))
            .filter(media::deleted_at.is_null())
            .order(media::created_at.asc())
            .offset((page - 1) * per_page)
            .limit(per_page)
            .select(Media::as_select())
            .load::<Media>(conn)
            .map_err(MediaError::DatabaseError)
    }

    pub fn count_for_phase(
        conn: &mut PgConnection,
        lookup_phase_id: i32,
    ) -> Result<i64, MediaError> {
        media::table
            .inner_join(media_sets::table)
            .filter(media_sets::phase_id.eq(lookup_phase_id))
            .filter(media::deleted_at.is_null())
            .count()
            .get_result(conn)
            .map_err(MediaError::DatabaseError)
    }

    /// Selections made before a limit reset no longer count against the
    /// quota, so counting accepts the cutoff recorded on the phase.
    pub fn count_selected_in_set(
        conn: &mut PgConnection,
        lookup_set_id: i32,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, MediaError> {
        let mut query = media::table
            .filter(media::set_id.eq(lookup_set_id))
            .filter(media::is_selected.eq(true))
            .filter(media::deleted_at.is_null())
            .into_boxed();
        if let Some(cutoff) = since {
            query = query.filter(media::selected_at.ge(cutoff));
        }
        query
            .count()
            .get_result(conn)
            .map_err(MediaError::DatabaseError)
    }

    pub fn count_selected_in_phase(
        conn: &mut PgConnection,
        lookup_phase_id: i32,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, MediaError> {
        let mut query = media::table
            .inner_join(media_sets::table)
            .filter(media_sets::phase_id.eq(lookup_phase_id))
            .filter(media::is_selected.eq(true))
            .filter(media::deleted_at.is_null())
            .into_boxed();
        if let Some(cutoff) = since {
            query = query.filter(media::selected_at.ge(cutoff));
        }
        query
            .count()
            .get_result(conn)
            .map_err(MediaError::DatabaseError)
    }

    pub fn get_selected_for_phase(
        conn: &mut PgConnection,
        lookup_phase_id: i32,
    ) -> Result<Vec<Media>, MediaError> {
        media::table
            .inner_join(media_sets::table)
            .filter(media_sets::phase_id.eq(lookup_phase_id))
            .filter(media::is_selected.eq(true))
            .filter(media::deleted_at.is_null())
            .order(media::created_at.asc())
            .select(Media::as_select())
            .load::<Media>(conn)
            .map_err(MediaError::DatabaseError)
    }

    pub fn set_selected(&self, conn: &mut PgConnection, selected: bool) -> Result<(), MediaError> {
        let selected_at = if selected { Some(Utc::now()) } else { None };
        diesel::update(media::table)
            .filter(media::id.eq(self.id))
            .set((
                media::is_selected.eq(selected),
                media::selected_at.eq(selected_at),
                media::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .map(|_| ())
            .map_err(MediaError::DatabaseError)
    }

    pub fn set_rejected(&self, conn: &mut PgConnection, rejected: bool) -> Result<(), MediaError> {
        diesel::update(media::table)
            .filter(media::id.eq(self.id))
            .set((
                media::is_rejected.eq(rejected),
                media::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .map(|_| ())
            .map_err(MediaError::DatabaseError)
    }

    /// Freezes the selections of a phase when the guest finishes. Returns the
    /// number of rows locked in.
    pub fn complete_selected_in_phase(
        conn: &mut PgConnection,
        lookup_phase_id: i32,
    ) -> Result<usize, MediaError> {
        let target_ids: Vec<i32> = media::table
            .inner_join(media_sets::table)
            .filter(media_sets::phase_id.eq(lookup_phase_id))
            .filter(media::is_selected.eq(true))
            .filter(media::deleted_at.is_null())
            .select(media::id)
            .load(conn)?;

        diesel::update(media::table)
            .filter(media::id.eq_any(target_ids))
            .set((
                media::is_completed.eq(true),
                media::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .map_err(MediaError::DatabaseError)
    }

    pub fn soft_delete(&self, conn: &mut PgConnection) -> Result<(), MediaError> {
        diesel::update(media::table)
            .filter(media::id.eq(self.id))
            .set((
                media::deleted_at.eq(diesel::dsl::now),
                media::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .map(|_| ())
            .map_err(MediaError::DatabaseError)
    }
}

#[derive(Insertable)]
#[diesel(table_name = media)]
pub struct NewMedia {
    pub uuid: Uuid,
    pub set_id: i32,
    pub file_name: String,
    pub file_path: String,
}

impl NewMedia {
    pub fn new(set_id: i32, file_name: String, file_path: String) -> Self {
        NewMedia {
            uuid: Uuid::new_v4(),
            set_id,
            file_name,
            file_path,
        }
    }

    pub fn insert_batch(
        conn: &mut PgConnection,
        items: &[NewMedia],
    ) -> Result<Vec<Media>, MediaError> {
        diesel::insert_into(media::table)
            .values(items)
            .get_results::<Media>(conn)
            .map_err(MediaError::DatabaseError)
    }
}
