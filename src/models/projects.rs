use crate::models::schema::projects;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Archived => "archived",
        }
    }

    /// Strict parse for request payloads.
    pub fn parse(s: &str) -> Option<ProjectStatus> {
        match s.to_lowercase().as_str() {
            "active" => Some(ProjectStatus::Active),
            "archived" => Some(ProjectStatus::Archived),
            _ => None,
        }
    }
}

impl From<String> for ProjectStatus {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "archived" => ProjectStatus::Archived,
            _ => ProjectStatus::Active,
        }
    }
}

#[derive(Queryable, Identifiable, AsChangeset, Serialize, Deserialize, Clone, Debug, Selectable)]
#[diesel(table_name = projects)]
pub struct Project {
    pub id: i32,
    pub uuid: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn get_by_id(
        conn: &mut PgConnection,
        lookup_id: i32,
    ) -> Result<Option<Project>, ProjectError> {
        projects::table
            .filter(projects::id.eq(lookup_id))
            .select(Project::as_select())
            .first(conn)
            .optional()
            .map_err(ProjectError::DatabaseError)
    }

    pub fn get_by_uuid(
        conn: &mut PgConnection,
        lookup_uuid: Uuid,
    ) -> Result<Option<Project>, ProjectError> {
        projects::table
            .filter(projects::uuid.eq(lookup_uuid))
            .select(Project::as_select())
            .first(conn)
            .optional()
            .map_err(ProjectError::DatabaseError)
    }

    pub fn get_page_for_owner(
        conn: &mut PgConnection,
        lookup_owner_id: Uuid,
        page: i64,
        per_page: i64,
    ) -> Result<Vec<Project>, ProjectError> {
        projects::table
            .filter(projects::owner_id.eq(lookup_owner_id))
            .order(projects::created_at.desc())
            .offset((page - 1) * per_page)
            .limit(per_page)
            .select(Project::as_select())
            .load::<Project>(conn)
            .map_err(ProjectError::DatabaseError)
    }

    pub fn count_for_owner(
        conn: &mut PgConnection,
        lookup_owner_id: Uuid,
    ) -> Result<i64, ProjectError> {
        projects::table
            .filter(projects::owner_id.eq(lookup_owner_id))
            .count()
            .get_result(conn)
            .map_err(ProjectError::DatabaseError)
    }

    pub fn update(&self, conn: &mut PgConnection) -> Result<(), ProjectError> {
        diesel::update(projects::table)
            .filter(projects::id.eq(self.id))
            .set((
                projects::name.eq(&self.name),
                projects::description.eq(&self.description),
                projects::status.eq(&self.status),
                projects::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .map(|_| ())
            .map_err(ProjectError::DatabaseError)
    }

    pub fn delete(&self, conn: &mut PgConnection) -> Result<(), ProjectError> {
        diesel::delete(projects::table)
            .filter(projects::id.eq(self.id))
            .execute(conn)
            .map(|_| ())
            .map_err(ProjectError::DatabaseError)
    }
}

#[derive(Insertable)]
#[diesel(table_name = projects)]
pub struct NewProject {
    pub uuid: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
}

impl NewProject {
    pub fn new(owner_id: Uuid, name: String, description: Option<String>) -> Self {
        NewProject {
            uuid: Uuid::new_v4(),
            owner_id,
            name,
            description,
            status: ProjectStatus::Active.as_str().to_string(),
        }
    }

    pub fn insert(&self, conn: &mut PgConnection) -> Result<Project, ProjectError> {
        diesel::insert_into(projects::table)
            .values(self)
            .get_result::<Project>(conn)
            .map_err(ProjectError::DatabaseError)
    }
}
