use crate::email::send_guest_invite_email;
use crate::models::guest_tokens::{GuestToken, NewGuestToken};
use crate::models::media::{Media, NewMedia};
use crate::models::media_sets::{MediaSet, NewMediaSet};
use crate::models::phases::{NewPhase, Phase, PhaseKind, PhaseStatus};
use crate::web::pagination::{Paginated, PaginationParams};
use crate::{ApiError, AppState, User};
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use password_auth::generate_hash;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::spawn;
use tracing::{debug, error};
use uuid::Uuid;
use validator::Validate;

pub fn router(app_state: Arc<AppState>) -> Router<()> {
    Router::new()
        .route("/projects/:project_id/phases", post(create_phase))
        .route("/projects/:project_id/phases", get(list_phases))
        .route("/phases/:phase_id", get(get_phase))
        .route("/phases/:phase_id", put(update_phase))
        .route("/phases/:phase_id", delete(delete_phase))
        .route("/phases/:phase_id/activate", post(activate_phase))
        .route("/phases/:phase_id/complete", post(complete_phase))
        .route("/phases/:phase_id/reset-limit", post(reset_phase_limit))
        .route("/phases/:phase_id/sets", post(create_set))
        .route("/phases/:phase_id/sets", get(list_sets))
        .route("/sets/:set_id", put(update_set))
        .route("/sets/:set_id", delete(delete_set))
        .route("/sets/:set_id/media", post(add_media))
        .route("/sets/:set_id/media", get(list_media))
        .route("/media/:media_id", delete(delete_media))
        .route("/phases/:phase_id/guest-tokens", post(create_guest_token))
        .route("/phases/:phase_id/guest-tokens", get(list_guest_tokens))
        .with_state(app_state)
}

#[derive(Deserialize, Clone, Validate)]
pub struct CreatePhaseRequest {
    pub kind: String,
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(range(min = 1, message = "Media limit must be positive"))]
    pub media_limit: Option<i32>,
    pub allowed_emails: Option<Vec<String>>,
}

/// Update payload. Double-wrapped options distinguish "absent" (leave
/// unchanged) from an explicit `null` (clear the field).
#[derive(Deserialize, Clone, Validate)]
pub struct UpdatePhaseRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[serde(default)]
    pub media_limit: Option<Option<i32>>,
    #[serde(default)]
    pub allowed_emails: Option<Option<Vec<String>>>,
    #[serde(default)]
    pub password: Option<Option<String>>,
    #[serde(default)]
    pub download_pin: Option<Option<String>>,
}

#[derive(Deserialize, Clone, Validate)]
pub struct CreateSetRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    pub position: Option<i32>,
    #[validate(range(min = 1, message = "Media limit must be positive"))]
    pub media_limit: Option<i32>,
}

#[derive(Deserialize, Clone, Validate)]
pub struct UpdateSetRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    pub position: Option<i32>,
    #[serde(default)]
    pub media_limit: Option<Option<i32>>,
}

#[derive(Deserialize, Clone, Validate)]
pub struct AddMediaRequest {
    #[validate(length(min = 1, max = 500, message = "Provide between 1 and 500 media items"))]
    pub items: Vec<MediaItem>,
}

#[derive(Deserialize, Serialize, Clone)]
pub struct MediaItem {
    pub file_name: String,
    pub file_path: String,
}

#[derive(Deserialize, Clone, Validate)]
pub struct CreateGuestTokenRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Serialize)]
pub struct PhaseResponse {
    pub phase: Phase,
    pub sets: Vec<MediaSet>,
}

#[derive(Serialize)]
pub struct CompletePhaseResponse {
    pub phase: Phase,
    pub completed_media: usize,
}

/// Token issuance is the one place the raw token value leaves the system;
/// after this response (and the invite email) it is never shown again.
#[derive(Serialize)]
pub struct IssuedGuestToken {
    pub guest_token: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// Loads a phase by UUID and confirms the caller owns the project it belongs
/// to. Foreign phases are reported as missing rather than forbidden.
fn owned_phase(data: &AppState, user: &User, phase_id: Uuid) -> Result<Phase, ApiError> {
    let phase = data.db.get_phase_by_uuid(phase_id)?;
    let project = data.db.get_project_by_id(phase.project_id)?;
    if project.owner_id != user.uuid {
        return Err(ApiError::NotFound);
    }
    Ok(phase)
}

fn owned_set(data: &AppState, user: &User, set_id: Uuid) -> Result<MediaSet, ApiError> {
    let set = data.db.get_media_set_by_uuid(set_id)?;
    let phase = data.db.get_phase_by_id(set.phase_id)?;
    let project = data.db.get_project_by_id(phase.project_id)?;
    if project.owner_id != user.uuid {
        return Err(ApiError::NotFound);
    }
    Ok(set)
}

fn owned_media(data: &AppState, user: &User, media_id: Uuid) -> Result<Media, ApiError> {
    let media = data.db.get_media_by_uuid(media_id)?;
    let set = data.db.get_media_set_by_id(media.set_id)?;
    let phase = data.db.get_phase_by_id(set.phase_id)?;
    let project = data.db.get_project_by_id(phase.project_id)?;
    if project.owner_id != user.uuid {
        return Err(ApiError::NotFound);
    }
    Ok(media)
}

async fn create_phase(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(project_id): Path<Uuid>,
    Json(create_request): Json<CreatePhaseRequest>,
) -> Result<Json<Phase>, ApiError> {
    debug!("Creating new phase");

    if let Err(errors) = create_request.validate() {
        error!("Validation error: {:?}", errors);
        return Err(ApiError::ValidationError(errors.to_string()));
    }

    let kind = PhaseKind::parse(&create_request.kind).ok_or_else(|| {
        ApiError::ValidationError(format!("Unknown phase kind: {}", create_request.kind))
    })?;

    let project = data.db.get_project_by_uuid(project_id)?;
    if project.owner_id != user.uuid {
        return Err(ApiError::NotFound);
    }

    let new_phase = NewPhase::new(project.id, kind, create_request.name)
        .with_media_limit(create_request.media_limit)
        .with_allowed_emails(create_request.allowed_emails);

    let phase = data.db.create_phase(new_phase).map_err(|e| {
        error!("Failed to create phase: {:?}", e);
        ApiError::InternalServerError
    })?;

    Ok(Json(phase))
}

async fn list_phases(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Phase>>, ApiError> {
    debug!("Listing phases");

    let project = data.db.get_project_by_uuid(project_id)?;
    if project.owner_id != user.uuid {
        return Err(ApiError::NotFound);
    }

    let phases = data.db.get_phases_for_project(project.id)?;
    Ok(Json(phases))
}

async fn get_phase(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(phase_id): Path<Uuid>,
) -> Result<Json<PhaseResponse>, ApiError> {
    debug!("Fetching phase");

    let phase = owned_phase(&data, &user, phase_id)?;
    let sets = data.db.get_media_sets_for_phase(phase.id)?;

    Ok(Json(PhaseResponse { phase, sets }))
}

async fn update_phase(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(phase_id): Path<Uuid>,
    Json(update_request): Json<UpdatePhaseRequest>,
) -> Result<Json<Phase>, ApiError> {
    debug!("Updating phase");

    if let Err(errors) = update_request.validate() {
        error!("Validation error: {:?}", errors);
        return Err(ApiError::ValidationError(errors.to_string()));
    }

    let mut phase = owned_phase(&data, &user, phase_id)?;

    if let Some(name) = update_request.name {
        phase.name = name;
    }
    if let Some(media_limit) = update_request.media_limit {
        if matches!(media_limit, Some(limit) if limit < 1) {
            return Err(ApiError::ValidationError(
                "Media limit must be positive".to_string(),
            ));
        }
        phase.media_limit = media_limit;
    }
    if let Some(allowed_emails) = update_request.allowed_emails {
        phase.allowed_emails = allowed_emails;
    }
    if let Some(password) = update_request.password {
        phase.password_hash = match password {
            Some(password) => {
                if password.is_empty() || password.len() > 128 {
                    return Err(ApiError::ValidationError(
                        "Password must be 1-128 characters".to_string(),
                    ));
                }
                Some(generate_hash(password))
            }
            None => None,
        };
    }
    if let Some(download_pin) = update_request.download_pin {
        phase.download_pin_hash = match download_pin {
            Some(pin) => {
                if pin.len() != 4 || !pin.chars().all(|c| c.is_ascii_digit()) {
                    return Err(ApiError::ValidationError(
                        "Download PIN must be exactly 4 digits".to_string(),
                    ));
                }
                Some(generate_hash(pin))
            }
            None => None,
        };
    }

    data.db.update_phase(&phase).map_err(|e| {
        error!("Failed to update phase: {:?}", e);
        ApiError::InternalServerError
    })?;

    // Read the row back so updated_at reflects the write
    let phase = data.db.get_phase_by_uuid(phase_id)?;
    Ok(Json(phase))
}

async fn delete_phase(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(phase_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!("Deleting phase");

    let phase = owned_phase(&data, &user, phase_id)?;

    data.db.soft_delete_phase(&phase).map_err(|e| {
        error!("Failed to delete phase: {:?}", e);
        ApiError::InternalServerError
    })?;

    Ok(Json(serde_json::json!({
        "message": "Phase deleted successfully"
    })))
}

async fn activate_phase(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(phase_id): Path<Uuid>,
) -> Result<Json<Phase>, ApiError> {
    debug!("Activating phase");

    let phase = owned_phase(&data, &user, phase_id)?;
    data.db.set_phase_status(&phase, PhaseStatus::Active)?;

    let phase = data.db.get_phase_by_uuid(phase_id)?;
    Ok(Json(phase))
}

/// Owner-side completion. Freezes every current selection and closes the
/// phase to further guest changes, same as a guest finishing their pass.
async fn complete_phase(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(phase_id): Path<Uuid>,
) -> Result<Json<CompletePhaseResponse>, ApiError> {
    debug!("Completing phase");

    let phase = owned_phase(&data, &user, phase_id)?;
    let completed_media = data.db.complete_phase_transaction(&phase)?;

    let phase = data.db.get_phase_by_uuid(phase_id)?;
    Ok(Json(CompletePhaseResponse {
        phase,
        completed_media,
    }))
}

async fn reset_phase_limit(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(phase_id): Path<Uuid>,
) -> Result<Json<Phase>, ApiError> {
    debug!("Resetting phase selection limit");

    let phase = owned_phase(&data, &user, phase_id)?;
    data.db.reset_phase_limit(&phase)?;

    let phase = data.db.get_phase_by_uuid(phase_id)?;
    Ok(Json(phase))
}

async fn create_set(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(phase_id): Path<Uuid>,
    Json(create_request): Json<CreateSetRequest>,
) -> Result<Json<MediaSet>, ApiError> {
    debug!("Creating new media set");

    if let Err(errors) = create_request.validate() {
        error!("Validation error: {:?}", errors);
        return Err(ApiError::ValidationError(errors.to_string()));
    }

    let phase = owned_phase(&data, &user, phase_id)?;

    let new_set = NewMediaSet::new(
        phase.id,
        create_request.name,
        create_request.position.unwrap_or(0),
        create_request.media_limit,
    );
    let set = data.db.create_media_set(new_set).map_err(|e| {
        error!("Failed to create media set: {:?}", e);
        ApiError::InternalServerError
    })?;

    Ok(Json(set))
}

async fn list_sets(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(phase_id): Path<Uuid>,
) -> Result<Json<Vec<MediaSet>>, ApiError> {
    debug!("Listing media sets");

    let phase = owned_phase(&data, &user, phase_id)?;
    let sets = data.db.get_media_sets_for_phase(phase.id)?;
    Ok(Json(sets))
}

async fn update_set(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(set_id): Path<Uuid>,
    Json(update_request): Json<UpdateSetRequest>,
) -> Result<Json<MediaSet>, ApiError> {
    debug!("Updating media set");

    if let Err(errors) = update_request.validate() {
        error!("Validation error: {:?}", errors);
        return Err(ApiError::ValidationError(errors.to_string()));
    }

    let mut set = owned_set(&data, &user, set_id)?;

    if let Some(name) = update_request.name {
        set.name = name;
    }
    if let Some(position) = update_request.position {
        set.position = position;
    }
    if let Some(media_limit) = update_request.media_limit {
        if matches!(media_limit, Some(limit) if limit < 1) {
            return Err(ApiError::ValidationError(
                "Media limit must be positive".to_string(),
            ));
        }
        set.media_limit = media_limit;
    }

    data.db.update_media_set(&set).map_err(|e| {
        error!("Failed to update media set: {:?}", e);
        ApiError::InternalServerError
    })?;

    let set = data.db.get_media_set_by_uuid(set_id)?;
    Ok(Json(set))
}

async fn delete_set(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(set_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!("Deleting media set");

    let set = owned_set(&data, &user, set_id)?;

    data.db.delete_media_set(&set).map_err(|e| {
        error!("Failed to delete media set: {:?}", e);
        ApiError::InternalServerError
    })?;

    Ok(Json(serde_json::json!({
        "message": "Media set deleted successfully"
    })))
}

async fn add_media(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(set_id): Path<Uuid>,
    Json(add_request): Json<AddMediaRequest>,
) -> Result<Json<Vec<Media>>, ApiError> {
    debug!("Adding media to set");

    if let Err(errors) = add_request.validate() {
        error!("Validation error: {:?}", errors);
        return Err(ApiError::ValidationError(errors.to_string()));
    }
    if add_request
        .items
        .iter()
        .any(|item| item.file_name.is_empty() || item.file_path.is_empty())
    {
        return Err(ApiError::ValidationError(
            "Media items need a file name and a file path".to_string(),
        ));
    }

    let set = owned_set(&data, &user, set_id)?;

    let items: Vec<NewMedia> = add_request
        .items
        .into_iter()
        .map(|item| NewMedia::new(set.id, item.file_name, item.file_path))
        .collect();

    let media = data.db.create_media_batch(items).map_err(|e| {
        error!("Failed to add media: {:?}", e);
        ApiError::InternalServerError
    })?;

    Ok(Json(media))
}

async fn list_media(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(set_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Media>>, ApiError> {
    debug!("Listing media for set");

    let set = owned_set(&data, &user, set_id)?;

    let (media, total) = data
        .db
        .get_media_page_for_set(set.id, params.page(), params.per_page())
        .map_err(|e| {
            error!("Failed to list media: {:?}", e);
            ApiError::InternalServerError
        })?;

    Ok(Json(Paginated::new(media, &params, total)))
}

async fn delete_media(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(media_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!("Deleting media");

    let media = owned_media(&data, &user, media_id)?;

    data.db.soft_delete_media(&media).map_err(|e| {
        error!("Failed to delete media: {:?}", e);
        ApiError::InternalServerError
    })?;

    Ok(Json(serde_json::json!({
        "message": "Media deleted successfully"
    })))
}

async fn create_guest_token(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(phase_id): Path<Uuid>,
    Json(create_request): Json<CreateGuestTokenRequest>,
) -> Result<Json<IssuedGuestToken>, ApiError> {
    debug!("Issuing guest token");

    if let Err(errors) = create_request.validate() {
        error!("Validation error: {:?}", errors);
        return Err(ApiError::ValidationError(errors.to_string()));
    }

    let phase = owned_phase(&data, &user, phase_id)?;

    // Allow-list gate runs before any token row exists.
    if !phase.allows_email(&create_request.email) {
        return Err(ApiError::EmailNotAllowed);
    }

    let new_token = NewGuestToken::new(phase.id, create_request.email);
    let token = data.db.create_guest_token(new_token).map_err(|e| {
        error!("Failed to create guest token: {:?}", e);
        ApiError::InternalServerError
    })?;

    let app_mode = data.app_mode.clone();
    let resend_api_key = data.config.resend_api_key.clone();
    let to_email = token.email.clone();
    let phase_name = phase.name.clone();
    let phase_uuid = phase.uuid;
    let token_value = token.token.clone();
    spawn(async move {
        if let Err(e) = send_guest_invite_email(
            app_mode,
            resend_api_key,
            to_email,
            phase_name,
            phase_uuid,
            token_value,
        )
        .await
        {
            error!("Failed to send guest invite email: {:?}", e);
        }
    });

    Ok(Json(IssuedGuestToken {
        guest_token: token.token,
        email: token.email,
        expires_at: token.expires_at,
    }))
}

async fn list_guest_tokens(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(phase_id): Path<Uuid>,
) -> Result<Json<Vec<GuestToken>>, ApiError> {
    debug!("Listing guest tokens");

    let phase = owned_phase(&data, &user, phase_id)?;
    let tokens = data.db.get_guest_tokens_for_phase(phase.id)?;
    Ok(Json(tokens))
}
