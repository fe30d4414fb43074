use crate::email::send_phase_completed_email;
use crate::guest::{resolve_guest_access, AccessMode, GuestTokenQuery};
use crate::jobs::{enqueue_archive_job, get_archive_job, ArchiveJobStatus};
use crate::limits::LimitUsage;
use crate::models::guest_tokens::NewGuestToken;
use crate::models::media::Media;
use crate::models::media_sets::MediaSet;
use crate::models::phases::{Phase, PhaseStatus};
use crate::web::pagination::{Paginated, PaginationParams};
use crate::web::phase_routes::IssuedGuestToken;
use crate::{ApiError, AppState};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use password_auth::verify_password;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::{spawn, task};
use tracing::{debug, error};
use uuid::Uuid;
use validator::Validate;

pub fn router(app_state: Arc<AppState>) -> Router<()> {
    Router::new()
        .route("/guest/phases/:phase_id/access", post(request_access))
        .route("/guest/phases/:phase_id", get(get_phase))
        .route("/guest/phases/:phase_id/media", get(list_media))
        .route("/guest/media/:media_id/select", post(select_media))
        .route("/guest/media/:media_id/unselect", post(unselect_media))
        .route("/guest/media/:media_id/reject", post(reject_media))
        .route("/guest/phases/:phase_id/complete", post(complete_phase))
        .route("/guest/phases/:phase_id/download", post(request_download))
        .route("/guest/downloads/:job_token", get(download_status))
        .with_state(app_state)
}

#[derive(Deserialize, Clone, Validate)]
pub struct GuestAccessRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Deserialize)]
pub struct GuestMediaQuery {
    pub guest_token: Option<String>,
    pub set: Option<Uuid>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Serialize)]
pub struct GuestPhaseResponse {
    pub phase: Phase,
    pub sets: Vec<MediaSet>,
    pub usage: LimitUsage,
}

#[derive(Serialize)]
pub struct GuestCompleteResponse {
    pub phase: Phase,
    pub completed_media: usize,
}

/// PIN header fallback keeps older raw-file gallery clients working.
fn download_pin_from_headers(headers: &HeaderMap) -> Option<String> {
    for name in ["x-download-pin", "x-raw-files-password"] {
        if let Some(pin) = headers.get(name).and_then(|value| value.to_str().ok()) {
            return Some(pin.to_string());
        }
    }
    None
}

/// Self-service token issuance: a guest who knows the phase password trades
/// {email, password} for a fresh token. Phases without a password only hand
/// out tokens through the owner endpoint.
async fn request_access(
    State(data): State<Arc<AppState>>,
    Path(phase_id): Path<Uuid>,
    Json(access_request): Json<GuestAccessRequest>,
) -> Result<Json<IssuedGuestToken>, ApiError> {
    debug!("Guest requesting phase access");

    if let Err(errors) = access_request.validate() {
        error!("Validation error: {:?}", errors);
        return Err(ApiError::ValidationError(errors.to_string()));
    }

    let phase = data.db.get_phase_by_uuid(phase_id)?;
    if phase.status() == PhaseStatus::Draft {
        debug!("Guest access attempted against draft phase");
        return Err(ApiError::PhaseNotAccessible);
    }

    let Some(password_hash) = phase.password_hash.clone() else {
        return Err(ApiError::InvalidCredentials);
    };
    let password = access_request.password.clone();
    let password_matches =
        task::spawn_blocking(move || verify_password(password, &password_hash).is_ok())
            .await
            .map_err(|e| {
                error!("Password verification task failed: {:?}", e);
                ApiError::InternalServerError
            })?;
    if !password_matches {
        return Err(ApiError::InvalidCredentials);
    }

    if !phase.allows_email(&access_request.email) {
        return Err(ApiError::EmailNotAllowed);
    }

    let new_token = NewGuestToken::new(phase.id, access_request.email);
    let token = data.db.create_guest_token(new_token).map_err(|e| {
        error!("Failed to create guest token: {:?}", e);
        ApiError::InternalServerError
    })?;

    Ok(Json(IssuedGuestToken {
        guest_token: token.token,
        email: token.email,
        expires_at: token.expires_at,
    }))
}

async fn get_phase(
    State(data): State<Arc<AppState>>,
    Path(phase_id): Path<Uuid>,
    Query(token_query): Query<GuestTokenQuery>,
    headers: HeaderMap,
) -> Result<Json<GuestPhaseResponse>, ApiError> {
    debug!("Guest fetching phase");

    let phase = data.db.get_phase_by_uuid(phase_id)?;
    let access = resolve_guest_access(
        &data,
        &headers,
        token_query.guest_token.as_deref(),
        phase,
        AccessMode::Read,
    )
    .await?;

    let sets = data.db.get_media_sets_for_phase(access.phase.id)?;
    let usage = data.db.get_limit_usage(&access.phase, None)?;

    Ok(Json(GuestPhaseResponse {
        phase: access.phase,
        sets,
        usage,
    }))
}

async fn list_media(
    State(data): State<Arc<AppState>>,
    Path(phase_id): Path<Uuid>,
    Query(query): Query<GuestMediaQuery>,
    headers: HeaderMap,
) -> Result<Json<Paginated<Media>>, ApiError> {
    debug!("Guest listing media");

    let phase = data.db.get_phase_by_uuid(phase_id)?;
    let access = resolve_guest_access(
        &data,
        &headers,
        query.guest_token.as_deref(),
        phase,
        AccessMode::Read,
    )
    .await?;

    let params = PaginationParams {
        page: query.page,
        per_page: query.per_page,
    };

    let (media, total) = match query.set {
        Some(set_uuid) => {
            let set = data.db.get_media_set_by_uuid(set_uuid)?;
            if set.phase_id != access.phase.id {
                return Err(ApiError::NotFound);
            }
            data.db
                .get_media_page_for_set(set.id, params.page(), params.per_page())?
        }
        None => {
            data.db
                .get_media_page_for_phase(access.phase.id, params.page(), params.per_page())?
        }
    };

    Ok(Json(Paginated::new(media, &params, total)))
}

/// Loads the media row plus its owning phase, then runs the guest resolver
/// against that phase in the requested mode.
async fn guest_media_access(
    data: &AppState,
    headers: &HeaderMap,
    query_token: Option<&str>,
    media_id: Uuid,
    mode: AccessMode,
) -> Result<(Media, Phase), ApiError> {
    let (media, phase_id) = data.db.get_media_with_phase(media_id)?;
    let phase = data.db.get_phase_by_id(phase_id)?;
    let access = resolve_guest_access(data, headers, query_token, phase, mode).await?;
    Ok((media, access.phase))
}

async fn select_media(
    State(data): State<Arc<AppState>>,
    Path(media_id): Path<Uuid>,
    Query(token_query): Query<GuestTokenQuery>,
    headers: HeaderMap,
) -> Result<Json<Media>, ApiError> {
    debug!("Guest selecting media");

    let (media, phase) = guest_media_access(
        &data,
        &headers,
        token_query.guest_token.as_deref(),
        media_id,
        AccessMode::Mutate,
    )
    .await?;

    if !phase.kind().supports_selection() {
        return Err(ApiError::ValidationError(
            "This phase does not support selection".to_string(),
        ));
    }

    data.db.select_media_transaction(&media)?;

    let media = data.db.get_media_by_uuid(media_id)?;
    Ok(Json(media))
}

async fn unselect_media(
    State(data): State<Arc<AppState>>,
    Path(media_id): Path<Uuid>,
    Query(token_query): Query<GuestTokenQuery>,
    headers: HeaderMap,
) -> Result<Json<Media>, ApiError> {
    debug!("Guest unselecting media");

    let (media, phase) = guest_media_access(
        &data,
        &headers,
        token_query.guest_token.as_deref(),
        media_id,
        AccessMode::Mutate,
    )
    .await?;

    if !phase.kind().supports_selection() {
        return Err(ApiError::ValidationError(
            "This phase does not support selection".to_string(),
        ));
    }

    data.db.unselect_media(&media)?;

    let media = data.db.get_media_by_uuid(media_id)?;
    Ok(Json(media))
}

async fn reject_media(
    State(data): State<Arc<AppState>>,
    Path(media_id): Path<Uuid>,
    Query(token_query): Query<GuestTokenQuery>,
    headers: HeaderMap,
) -> Result<Json<Media>, ApiError> {
    debug!("Guest rejecting media");

    let (media, phase) = guest_media_access(
        &data,
        &headers,
        token_query.guest_token.as_deref(),
        media_id,
        AccessMode::Mutate,
    )
    .await?;

    if !phase.kind().supports_review() {
        return Err(ApiError::ValidationError(
            "This phase does not support review".to_string(),
        ));
    }

    data.db.set_media_rejected(&media, true)?;

    let media = data.db.get_media_by_uuid(media_id)?;
    Ok(Json(media))
}

/// Finalizes the guest's pass: freezes current selections, closes the phase,
/// and consumes the presented token. The owner gets a best-effort email.
async fn complete_phase(
    State(data): State<Arc<AppState>>,
    Path(phase_id): Path<Uuid>,
    Query(token_query): Query<GuestTokenQuery>,
    headers: HeaderMap,
) -> Result<Json<GuestCompleteResponse>, ApiError> {
    debug!("Guest completing phase");

    let phase = data.db.get_phase_by_uuid(phase_id)?;
    let access = resolve_guest_access(
        &data,
        &headers,
        token_query.guest_token.as_deref(),
        phase,
        AccessMode::Mutate,
    )
    .await?;

    let completed_media = data.db.complete_phase_transaction(&access.phase)?;
    data.db.mark_guest_token_used(&access.token)?;

    let phase = data.db.get_phase_by_uuid(phase_id)?;

    // The completion is committed at this point; the notification must not
    // fail the request.
    match data
        .db
        .get_project_by_id(phase.project_id)
        .and_then(|project| data.db.get_user_by_uuid(project.owner_id))
    {
        Ok(owner) => {
            let app_mode = data.app_mode.clone();
            let resend_api_key = data.config.resend_api_key.clone();
            let phase_name = phase.name.clone();
            spawn(async move {
                if let Err(e) = send_phase_completed_email(
                    app_mode,
                    resend_api_key,
                    owner.email,
                    phase_name,
                    completed_media,
                )
                .await
                {
                    error!("Failed to send phase completed email: {:?}", e);
                }
            });
        }
        Err(e) => error!("Could not load phase owner for notification: {:?}", e),
    }

    Ok(Json(GuestCompleteResponse {
        phase,
        completed_media,
    }))
}

async fn request_download(
    State(data): State<Arc<AppState>>,
    Path(phase_id): Path<Uuid>,
    Query(token_query): Query<GuestTokenQuery>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!("Guest requesting archive download");

    let phase = data.db.get_phase_by_uuid(phase_id)?;
    let access = resolve_guest_access(
        &data,
        &headers,
        token_query.guest_token.as_deref(),
        phase,
        AccessMode::Read,
    )
    .await?;

    if let Some(pin_hash) = access.phase.download_pin_hash.clone() {
        let pin = download_pin_from_headers(&headers).ok_or(ApiError::InvalidPin)?;
        let pin_matches = task::spawn_blocking(move || verify_password(pin, &pin_hash).is_ok())
            .await
            .map_err(|e| {
                error!("PIN verification task failed: {:?}", e);
                ApiError::InternalServerError
            })?;
        if !pin_matches {
            return Err(ApiError::InvalidPin);
        }
    }

    let job_token = enqueue_archive_job(data.clone(), access.phase).await;

    Ok(Json(json!({ "job_token": job_token })))
}

async fn download_status(
    State(data): State<Arc<AppState>>,
    Path(job_token): Path<String>,
) -> Result<Json<ArchiveJobStatus>, ApiError> {
    debug!("Polling archive job status");

    match get_archive_job(&data, &job_token).await {
        Some(status) => Ok(Json(status)),
        None => Err(ApiError::NotFound),
    }
}
