use crate::models::media::NewMedia;
use crate::oauth::ImportState;
use crate::{ApiError, AppState, User};
use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Owner-facing half of the import flow, mounted behind the JWT middleware.
pub fn authorize_router(app_state: Arc<AppState>) -> Router<()> {
    Router::new()
        .route("/import/:provider/authorize", get(authorize))
        .with_state(app_state)
}

/// Provider-facing half. OAuth providers redirect here without credentials;
/// the short-lived state entry is the only link back to the user.
pub fn router(app_state: Arc<AppState>) -> Router<()> {
    Router::new()
        .route("/import/:provider/callback", get(callback))
        .with_state(app_state)
}

#[derive(Deserialize)]
pub struct AuthorizeQuery {
    pub set: Uuid,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

async fn authorize(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(provider_name): Path<String>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!("Starting cloud import authorization");

    let provider = data
        .import_manager
        .get_provider(&provider_name)
        .ok_or(ApiError::NotFound)?;

    let set = data.db.get_media_set_by_uuid(query.set)?;
    let phase = data.db.get_phase_by_id(set.phase_id)?;
    let project = data.db.get_project_by_id(phase.project_id)?;
    if project.owner_id != user.uuid {
        return Err(ApiError::NotFound);
    }

    let state = ImportState {
        user_uuid: user.uuid,
        set_uuid: set.uuid,
    };
    let (authorize_url, _csrf) = provider.generate_authorize_url(state).await;

    Ok(Json(json!({ "authorize_url": authorize_url })))
}

fn frontend_redirect(data: &AppState, outcome: Result<usize, &str>) -> Redirect {
    let base = data.app_mode.frontend_url();
    let url = match outcome {
        Ok(imported) => format!("{}/import/callback?success=true&imported={}", base, imported),
        Err(reason) => format!("{}/import/callback?success=false&error={}", base, reason),
    };
    Redirect::temporary(&url)
}

async fn callback(
    State(data): State<Arc<AppState>>,
    Path(provider_name): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    debug!("Cloud import callback received");

    let Some(provider) = data.import_manager.get_provider(&provider_name) else {
        return frontend_redirect(&data, Err("unknown_provider"));
    };

    if query.error.is_some() {
        debug!("Import authorization was denied");
        return frontend_redirect(&data, Err("access_denied"));
    }
    let (Some(code), Some(state_value)) = (query.code, query.state) else {
        return frontend_redirect(&data, Err("missing_code"));
    };

    // The state entry was parked at authorize time; a miss means it expired
    // or the value was never ours.
    let Some(state) = provider.take_state(&state_value).await else {
        return frontend_redirect(&data, Err("invalid_state"));
    };

    let access_token = match provider.exchange_code(code).await {
        Ok(token) => token,
        Err(e) => {
            error!("Import code exchange failed: {:?}", e);
            return frontend_redirect(&data, Err("exchange_failed"));
        }
    };

    let files = match provider.list_files(&access_token).await {
        Ok(files) => files,
        Err(e) => {
            error!("Import file listing failed: {:?}", e);
            return frontend_redirect(&data, Err("import_failed"));
        }
    };

    let set = match data.db.get_media_set_by_uuid(state.set_uuid) {
        Ok(set) => set,
        Err(e) => {
            error!("Import target set is gone: {:?}", e);
            return frontend_redirect(&data, Err("import_failed"));
        }
    };
    let owner_check = data
        .db
        .get_phase_by_id(set.phase_id)
        .and_then(|phase| data.db.get_project_by_id(phase.project_id));
    match owner_check {
        Ok(project) if project.owner_id == state.user_uuid => {}
        Ok(_) => {
            error!("Import state user no longer owns the target set");
            return frontend_redirect(&data, Err("import_failed"));
        }
        Err(e) => {
            error!("Import ownership lookup failed: {:?}", e);
            return frontend_redirect(&data, Err("import_failed"));
        }
    }

    let items: Vec<NewMedia> = files
        .into_iter()
        .map(|file| NewMedia::new(set.id, file.name, file.path))
        .collect();
    let imported = items.len();
    if imported > 0 {
        if let Err(e) = data.db.create_media_batch(items) {
            error!("Import media insert failed: {:?}", e);
            return frontend_redirect(&data, Err("import_failed"));
        }
    }

    debug!("Imported {} files into set {}", imported, set.uuid);
    frontend_redirect(&data, Ok(imported))
}
