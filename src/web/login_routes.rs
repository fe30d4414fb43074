use crate::{
    db::DBError,
    email::send_welcome_email,
    jwt::{validate_token, NewToken, TokenType},
};
use crate::{ApiError, AppState, Error, User};
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::spawn;
use tracing::{debug, error, info};
use uuid::Uuid;
use validator::Validate;

pub fn router(app_state: Arc<AppState>) -> Router<()> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh_token))
        .with_state(app_state)
}

#[derive(Deserialize, Clone)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Clone, Validate)]
pub struct RegisterCredentials {
    #[validate(email(message = "Invalid email format"))]
    #[validate(length(max = 255, message = "Email must not exceed 255 characters"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,
    #[validate(length(max = 100, message = "Name must not exceed 100 characters"))]
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub id: Uuid,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RefreshRequest {
    refresh_token: String,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    access_token: String,
    refresh_token: String,
}

pub async fn login(
    State(data): State<Arc<AppState>>,
    Json(creds): Json<LoginCredentials>,
) -> Result<Json<AuthResponse>, ApiError> {
    debug!("Entering login function");

    let auth_response = login_internal(data, creds).await?;
    Ok(Json(auth_response))
}

async fn login_internal(
    data: Arc<AppState>,
    creds: LoginCredentials,
) -> Result<AuthResponse, ApiError> {
    match data.authenticate_user(creds.email, creds.password).await {
        Ok(Some(user)) => {
            let access_token = NewToken::new(&user, TokenType::Access, &data)?;
            let refresh_token = NewToken::new(&user, TokenType::Refresh, &data)?;
            Ok(AuthResponse {
                id: user.uuid,
                email: user.email.clone(),
                access_token: access_token.token,
                refresh_token: refresh_token.token,
            })
        }
        Ok(None) => {
            error!("Invalid password attempt");
            Err(ApiError::InvalidCredentials)
        }
        Err(Error::DatabaseError(DBError::UserNotFound)) => {
            error!("User not found by email");
            Err(ApiError::InvalidCredentials)
        }
        Err(e) => {
            error!("Error authenticating user: {:?}", e);
            Err(ApiError::InternalServerError)
        }
    }
}

pub async fn register(
    State(data): State<Arc<AppState>>,
    Json(creds): Json<RegisterCredentials>,
) -> Result<Json<AuthResponse>, ApiError> {
    debug!("Entering register function");

    if let Err(errors) = creds.validate() {
        error!("Validation error: {:?}", errors);
        return Err(ApiError::ValidationError(errors.to_string()));
    }

    let user = match data.register_user(creds.clone()).await {
        Ok(user) => user,
        Err(Error::UserAlreadyExists) => {
            tracing::warn!("Cannot register user that already exists");
            return Err(ApiError::EmailAlreadyExists);
        }
        Err(e) => {
            tracing::error!("Error registering user: {:?}", e);
            return Err(ApiError::InternalServerError);
        }
    };

    handle_new_user_registration(&data, &user);

    // After registration, proceed with login
    let login_result = login_internal(
        data,
        LoginCredentials {
            email: creds.email,
            password: creds.password,
        },
    )
    .await?;

    Ok(Json(login_result))
}

fn handle_new_user_registration(data: &AppState, user: &User) {
    let welcome_email = user.email.clone();
    let app_mode = data.app_mode.clone();
    let resend_api_key = data.config.resend_api_key.clone();
    spawn(async move {
        match send_welcome_email(app_mode, resend_api_key, welcome_email).await {
            Ok(_) => {
                tracing::debug!("Scheduled welcome email");
            }
            Err(e) => {
                tracing::error!("Could not schedule welcome email: {e}");
            }
        }
    });
}

pub async fn refresh_token(
    State(data): State<Arc<AppState>>,
    Json(refresh_request): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    debug!("Entering refresh_token function");
    info!("Refresh token request received");

    let claims = validate_token(&refresh_request.refresh_token, &data, "refresh")?;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| ApiError::InvalidJwt)?;

    let user = data
        .get_user(user_id)
        .await
        .map_err(|_| ApiError::InvalidJwt)?;

    let new_access_token = NewToken::new(&user, TokenType::Access, &data)?;
    let new_refresh_token = NewToken::new(&user, TokenType::Refresh, &data)?;

    Ok(Json(RefreshResponse {
        access_token: new_access_token.token,
        refresh_token: new_refresh_token.token,
    }))
}
