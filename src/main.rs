use crate::cache::TtlCache;
use crate::jobs::ArchiveJobStatus;
use crate::jwt::validate_jwt;
use crate::oauth::{DropboxProvider, GoogleDriveProvider, ImportManager, ImportState};
use crate::payments::flutterwave::FlutterwaveClient;
use crate::payments::paypal::PaypalClient;
use crate::payments::paystack::PaystackClient;
use crate::payments::stripe::StripeClient;
use crate::payments::{PendingCheckout, ProviderRegistry};
use crate::web::login_routes::RegisterCredentials;
use crate::{
    db::{setup_db, DBConnection, DBError},
    models::phases::PhaseError,
    models::users::{NewUser, User},
};
use axum::{
    http::{Method, StatusCode},
    middleware::from_fn_with_state,
    response::IntoResponse,
    Json,
};
use password_auth::{generate_hash, verify_password};
use serde::Serialize;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;
use uuid::Uuid;

mod cache;
mod db;
mod email;
mod guest;
mod jobs;
mod jwt;
mod limits;
mod models;
mod oauth;
mod payments;
mod web;

use web::{
    billing_routes, guest_routes, health_routes, import_authorize_routes, import_routes,
    login_routes, phase_routes, project_routes, webhook_routes,
};

/// How often the in-process caches drop expired entries.
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// How often expired guest tokens are purged from the database.
const GUEST_TOKEN_SWEEP_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    TaskJoin(#[from] task::JoinError),

    #[error(transparent)]
    StdIo(#[from] std::io::Error),

    #[error(transparent)]
    TryInit(#[from] tracing_subscriber::util::TryInitError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DBError),

    #[error("User not found")]
    UserNotFound,

    #[error("Failed to parse secret")]
    SecretParsingError,

    #[error("Builder error: {0}")]
    BuilderError(String),

    #[error("OAuth error: {0}")]
    OAuthError(String),

    #[error("User with this email already exists")]
    UserAlreadyExists,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Guest token required")]
    GuestTokenMissing,

    #[error("Guest token does not grant access to this phase")]
    InvalidGuestToken,

    #[error("Phase is not accessible")]
    PhaseNotAccessible,

    #[error("Email is not on the allowed list for this phase")]
    EmailNotAllowed,

    #[error("Selection limit of {0} reached")]
    SelectionLimitReached(i32),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid download PIN")]
    InvalidPin,

    #[error("Invalid JWT")]
    InvalidJwt,

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Resource not found")]
    NotFound,

    #[error("Email already registered")]
    EmailAlreadyExists,

    #[error("Bad Request")]
    BadRequest,

    #[error("Internal server error")]
    InternalServerError,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::GuestTokenMissing => StatusCode::UNAUTHORIZED,
            ApiError::InvalidGuestToken => StatusCode::UNAUTHORIZED,
            ApiError::PhaseNotAccessible => StatusCode::FORBIDDEN,
            ApiError::EmailNotAllowed => StatusCode::FORBIDDEN,
            ApiError::SelectionLimitReached(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::InvalidPin => StatusCode::UNAUTHORIZED,
            ApiError::InvalidJwt => StatusCode::UNAUTHORIZED,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::EmailAlreadyExists => StatusCode::CONFLICT,
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            ApiError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code. Clients branch on this, not on the
    /// message text.
    fn code(&self) -> &'static str {
        match self {
            ApiError::GuestTokenMissing => "GUEST_TOKEN_MISSING",
            ApiError::InvalidGuestToken => "INVALID_TOKEN",
            ApiError::PhaseNotAccessible => "PHASE_NOT_ACCESSIBLE",
            ApiError::EmailNotAllowed => "EMAIL_NOT_ALLOWED",
            ApiError::SelectionLimitReached(_) => "SELECTION_LIMIT_REACHED",
            ApiError::InvalidCredentials => "INVALID_CREDENTIALS",
            ApiError::InvalidPin => "INVALID_PIN",
            ApiError::InvalidJwt => "INVALID_JWT",
            ApiError::ValidationError(_) => "VALIDATION_FAILED",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::EmailAlreadyExists => "CONFLICT",
            ApiError::BadRequest => "BAD_REQUEST",
            ApiError::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        (
            status,
            Json(ErrorResponse {
                status: status.as_u16(),
                code: self.code(),
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<DBError> for ApiError {
    fn from(err: DBError) -> Self {
        error!("Database error: {:?}", err);
        match err {
            DBError::UserNotFound
            | DBError::ProjectNotFound
            | DBError::PhaseNotFound
            | DBError::MediaSetNotFound
            | DBError::MediaNotFound
            | DBError::GuestTokenNotFound
            | DBError::SubscriptionNotFound => ApiError::NotFound,
            DBError::SelectionLimitReached(limit) => ApiError::SelectionLimitReached(limit),
            DBError::PhaseError(PhaseError::InvalidTransition) => {
                ApiError::ValidationError("Invalid phase status transition".to_string())
            }
            _ => ApiError::InternalServerError,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    status: u16,
    code: &'static str,
    message: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    jwt_keys: jwt::JwtKeys,
    access_token_maxage: i64,
    refresh_token_maxage: i64,
    resend_api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppMode {
    Local,
    Dev,
    Prod,
    Custom(String),
}

impl AppMode {
    fn frontend_url(&self) -> &str {
        match self {
            AppMode::Local => "http://127.0.0.1:5173",
            AppMode::Dev => "https://dev.memora.app",
            AppMode::Prod => "https://memora.app",
            AppMode::Custom(_) => "https://dev.memora.app",
        }
    }
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppMode::Local => write!(f, "local"),
            AppMode::Dev => write!(f, "dev"),
            AppMode::Prod => write!(f, "prod"),
            AppMode::Custom(_) => write!(f, "custom"),
        }
    }
}

impl FromStr for AppMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(AppMode::Local),
            "dev" => Ok(AppMode::Dev),
            "prod" => Ok(AppMode::Prod),
            "custom" => {
                // For custom mode, get the ENV_NAME
                match std::env::var("ENV_NAME") {
                    Ok(env_name) => Ok(AppMode::Custom(env_name)),
                    Err(_) => Err("ENV_NAME must be set when using custom mode".to_string()),
                }
            }
            _ => Err(format!("Invalid app mode: {}", s)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    app_mode: AppMode,
    db: Arc<dyn DBConnection + Send + Sync>,
    config: Config,
    providers: ProviderRegistry,
    pending_checkouts: TtlCache<PendingCheckout>,
    archive_jobs: TtlCache<ArchiveJobStatus>,
    import_manager: Arc<ImportManager>,
}

#[derive(Default)]
pub struct AppStateBuilder {
    app_mode: Option<AppMode>,
    db: Option<Arc<dyn DBConnection + Send + Sync>>,
    jwt_secret: Option<Vec<u8>>,
    resend_api_key: Option<String>,
    backend_url: Option<String>,
    stripe_secret_key: Option<String>,
    paystack_secret_key: Option<String>,
    flutterwave_secret_key: Option<String>,
    paypal_client_id: Option<String>,
    paypal_client_secret: Option<String>,
    google_drive_client_id: Option<String>,
    google_drive_client_secret: Option<String>,
    dropbox_client_id: Option<String>,
    dropbox_client_secret: Option<String>,
}

impl AppStateBuilder {
    pub fn app_mode(mut self, app_mode: AppMode) -> Self {
        self.app_mode = Some(app_mode);
        self
    }

    pub fn db(mut self, db: Arc<dyn DBConnection + Send + Sync>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn jwt_secret(mut self, jwt_secret: Vec<u8>) -> Self {
        self.jwt_secret = Some(jwt_secret);
        self
    }

    pub fn resend_api_key(mut self, resend_api_key: Option<String>) -> Self {
        self.resend_api_key = resend_api_key;
        self
    }

    pub fn backend_url(mut self, backend_url: Option<String>) -> Self {
        self.backend_url = backend_url;
        self
    }

    pub fn stripe_secret_key(mut self, stripe_secret_key: Option<String>) -> Self {
        self.stripe_secret_key = stripe_secret_key;
        self
    }

    pub fn paystack_secret_key(mut self, paystack_secret_key: Option<String>) -> Self {
        self.paystack_secret_key = paystack_secret_key;
        self
    }

    pub fn flutterwave_secret_key(mut self, flutterwave_secret_key: Option<String>) -> Self {
        self.flutterwave_secret_key = flutterwave_secret_key;
        self
    }

    pub fn paypal_client_id(mut self, paypal_client_id: Option<String>) -> Self {
        self.paypal_client_id = paypal_client_id;
        self
    }

    pub fn paypal_client_secret(mut self, paypal_client_secret: Option<String>) -> Self {
        self.paypal_client_secret = paypal_client_secret;
        self
    }

    pub fn google_drive_client_id(mut self, google_drive_client_id: Option<String>) -> Self {
        self.google_drive_client_id = google_drive_client_id;
        self
    }

    pub fn google_drive_client_secret(
        mut self,
        google_drive_client_secret: Option<String>,
    ) -> Self {
        self.google_drive_client_secret = google_drive_client_secret;
        self
    }

    pub fn dropbox_client_id(mut self, dropbox_client_id: Option<String>) -> Self {
        self.dropbox_client_id = dropbox_client_id;
        self
    }

    pub fn dropbox_client_secret(mut self, dropbox_client_secret: Option<String>) -> Self {
        self.dropbox_client_secret = dropbox_client_secret;
        self
    }

    pub async fn build(self) -> Result<AppState, Error> {
        let app_mode = self
            .app_mode
            .ok_or(Error::BuilderError("app_mode is required".to_string()))?;
        let db = self
            .db
            .ok_or(Error::BuilderError("db is required".to_string()))?;
        let jwt_secret = self
            .jwt_secret
            .ok_or(Error::BuilderError("jwt_secret is required".to_string()))?;

        let config = Config {
            jwt_keys: jwt::JwtKeys::new(jwt_secret)?,
            access_token_maxage: 60,  // 60 minutes
            refresh_token_maxage: 30, // 30 days
            resend_api_key: self.resend_api_key,
        };

        // Log the public key in hex format
        tracing::info!(
            "JWT ES256K public key (hex): {}",
            hex::encode(config.jwt_keys.public_key().serialize())
        );

        let stripe = self.stripe_secret_key.map(StripeClient::new);
        let paystack = self.paystack_secret_key.map(PaystackClient::new);
        let flutterwave = self.flutterwave_secret_key.map(FlutterwaveClient::new);
        let paypal = match (self.paypal_client_id, self.paypal_client_secret) {
            (Some(client_id), Some(client_secret)) => {
                if app_mode == AppMode::Prod {
                    Some(PaypalClient::new(client_id, client_secret))
                } else {
                    Some(PaypalClient::new_sandbox(client_id, client_secret))
                }
            }
            _ => None,
        };
        let providers = ProviderRegistry {
            stripe,
            paystack,
            flutterwave,
            paypal,
        };

        let backend_url = self
            .backend_url
            .unwrap_or_else(|| "http://127.0.0.1:3000".to_string());

        let import_states: TtlCache<ImportState> = TtlCache::new();
        import_states.spawn_sweeper(CACHE_SWEEP_INTERVAL);

        let mut import_manager = ImportManager::new();
        if let (Some(client_id), Some(client_secret)) = (
            self.google_drive_client_id,
            self.google_drive_client_secret,
        ) {
            let provider = GoogleDriveProvider::new(
                client_id,
                client_secret,
                import_callback_url(&backend_url, "google")?,
                import_states.clone(),
            )?;
            import_manager.add_provider("google".to_string(), Box::new(provider));
        }
        if let (Some(client_id), Some(client_secret)) =
            (self.dropbox_client_id, self.dropbox_client_secret)
        {
            let provider = DropboxProvider::new(
                client_id,
                client_secret,
                import_callback_url(&backend_url, "dropbox")?,
                import_states.clone(),
            )?;
            import_manager.add_provider("dropbox".to_string(), Box::new(provider));
        }

        let pending_checkouts: TtlCache<PendingCheckout> = TtlCache::new();
        pending_checkouts.spawn_sweeper(CACHE_SWEEP_INTERVAL);

        let archive_jobs: TtlCache<ArchiveJobStatus> = TtlCache::new();
        archive_jobs.spawn_sweeper(CACHE_SWEEP_INTERVAL);

        Ok(AppState {
            app_mode,
            db,
            config,
            providers,
            pending_checkouts,
            archive_jobs,
            import_manager: Arc::new(import_manager),
        })
    }
}

/// OAuth redirect target served by this backend. Providers must list this
/// exact URL in their app configuration.
fn import_callback_url(backend_url: &str, provider: &str) -> Result<String, Error> {
    let base = Url::parse(backend_url)
        .map_err(|e| Error::BuilderError(format!("Invalid backend URL: {}", e)))?;
    let joined = base
        .join(&format!("/import/{}/callback", provider))
        .map_err(|e| Error::BuilderError(format!("Invalid callback URL: {}", e)))?;
    Ok(joined.to_string())
}

impl AppState {
    async fn register_user(&self, creds: RegisterCredentials) -> Result<User, Error> {
        match self.db.get_user_by_email(&creds.email) {
            Ok(_) => {
                // User already exists
                return Err(Error::UserAlreadyExists);
            }
            Err(DBError::UserNotFound) => {
                // This is what we want - user doesn't exist
            }
            Err(e) => {
                return Err(Error::DatabaseError(e));
            }
        }

        let password_hash = generate_hash(creds.password);

        tracing::debug!("registering new user: {:?}", creds.email);

        let new_user = NewUser::new(creds.email, password_hash, creds.name);
        let user = self.db.create_user(new_user)?;

        tracing::info!("registered new user: {:?} {:?}", user.email, user.uuid);

        Ok(user)
    }

    async fn authenticate_user(
        &self,
        user_email: String,
        user_password: String,
    ) -> Result<Option<User>, Error> {
        let user = self.db.get_user_by_email(&user_email)?;

        // Verifying the password is blocking and potentially slow, so we'll do so via
        // `spawn_blocking`.
        let password_hash = user.password_hash.clone();
        let res =
            task::spawn_blocking(move || verify_password(user_password, &password_hash)).await?;

        match res {
            Ok(_) => Ok(Some(user)),
            Err(_) => Ok(None),
        }
    }

    async fn get_user(&self, user_uuid: Uuid) -> Result<User, Error> {
        let user = self
            .db
            .get_user_by_uuid(user_uuid)
            .map_err(|_| Error::UserNotFound)?;
        Ok(user)
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file
    dotenv::dotenv().ok();

    let app_mode = std::env::var("APP_MODE")
        .unwrap_or_else(|_| "local".to_string())
        .parse::<AppMode>()
        .expect("Invalid APP_MODE");

    tracing_subscriber::registry()
        .with(EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(
            |_| "memora_backend=debug,tower_http=debug".into(),
        )))
        .with(tracing_subscriber::fmt::layer().with_ansi(false))
        .try_init()?;

    let pg_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let db = setup_db(pg_url);

    let jwt_secret = std::env::var("JWT_SECRET").expect("JWT_SECRET must be set");
    let jwt_secret = hex::decode(jwt_secret).expect("JWT_SECRET must be hex");

    let app_state = AppStateBuilder::default()
        .app_mode(app_mode.clone())
        .db(db)
        .jwt_secret(jwt_secret)
        .resend_api_key(env::var("RESEND_API_KEY").ok())
        .backend_url(env::var("BACKEND_URL").ok())
        .stripe_secret_key(env::var("STRIPE_SECRET_KEY").ok())
        .paystack_secret_key(env::var("PAYSTACK_SECRET_KEY").ok())
        .flutterwave_secret_key(env::var("FLUTTERWAVE_SECRET_KEY").ok())
        .paypal_client_id(env::var("PAYPAL_CLIENT_ID").ok())
        .paypal_client_secret(env::var("PAYPAL_CLIENT_SECRET").ok())
        .google_drive_client_id(env::var("GOOGLE_DRIVE_CLIENT_ID").ok())
        .google_drive_client_secret(env::var("GOOGLE_DRIVE_CLIENT_SECRET").ok())
        .dropbox_client_id(env::var("DROPBOX_CLIENT_ID").ok())
        .dropbox_client_secret(env::var("DROPBOX_CLIENT_SECRET").ok())
        .build()
        .await?;
    tracing::info!("App state created, app_mode: {:?}", app_mode);

    let app_state = Arc::new(app_state);

    // Expired guest tokens accumulate until someone clears them; do so on a
    // timer rather than on the request path.
    let cleanup_db = app_state.db.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(GUEST_TOKEN_SWEEP_INTERVAL).await;
            match cleanup_db.delete_expired_guest_tokens() {
                Ok(0) => {}
                Ok(removed) => tracing::info!("Removed {} expired guest tokens", removed),
                Err(e) => tracing::error!("Expired guest token cleanup failed: {:?}", e),
            }
        }
    });

    let cors = CorsLayer::new()
        // allow `GET` and `POST` when accessing the resource
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        // allow all headers
        .allow_headers(Any)
        // allow requests from any origin
        .allow_origin(Any);

    let app = project_routes(app_state.clone())
        .route_layer(from_fn_with_state(app_state.clone(), validate_jwt))
        .merge(
            phase_routes(app_state.clone())
                .route_layer(from_fn_with_state(app_state.clone(), validate_jwt)),
        )
        .merge(
            billing_routes(app_state.clone())
                .route_layer(from_fn_with_state(app_state.clone(), validate_jwt)),
        )
        .merge(
            import_authorize_routes(app_state.clone())
                .route_layer(from_fn_with_state(app_state.clone(), validate_jwt)),
        )
        .merge(health_routes(app_state.clone()))
        .merge(login_routes(app_state.clone()))
        .merge(guest_routes(app_state.clone()))
        .merge(import_routes(app_state.clone()))
        .merge(webhook_routes(app_state.clone()))
        .layer(cors);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;

    tracing::info!("Listening on http://localhost:3000");

    Ok(axum::serve(listener, app.into_make_service()).await?)
}
