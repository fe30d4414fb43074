use crate::cache::TtlCache;
use crate::Error;
use async_trait::async_trait;
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl,
    Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Import handshakes must finish within this window.
pub const IMPORT_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Context carried across the OAuth redirect: who started the import and
/// which set the files should land in.
#[derive(Debug, Clone)]
pub struct ImportState {
    pub user_uuid: Uuid,
    pub set_uuid: Uuid,
}

/// A file discovered in the user's cloud storage. The path keeps the
/// provider scheme so the origin stays readable in media listings.
#[derive(Debug, Clone)]
pub struct ImportedFile {
    pub name: String,
    pub path: String,
}

#[derive(Clone)]
pub struct GoogleDriveProvider {
    pub client: BasicClient,
    http: reqwest::Client,
    state_cache: TtlCache<ImportState>,
}

impl GoogleDriveProvider {
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_url: String,
        state_cache: TtlCache<ImportState>,
    ) -> Result<Self, Error> {
        let auth_url = AuthUrl::new("https://accounts.google.com/o/oauth2/v2/auth".to_string())
            .map_err(|e| Error::OAuthError(format!("Invalid auth URL: {}", e)))?;
        let token_url = TokenUrl::new("https://oauth2.googleapis.com/token".to_string())
            .map_err(|e| Error::OAuthError(format!("Invalid token URL: {}", e)))?;

        let client = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(
            RedirectUrl::new(redirect_url)
                .map_err(|e| Error::OAuthError(format!("Invalid redirect URL: {}", e)))?,
        );

        info!("Google Drive import provider initialized");
        Ok(Self {
            client,
            http: reqwest::Client::new(),
            state_cache,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
}

#[async_trait]
impl ImportProvider for GoogleDriveProvider {
    async fn generate_authorize_url(&self, state: ImportState) -> (String, CsrfToken) {
        let (auth_url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(
                "https://www.googleapis.com/auth/drive.readonly".to_string(),
            ))
            .url();

        self.state_cache
            .insert(csrf_token.secret().clone(), state, IMPORT_STATE_TTL)
            .await;

        (auth_url.to_string(), csrf_token)
    }

    async fn take_state(&self, state: &str) -> Option<ImportState> {
        self.state_cache.take(state).await
    }

    async fn exchange_code(&self, code: String) -> Result<oauth2::AccessToken, Error> {
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| Error::OAuthError(format!("Failed to exchange code: {}", e)))?;

        Ok(token_result.access_token().clone())
    }

    async fn list_files(&self, token: &oauth2::AccessToken) -> Result<Vec<ImportedFile>, Error> {
        let response = self
            .http
            .get("https://www.googleapis.com/drive/v3/files")
            .query(&[
                ("pageSize", "100"),
                ("q", "mimeType contains 'image/'"),
                ("fields", "files(id,name)"),
            ])
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|e| Error::OAuthError(format!("Drive listing failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::OAuthError(format!(
                "Drive listing returned {}",
                response.status()
            )));
        }

        let listing = response
            .json::<DriveFileList>()
            .await
            .map_err(|e| Error::OAuthError(format!("Drive listing parse failed: {}", e)))?;

        Ok(listing
            .files
            .into_iter()
            .map(|file| ImportedFile {
                path: format!("gdrive://{}", file.id),
                name: file.name,
            })
            .collect())
    }
}

#[derive(Clone)]
pub struct DropboxProvider {
    pub client: BasicClient,
    http: reqwest::Client,
    state_cache: TtlCache<ImportState>,
}

impl DropboxProvider {
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_url: String,
        state_cache: TtlCache<ImportState>,
    ) -> Result<Self, Error> {
        let auth_url = AuthUrl::new("https://www.dropbox.com/oauth2/authorize".to_string())
            .map_err(|e| Error::OAuthError(format!("Invalid auth URL: {}", e)))?;
        let token_url = TokenUrl::new("https://api.dropboxapi.com/oauth2/token".to_string())
            .map_err(|e| Error::OAuthError(format!("Invalid token URL: {}", e)))?;

        let client = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(
            RedirectUrl::new(redirect_url)
                .map_err(|e| Error::OAuthError(format!("Invalid redirect URL: {}", e)))?,
        );

        info!("Dropbox import provider initialized");
        Ok(Self {
            client,
            http: reqwest::Client::new(),
            state_cache,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DropboxListing {
    entries: Vec<DropboxEntry>,
}

#[derive(Debug, Deserialize)]
struct DropboxEntry {
    #[serde(rename = ".tag")]
    tag: String,
    name: String,
    path_lower: Option<String>,
}

#[async_trait]
impl ImportProvider for DropboxProvider {
    async fn generate_authorize_url(&self, state: ImportState) -> (String, CsrfToken) {
        let (auth_url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("files.content.read".to_string()))
            .url();

        self.state_cache
            .insert(csrf_token.secret().clone(), state, IMPORT_STATE_TTL)
            .await;

        (auth_url.to_string(), csrf_token)
    }

    async fn take_state(&self, state: &str) -> Option<ImportState> {
        self.state_cache.take(state).await
    }

    async fn exchange_code(&self, code: String) -> Result<oauth2::AccessToken, Error> {
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| Error::OAuthError(format!("Failed to exchange code: {}", e)))?;

        Ok(token_result.access_token().clone())
    }

    async fn list_files(&self, token: &oauth2::AccessToken) -> Result<Vec<ImportedFile>, Error> {
        let response = self
            .http
            .post("https://api.dropboxapi.com/2/files/list_folder")
            .bearer_auth(token.secret())
            .json(&serde_json::json!({ "path": "", "recursive": false }))
            .send()
            .await
            .map_err(|e| Error::OAuthError(format!("Dropbox listing failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::OAuthError(format!(
                "Dropbox listing returned {}",
                response.status()
            )));
        }

        let listing = response
            .json::<DropboxListing>()
            .await
            .map_err(|e| Error::OAuthError(format!("Dropbox listing parse failed: {}", e)))?;

        Ok(listing
            .entries
            .into_iter()
            .filter(|entry| entry.tag == "file")
            .map(|entry| {
                let path = entry
                    .path_lower
                    .unwrap_or_else(|| format!("/{}", entry.name));
                ImportedFile {
                    path: format!("dropbox://{}", path.trim_start_matches('/')),
                    name: entry.name,
                }
            })
            .collect())
    }
}

#[async_trait]
pub trait ImportProvider: Send + Sync {
    async fn generate_authorize_url(&self, state: ImportState) -> (String, CsrfToken);
    async fn take_state(&self, state: &str) -> Option<ImportState>;
    async fn exchange_code(&self, code: String) -> Result<oauth2::AccessToken, Error>;
    async fn list_files(&self, token: &oauth2::AccessToken) -> Result<Vec<ImportedFile>, Error>;
}

pub struct ImportManager {
    providers: HashMap<String, Box<dyn ImportProvider + Send + Sync>>,
}

impl ImportManager {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn add_provider(&mut self, name: String, provider: Box<dyn ImportProvider + Send + Sync>) {
        self.providers.insert(name, provider);
    }

    pub fn get_provider(&self, name: &str) -> Option<&(dyn ImportProvider + Send + Sync)> {
        self.providers.get(name).map(|p| p.as_ref())
    }
}

impl Default for ImportManager {
    fn default() -> Self {
        Self::new()
    }
}
