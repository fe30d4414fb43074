use crate::Error;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::IntoResponse,
};
use chrono::Duration;
use jwt_compact::{alg::Es256k, prelude::*, AlgorithmExt};
use secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::{ApiError, AppState, User};

pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    fn audience(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewToken {
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct JwtKeys {
    signing_key: SecretKey,
    secp: Secp256k1<All>,
}

impl JwtKeys {
    pub fn new(secret_bytes: Vec<u8>) -> Result<Self, Error> {
        if secret_bytes.len() < 32 {
            return Err(Error::SecretParsingError);
        }
        let secp = Secp256k1::new();
        let signing_key =
            SecretKey::from_slice(&secret_bytes[..32]).map_err(|_| Error::SecretParsingError)?;

        Ok(Self { signing_key, secp })
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_secret_key(&self.secp, &self.signing_key)
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct CustomClaims {
    pub sub: String,
    pub aud: String,
}

impl NewToken {
    pub fn new(user: &User, token_type: TokenType, app_state: &AppState) -> Result<Self, ApiError> {
        let duration = match token_type {
            TokenType::Access => Duration::minutes(app_state.config.access_token_maxage),
            TokenType::Refresh => Duration::days(app_state.config.refresh_token_maxage),
        };

        let custom_claims = CustomClaims {
            sub: user.uuid.to_string(),
            aud: token_type.audience().to_string(),
        };

        tracing::debug!("Creating new token with claims: {:?}", custom_claims);

        let time_options = TimeOptions::default();
        let claims = Claims::new(custom_claims).set_duration_and_issuance(&time_options, duration);

        let header = Header::empty().with_token_type("JWT");

        let es256k = Es256k::<Sha256>::new(app_state.config.jwt_keys.secp.clone());

        let token_string = es256k
            .token(&header, &claims, &app_state.config.jwt_keys.signing_key)
            .map_err(|e| {
                tracing::error!("Error creating token: {:?}", e);
                ApiError::InternalServerError
            })?;

        Ok(Self {
            token: token_string,
        })
    }
}

/// Middleware for owner routes. Resolves the bearer token to a `User` and
/// stashes it in request extensions for handlers to pick up.
pub async fn validate_jwt(
    State(data): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> impl IntoResponse {
    let token = match req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|auth_header| auth_header.to_str().ok())
        .and_then(|auth_value| auth_value.strip_prefix("Bearer ").map(ToString::to_string))
    {
        Some(token) => token,
        None => return ApiError::InvalidJwt.into_response(),
    };

    let claims = match validate_token(&token, &data, "access") {
        Ok(claims) => claims,
        Err(_) => return ApiError::InvalidJwt.into_response(),
    };

    let user_uuid: Uuid = match Uuid::parse_str(&claims.sub) {
        Ok(uuid) => uuid,
        Err(e) => {
            tracing::error!("Error parsing user uuid: {:?}", e);
            return ApiError::InvalidJwt.into_response();
        }
    };

    let user = match data.get_user(user_uuid).await {
        Ok(user) => user,
        Err(e) => {
            tracing::error!("Error getting user: {:?}", e);
            return ApiError::InvalidJwt.into_response();
        }
    };

    req.extensions_mut().insert(user);
    next.run(req).await
}

pub(crate) fn validate_token(
    original_token: &str,
    data: &AppState,
    expected_audience: &str,
) -> Result<CustomClaims, ApiError> {
    let es256k = Es256k::<Sha256>::new(data.config.jwt_keys.secp.clone());
    let public_key = data.config.jwt_keys.public_key();

    let parsed_token = match UntrustedToken::new(original_token) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("Failed to parse token: {:?}", e);
            return Err(ApiError::InvalidJwt);
        }
    };

    let token: Token<CustomClaims> = match es256k.validator(&public_key).validate(&parsed_token) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("Token signature validation failed: {:?}", e);
            return Err(ApiError::InvalidJwt);
        }
    };

    // Only validate expiration, not maturity
    let time_options = TimeOptions::default();
    if let Err(e) = token.claims().validate_expiration(&time_options) {
        tracing::error!("Token expired: {:?}", e);
        return Err(ApiError::InvalidJwt);
    }

    let claims: &Claims<CustomClaims> = token.claims();
    if claims.custom.aud != expected_audience {
        tracing::error!(
            "Invalid audience: got {}, expected {}",
            claims.custom.aud,
            expected_audience
        );
        return Err(ApiError::InvalidJwt);
    }

    Ok(claims.custom.clone())
}
