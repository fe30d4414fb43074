use axum::http::{header, HeaderMap};
use serde::Deserialize;
use tracing::debug;

use crate::models::guest_tokens::GuestToken;
use crate::models::phases::{Phase, PhaseStatus};
use crate::{ApiError, AppState};

/// How the caller intends to touch the phase. Completed phases stay readable
/// so guests can revisit their picks, but nothing may change anymore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Mutate,
}

/// Query fallback for clients that cannot set headers (e.g. direct download
/// links in emails).
#[derive(Debug, Deserialize)]
pub struct GuestTokenQuery {
    pub guest_token: Option<String>,
}

/// A validated guest session: the token row and the phase it grants.
#[derive(Debug, Clone)]
pub struct GuestAccess {
    pub token: GuestToken,
    pub phase: Phase,
}

/// Pulls the guest token out of a request, in precedence order: bearer
/// header, then `X-Guest-Token`, then the `guest_token` query parameter.
pub fn extract_guest_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    {
        return Some(token.to_string());
    }

    if let Some(token) = headers
        .get("X-Guest-Token")
        .and_then(|value| value.to_str().ok())
    {
        return Some(token.to_string());
    }

    query_token.map(ToString::to_string)
}

/// Gate on the phase lifecycle. Draft phases are invisible to guests; active
/// phases allow everything; completed phases allow reads only.
pub fn check_phase_access(status: PhaseStatus, mode: AccessMode) -> Result<(), ApiError> {
    match (status, mode) {
        (PhaseStatus::Draft, _) => Err(ApiError::PhaseNotAccessible),
        (PhaseStatus::Completed, AccessMode::Mutate) => Err(ApiError::PhaseNotAccessible),
        _ => Ok(()),
    }
}

/// Resolves a request's guest token against the phase it is trying to reach.
///
/// A token that does not exist or has expired reads as "nothing here", the
/// same as a phase that never existed. A live token for a different phase is
/// an authorization failure instead, so clients can tell the two apart.
pub async fn resolve_guest_access(
    data: &AppState,
    headers: &HeaderMap,
    query_token: Option<&str>,
    phase: Phase,
    mode: AccessMode,
) -> Result<GuestAccess, ApiError> {
    let token_value =
        extract_guest_token(headers, query_token).ok_or(ApiError::GuestTokenMissing)?;

    let token = data
        .db
        .get_guest_token(&token_value)
        .map_err(|e| {
            tracing::error!("Failed to look up guest token: {:?}", e);
            ApiError::InternalServerError
        })?
        .ok_or(ApiError::NotFound)?;

    if token.is_expired() {
        debug!("Guest token expired");
        return Err(ApiError::NotFound);
    }

    if token.phase_id != phase.id {
        debug!("Guest token presented for the wrong phase");
        return Err(ApiError::InvalidGuestToken);
    }

    check_phase_access(phase.status(), mode)?;

    // A token consumed by phase completion keeps read access but can no
    // longer change anything.
    if mode == AccessMode::Mutate && token.used_at.is_some() {
        debug!("Used guest token attempted a mutation");
        return Err(ApiError::PhaseNotAccessible);
    }

    Ok(GuestAccess { token, phase })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn bearer_header_wins_over_everything() {
        let map = headers(&[
            ("authorization", "Bearer from-bearer"),
            ("x-guest-token", "from-header"),
        ]);
        assert_eq!(
            extract_guest_token(&map, Some("from-query")),
            Some("from-bearer".to_string())
        );
    }

    #[test]
    fn guest_header_wins_over_query() {
        let map = headers(&[("x-guest-token", "from-header")]);
        assert_eq!(
            extract_guest_token(&map, Some("from-query")),
            Some("from-header".to_string())
        );
    }

    #[test]
    fn query_is_the_last_resort() {
        let map = headers(&[]);
        assert_eq!(
            extract_guest_token(&map, Some("from-query")),
            Some("from-query".to_string())
        );
    }

    #[test]
    fn nothing_means_none() {
        let map = headers(&[]);
        assert_eq!(extract_guest_token(&map, None), None);
    }

    #[test]
    fn malformed_authorization_falls_through() {
        let map = headers(&[
            ("authorization", "Basic dXNlcjpwYXNz"),
            ("x-guest-token", "from-header"),
        ]);
        assert_eq!(
            extract_guest_token(&map, None),
            Some("from-header".to_string())
        );
    }

    #[test]
    fn draft_phases_are_never_accessible() {
        assert!(check_phase_access(PhaseStatus::Draft, AccessMode::Read).is_err());
        assert!(check_phase_access(PhaseStatus::Draft, AccessMode::Mutate).is_err());
    }

    #[test]
    fn active_phases_allow_everything() {
        assert!(check_phase_access(PhaseStatus::Active, AccessMode::Read).is_ok());
        assert!(check_phase_access(PhaseStatus::Active, AccessMode::Mutate).is_ok());
    }

    #[test]
    fn completed_phases_are_read_only() {
        assert!(check_phase_access(PhaseStatus::Completed, AccessMode::Read).is_ok());
        assert!(check_phase_access(PhaseStatus::Completed, AccessMode::Mutate).is_err());
    }
}
