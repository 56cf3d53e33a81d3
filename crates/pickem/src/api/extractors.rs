use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use log::{debug, error, warn};
use serde_json::json;
use std::sync::Arc;

use crate::{
    domain::{Error, User},
    startup::AppState,
};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing identity header {0}")]
    MissingIdentity(String),
    #[error("identity header is not valid text")]
    InvalidIdentity,
    #[error("user is not registered")]
    NotRegistered,
    #[error("failed to look up user: {0}")]
    Lookup(String),
    #[error("missing or wrong admin key")]
    AdminKeyRejected,
    #[error("operator routes are disabled, no admin key is configured")]
    AdminDisabled,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            AuthError::MissingIdentity(_) | AuthError::InvalidIdentity => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED")
            }
            AuthError::NotRegistered => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            AuthError::AdminKeyRejected => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AuthError::AdminDisabled => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AuthError::Lookup(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };
        let body = Json(json!({
            "error": code,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

/// External user id passed along by the upstream auth proxy
#[derive(Debug, Clone)]
pub struct ExternalId(pub String);

impl FromRequestParts<Arc<AppState>> for ExternalId {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(state.identity_header.as_str())
            .ok_or_else(|| AuthError::MissingIdentity(state.identity_header.clone()))?;
        let external_id = value
            .to_str()
            .map_err(|_| AuthError::InvalidIdentity)?
            .trim();
        if external_id.is_empty() {
            return Err(AuthError::MissingIdentity(state.identity_header.clone()));
        }
        Ok(ExternalId(external_id.to_string()))
    }
}

/// A registered user resolved from the identity header
#[derive(Debug, Clone)]
pub struct UserAuth {
    pub user: User,
}

impl FromRequestParts<Arc<AppState>> for UserAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let ExternalId(external_id) = ExternalId::from_request_parts(parts, state).await?;

        match state
            .sportsbook
            .users
            .get_user_by_external_id(&external_id)
            .await
        {
            Ok(user) => {
                debug!("authenticated {} as user {}", external_id, user.id);
                Ok(UserAuth { user })
            }
            Err(Error::UserNotFound(_)) => Err(AuthError::NotRegistered),
            Err(e) => {
                error!("failed to look up user {}: {}", external_id, e);
                Err(AuthError::Lookup(e.to_string()))
            }
        }
    }
}

/// Caller of an operator route: matchup feed, settlement, rollover and squad
/// setup. The admin header must carry the configured shared secret.
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth;

impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_key.as_deref().filter(|key| !key.is_empty()) else {
            warn!("refused {} {}, no admin key configured", parts.method, parts.uri.path());
            return Err(AuthError::AdminDisabled);
        };

        let provided = parts
            .headers
            .get(state.admin_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim);
        if provided != Some(expected) {
            warn!("rejected admin key on {} {}", parts.method, parts.uri.path());
            return Err(AuthError::AdminKeyRejected);
        }

        Ok(AdminAuth)
    }
}
