//! Session extractors.
//!
//! The session token comes from `Authorization: Bearer <token>` or the
//! `session` cookie. A verified session is turned into the stored profile,
//! provisioning it on first sight; roles always come from that profile.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use bt_core::models::User;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session";

fn session_token(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(&parts.headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

async fn resolve_viewer(parts: &Parts, state: &AppState) -> Result<Option<User>, ApiError> {
    let Some(token) = session_token(parts) else {
        return Ok(None);
    };
    let session = match state.identity.verify(&token).await {
        Ok(Some(session)) => session,
        Ok(None) => return Ok(None),
        Err(err) => {
            warn!(error = %err, "session verification failed");
            return Ok(None);
        }
    };
    Ok(Some(state.community.ensure_profile(&session).await?))
}

/// The signed-in user, if any. For pages anyone may read; a profile that
/// cannot be loaded leaves the page readable as a guest.
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match resolve_viewer(parts, state).await {
            Ok(viewer) => Ok(MaybeUser(viewer)),
            Err(err) => {
                warn!(error = %err.0, "profile lookup failed, continuing as guest");
                Ok(MaybeUser(None))
            }
        }
    }
}

/// The signed-in user. Anyone else is sent to the sign-in page (303).
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match resolve_viewer(parts, state).await {
            Ok(Some(user)) => Ok(CurrentUser(user)),
            Ok(None) => Err(Redirect::to(&state.config.auth.sign_in_url).into_response()),
            Err(err) => Err(err.into_response()),
        }
    }
}
