//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for sign-up, sign-in and sign-out, and the session
//! cookie that ties a browser to its dashboard view.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use medi_core::domain::Session;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::rest::reject;
use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "medi_session";
const SESSION_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

/// The dashboard key carried by the request's session cookie, if any.
pub fn session_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| {
            c.trim()
                .strip_prefix(SESSION_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
        })
        .filter(|key| !key.is_empty())
}

pub fn session_cookie(key: &str) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, key, SESSION_MAX_AGE_SECS
    )
}

fn cleared_cookie() -> String {
    format!("{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE)
}

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    /// True when the account exists but the address still has to be confirmed.
    pub confirmation_required: bool,
}

impl AuthResponse {
    fn signed_in(session: &Session) -> Self {
        Self {
            user_id: session.user_id,
            email: session.email.clone(),
            confirmation_required: false,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /signup - Create a new account
#[utoipa::path(
    post,
    path = "/signup",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 401, description = "Sign-up refused by the auth service")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let dashboard = state.open_dashboard();
    let data = dashboard
        .sign_up(&req.email, &req.password)
        .await
        .map_err(reject)?;

    let response = AuthResponse {
        user_id: data.user_id,
        email: data.email.clone(),
        confirmation_required: data.session.is_none(),
    };

    // Without a session there is nothing to keep; the view is dropped here.
    let mut response_headers = HeaderMap::new();
    if data.session.is_some() {
        let key = state.sessions.insert(dashboard);
        if let Ok(cookie) = session_cookie(&key).parse() {
            response_headers.insert(header::SET_COOKIE, cookie);
        }
    }

    Ok((StatusCode::CREATED, response_headers, Json(response)))
}

/// POST /signin - Sign in with email and password
#[utoipa::path(
    post,
    path = "/signin",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn signin_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // A browser that already has a view keeps it; a different identity resets it.
    let existing = session_key(&headers).and_then(|key| {
        state
            .sessions
            .get(key)
            .map(|dashboard| (key.to_string(), dashboard))
    });
    let (key, dashboard) = match existing {
        Some((key, dashboard)) => (Some(key), dashboard),
        None => (None, state.open_dashboard()),
    };

    let session = dashboard
        .sign_in(&req.email, &req.password)
        .await
        .map_err(reject)?;

    let key = match key {
        Some(key) => key,
        None => state.sessions.insert(dashboard),
    };

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(&key))],
        Json(AuthResponse::signed_in(&session)),
    ))
}

/// POST /signout - Sign out and discard the dashboard view
#[utoipa::path(
    post,
    path = "/signout",
    responses(
        (status = 204, description = "Signed out")
    )
)]
pub async fn signout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Some(dashboard) = session_key(&headers).and_then(|key| state.sessions.remove(key)) {
        dashboard.sign_out().await;
    } else {
        info!("sign-out without an active session");
    }
    (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cleared_cookie())])
}
