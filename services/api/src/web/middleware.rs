//! services/api/src/web/middleware.rs
//!
//! The route guard in front of every dashboard endpoint.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use medi_core::auth::SessionState;
use medi_core::dashboard::Dashboard;
use medi_core::guard::{Access, RouteGuard};
use std::sync::Arc;
use tracing::debug;

use crate::web::auth::{session_cookie, session_key};
use crate::web::state::AppState;

/// Resolves the browser's dashboard view and lets the request through only when
/// it holds a live session.
///
/// The view is found by the session cookie. A request without one may instead
/// present an access token issued earlier (`Authorization: Bearer ...`); the
/// view already opened for that token is reused, or the session is restored
/// into a new one. Either way the response carries the view's cookie.
/// On success the `Arc<Dashboard>` is inserted into the request extensions.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let existing = session_key(req.headers()).and_then(|key| {
        state
            .sessions
            .get(key)
            .map(|dashboard| (key.to_string(), dashboard))
    });

    let (key, dashboard, restored) = match existing {
        Some((key, dashboard)) => (key, dashboard, false),
        None => {
            let token = bearer_token(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;
            let (key, dashboard) = restore(&state, &token).await?;
            (key, dashboard, true)
        }
    };

    match RouteGuard::check(&dashboard.auth().current().await) {
        Access::Granted(_) => {}
        Access::Denied => {
            debug!("dashboard session is no longer valid");
            state.sessions.remove(&key);
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    req.extensions_mut().insert(dashboard);
    let mut response = next.run(req).await;

    if restored {
        if let Ok(cookie) = HeaderValue::from_str(&session_cookie(&key)) {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
    }
    Ok(response)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

async fn restore(state: &AppState, token: &str) -> Result<(String, Arc<Dashboard>), StatusCode> {
    if let Some(found) = state.sessions.find_by_token(token) {
        return Ok(found);
    }
    let dashboard = state.open_dashboard();
    match dashboard.restore(token).await {
        SessionState::SignedIn(_) => {
            let key = state.sessions.insert_for_token(token, dashboard.clone());
            Ok((key, dashboard))
        }
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}
