//! crates/medi_core/src/auth.rs
//!
//! The session holder for one signed-in client. State changes are published on a
//! `watch` channel so other parts of the dashboard can follow the signed-in identity.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{Session, SignUpData};
use crate::error::{Operation, WorkflowError};
use crate::ports::AuthService;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Nothing has been resolved yet.
    Unknown,
    SignedOut,
    SignedIn(Session),
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::SignedIn(session) => Some(session),
            _ => None,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.session().map(|s| s.user_id)
    }
}

pub struct AuthContext {
    auth: Arc<dyn AuthService>,
    state: watch::Sender<SessionState>,
}

impl AuthContext {
    pub fn new(auth: Arc<dyn AuthService>) -> Self {
        let (state, _) = watch::channel(SessionState::Unknown);
        Self { auth, state }
    }

    /// The current state, without checking expiry.
    pub fn session(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpData, WorkflowError> {
        let email = email.to_lowercase();
        let data = self
            .auth
            .sign_up(&email, password)
            .await
            .map_err(|e| Operation::SignUp.fail(e))?;

        if let Some(session) = &data.session {
            self.set(SessionState::SignedIn(session.clone()));
        }
        info!(user_id = %data.user_id, "user signed up");
        Ok(data)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, WorkflowError> {
        let email = email.to_lowercase();
        let session = self
            .auth
            .sign_in(&email, password)
            .await
            .map_err(|e| Operation::SignIn.fail(e))?;

        info!(user_id = %session.user_id, "user signed in");
        self.set(SessionState::SignedIn(session.clone()));
        Ok(session)
    }

    /// Signs out upstream (failures are only logged) and clears the local state.
    pub async fn sign_out(&self) {
        if let SessionState::SignedIn(session) = self.session() {
            if let Err(e) = self.auth.sign_out(&session).await {
                Operation::SignOut.log(&e);
            }
            info!(user_id = %session.user_id, "user signed out");
        }
        self.set(SessionState::SignedOut);
    }

    /// Resolves a previously issued access token, as done once at startup.
    pub async fn restore(&self, access_token: &str) -> SessionState {
        let next = match self.auth.session_for_token(access_token).await {
            Ok(session) => SessionState::SignedIn(session),
            Err(e) => {
                Operation::RestoreSession.log(&e);
                SessionState::SignedOut
            }
        };
        self.set(next.clone());
        next
    }

    /// The current state, refreshing an expired session first.
    pub async fn current(&self) -> SessionState {
        let state = self.session();
        let session = match &state {
            SessionState::SignedIn(session) if session.is_expired(Utc::now()) => session.clone(),
            _ => return state,
        };

        debug!(user_id = %session.user_id, "session expired, refreshing");
        let next = match session.refresh_token.as_deref() {
            Some(token) => match self.auth.refresh(token).await {
                Ok(fresh) => SessionState::SignedIn(fresh),
                Err(e) => {
                    Operation::RefreshSession.log(&e);
                    SessionState::SignedOut
                }
            },
            None => SessionState::SignedOut,
        };
        self.set(next.clone());
        next
    }

    fn set(&self, next: SessionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
