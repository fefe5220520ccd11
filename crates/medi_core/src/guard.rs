//! crates/medi_core/src/guard.rs
//!
//! Gate for protected content: nothing behind it is produced without a session.

use crate::auth::SessionState;
use crate::domain::Session;

#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    Granted(Session),
    Denied,
}

pub struct RouteGuard;

impl RouteGuard {
    /// `Unknown` is treated exactly like `SignedOut`.
    pub fn check(state: &SessionState) -> Access {
        match state {
            SessionState::SignedIn(session) => Access::Granted(session.clone()),
            SessionState::Unknown | SessionState::SignedOut => Access::Denied,
        }
    }

    /// Builds the protected content only when access is granted.
    pub fn render<T>(state: &SessionState, content: impl FnOnce(&Session) -> T) -> Option<T> {
        match Self::check(state) {
            Access::Granted(session) => Some(content(&session)),
            Access::Denied => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn session() -> Session {
        Session {
            user_id: Uuid::new_v4(),
            email: "pat@example.com".to_string(),
            access_token: "token".to_string(),
            refresh_token: None,
            expires_at: None,
        }
    }

    #[test]
    fn no_session_renders_nothing() {
        let mut built = false;
        let out = RouteGuard::render(&SessionState::SignedOut, |_| {
            built = true;
            "dashboard"
        });
        assert_eq!(out, None);
        assert!(!built);
        assert_eq!(RouteGuard::check(&SessionState::Unknown), Access::Denied);
    }

    #[test]
    fn active_session_renders_content() {
        let session = session();
        let out = RouteGuard::render(&SessionState::SignedIn(session.clone()), |s| s.user_id);
        assert_eq!(out, Some(session.user_id));
    }
}
