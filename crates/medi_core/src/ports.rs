//! crates/medi_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the hosted backend and the language model behind it.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{NewVisit, Profile, Session, SignUpData, Visit};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The upstream service understood the request and refused it.
    #[error("{0}")]
    Rejected(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> PortResult<SignUpData>;

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<Session>;

    async fn sign_out(&self, session: &Session) -> PortResult<()>;

    /// Exchanges a refresh token for a fresh session.
    async fn refresh(&self, refresh_token: &str) -> PortResult<Session>;

    /// Resolves an access token into the session it belongs to.
    async fn session_for_token(&self, access_token: &str) -> PortResult<Session>;
}

/// Row access for the `profiles` and `visits` tables.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Profiles ---
    async fn get_profile(&self, user_id: Uuid) -> PortResult<Option<Profile>>;

    async fn upsert_profile(&self, profile: &Profile) -> PortResult<Profile>;

    // --- Visits ---
    /// All visits of a user, newest `visit_date` first.
    async fn list_visits(&self, user_id: Uuid) -> PortResult<Vec<Visit>>;

    async fn list_visit_summaries(&self, user_id: Uuid) -> PortResult<Vec<Option<String>>>;

    async fn get_visit(&self, user_id: Uuid, visit_id: Uuid) -> PortResult<Visit>;

    async fn insert_visit(&self, visit: NewVisit) -> PortResult<Visit>;

    async fn delete_visit(&self, user_id: Uuid, visit_id: Uuid) -> PortResult<()>;
}

/// Object storage, addressed by bucket and path. Calls act on behalf of the session's user.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        session: &Session,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> PortResult<()>;

    async fn download(&self, session: &Session, bucket: &str, path: &str) -> PortResult<Bytes>;

    async fn remove(&self, session: &Session, bucket: &str, path: &str) -> PortResult<()>;
}

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Submits a prompt and returns the model's text completion.
    async fn generate(&self, prompt: &str) -> PortResult<String>;
}

//=========================================================================================
// Service Bundle
//=========================================================================================

/// Bucket names used for stored objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buckets {
    pub documents: String,
    pub avatars: String,
}

impl Default for Buckets {
    fn default() -> Self {
        Self {
            documents: "pdfs".to_string(),
            avatars: "avatars".to_string(),
        }
    }
}

/// Every external collaborator the workflows need, created once at startup.
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<dyn AuthService>,
    pub db: Arc<dyn DatabaseService>,
    pub storage: Arc<dyn ObjectStorage>,
    pub llm: Arc<dyn TextGenerationService>,
    pub buckets: Buckets,
}
