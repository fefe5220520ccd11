//! services/api/src/adapters/supabase_auth.rs
//!
//! Implements the `AuthService` port against the Supabase Auth REST API.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use medi_core::domain::{Session, SignUpData};
use medi_core::ports::{AuthService, PortError, PortResult};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::supabase::{check, transport, SupabaseEndpoint};

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Debug, Deserialize)]
struct UserBody {
    id: Uuid,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: UserBody,
}

/// Sign-up answers with a session, or with the bare user while the address
/// awaits confirmation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpBody {
    Session(SessionBody),
    User(UserBody),
}

impl SessionBody {
    fn to_domain(self, fallback_email: &str) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .or_else(|| self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)));
        Session {
            user_id: self.user.id,
            email: self.user.email.unwrap_or_else(|| fallback_email.to_string()),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccessClaims {
    exp: i64,
}

/// Reads the `exp` claim of an access token. The signature is not checked here;
/// the token has just been accepted by `/auth/v1/user`.
fn token_expiry(access_token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    let data = decode::<AccessClaims>(access_token, &DecodingKey::from_secret(&[]), &validation)
        .ok()?;
    DateTime::<Utc>::from_timestamp(data.claims.exp, 0)
}

/// A session rebuilt from a bare access token. There is no refresh token, so it
/// ends when the token does. A token without a readable expiry counts as expired.
fn restored_session(user: UserBody, access_token: &str) -> Session {
    Session {
        user_id: user.id,
        email: user.email.unwrap_or_default(),
        access_token: access_token.to_string(),
        refresh_token: None,
        expires_at: Some(token_expiry(access_token).unwrap_or_else(Utc::now)),
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct SupabaseAuthAdapter {
    endpoint: SupabaseEndpoint,
}

impl SupabaseAuthAdapter {
    pub fn new(endpoint: SupabaseEndpoint) -> Self {
        Self { endpoint }
    }

    async fn token(&self, grant_type: &str, body: serde_json::Value) -> PortResult<SessionBody> {
        let response = self
            .endpoint
            .request(
                Method::POST,
                &format!("/auth/v1/token?grant_type={grant_type}"),
                None,
            )
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        check(response).await?.json().await.map_err(transport)
    }
}

//=========================================================================================
// `AuthService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthService for SupabaseAuthAdapter {
    async fn sign_up(&self, email: &str, password: &str) -> PortResult<SignUpData> {
        let response = self
            .endpoint
            .request(Method::POST, "/auth/v1/signup", None)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(transport)?;
        let body: SignUpBody = check(response).await?.json().await.map_err(transport)?;

        Ok(match body {
            SignUpBody::Session(session) => {
                let session = session.to_domain(email);
                SignUpData {
                    user_id: session.user_id,
                    email: session.email.clone(),
                    session: Some(session),
                }
            }
            SignUpBody::User(user) => SignUpData {
                user_id: user.id,
                email: user.email.unwrap_or_else(|| email.to_string()),
                session: None,
            },
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<Session> {
        let body = self
            .token("password", json!({ "email": email, "password": password }))
            .await?;
        Ok(body.to_domain(email))
    }

    async fn sign_out(&self, session: &Session) -> PortResult<()> {
        let response = self
            .endpoint
            .request(Method::POST, "/auth/v1/logout", Some(&session.access_token))
            .send()
            .await
            .map_err(transport)?;
        check(response).await?;
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> PortResult<Session> {
        let body = self
            .token("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
            .map_err(|e| match e {
                // An unknown or reused refresh token is reported as a bad request.
                PortError::Rejected(_) => PortError::Unauthorized,
                other => other,
            })?;
        Ok(body.to_domain(""))
    }

    async fn session_for_token(&self, access_token: &str) -> PortResult<Session> {
        let response = self
            .endpoint
            .request(Method::GET, "/auth/v1/user", Some(access_token))
            .send()
            .await
            .map_err(transport)?;
        let user: UserBody = check(response).await?.json().await.map_err(transport)?;
        Ok(restored_session(user, access_token))
    }
}
