//! services/api/src/adapters/supabase.rs
//!
//! The connection details shared by the Supabase auth and storage adapters, and
//! the mapping of their error responses into `PortError`.

use medi_core::ports::PortError;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

/// Base URL, anon key and a pooled HTTP client for one Supabase project.
#[derive(Clone)]
pub struct SupabaseEndpoint {
    http: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseEndpoint {
    pub fn new(http: Client, base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A request carrying the project's `apikey`. Without a user token the anon key
    /// doubles as the bearer.
    pub fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        access_token: Option<&str>,
    ) -> RequestBuilder {
        let bearer = access_token.unwrap_or(&self.anon_key);
        self.http
            .request(method, self.url(path))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }
}

/// The error body shapes the auth and storage APIs use.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn text(self) -> Option<String> {
        self.msg
            .or(self.error_description)
            .or(self.message)
            .or(self.error)
    }
}

pub fn transport(e: reqwest::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Passes a successful response through; anything else becomes a `PortError`.
pub async fn check(response: Response) -> Result<Response, PortError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::text)
        .unwrap_or_else(|| format!("status {}", status));
    Err(map_status(status, message))
}

fn map_status(status: StatusCode, message: String) -> PortError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized,
        StatusCode::NOT_FOUND => PortError::NotFound(message),
        s if s.is_client_error() => PortError::Rejected(message),
        _ => PortError::Unexpected(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_bodies_prefer_the_human_message() {
        let body: ErrorBody = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        )
        .unwrap();
        assert_eq!(body.text().as_deref(), Some("Invalid login credentials"));

        let body: ErrorBody =
            serde_json::from_str(r#"{"code":422,"msg":"User already registered"}"#).unwrap();
        assert_eq!(body.text().as_deref(), Some("User already registered"));
    }

    #[test]
    fn statuses_map_to_port_errors() {
        assert!(matches!(
            map_status(StatusCode::BAD_REQUEST, "bad".into()),
            PortError::Rejected(m) if m == "bad"
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, "no".into()),
            PortError::Unauthorized
        ));
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, "gone".into()),
            PortError::NotFound(_)
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, "down".into()),
            PortError::Unexpected(_)
        ));
    }

    #[test]
    fn urls_do_not_double_slashes() {
        let endpoint = SupabaseEndpoint::new(Client::new(), "https://x.supabase.co/", "anon");
        assert_eq!(endpoint.url("/auth/v1/user"), "https://x.supabase.co/auth/v1/user");
    }
}
