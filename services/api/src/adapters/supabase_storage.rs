//! services/api/src/adapters/supabase_storage.rs
//!
//! Implements the `ObjectStorage` port against the Supabase Storage REST API.
//! Every call is made with the signed-in user's token so bucket policies apply.

use async_trait::async_trait;
use bytes::Bytes;
use medi_core::domain::Session;
use medi_core::ports::{ObjectStorage, PortResult};
use reqwest::{header, Method};
use serde_json::json;

use super::supabase::{check, transport, SupabaseEndpoint};

#[derive(Clone)]
pub struct SupabaseStorageAdapter {
    endpoint: SupabaseEndpoint,
}

impl SupabaseStorageAdapter {
    pub fn new(endpoint: SupabaseEndpoint) -> Self {
        Self { endpoint }
    }
}

fn object_path(bucket: &str, path: &str) -> String {
    format!("/storage/v1/object/{}/{}", bucket, path.trim_start_matches('/'))
}

#[async_trait]
impl ObjectStorage for SupabaseStorageAdapter {
    async fn upload(
        &self,
        session: &Session,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> PortResult<()> {
        let response = self
            .endpoint
            .request(
                Method::POST,
                &object_path(bucket, path),
                Some(&session.access_token),
            )
            .header(
                header::CONTENT_TYPE,
                content_type.unwrap_or("application/octet-stream"),
            )
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(transport)?;
        check(response).await?;
        Ok(())
    }

    async fn download(&self, session: &Session, bucket: &str, path: &str) -> PortResult<Bytes> {
        let response = self
            .endpoint
            .request(
                Method::GET,
                &object_path(bucket, path),
                Some(&session.access_token),
            )
            .send()
            .await
            .map_err(transport)?;
        check(response).await?.bytes().await.map_err(transport)
    }

    async fn remove(&self, session: &Session, bucket: &str, path: &str) -> PortResult<()> {
        let response = self
            .endpoint
            .request(
                Method::DELETE,
                &format!("/storage/v1/object/{}", bucket),
                Some(&session.access_token),
            )
            .json(&json!({ "prefixes": [path] }))
            .send()
            .await
            .map_err(transport)?;
        check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_paths_are_bucket_relative() {
        assert_eq!(object_path("pdfs", "a1b2.pdf"), "/storage/v1/object/pdfs/a1b2.pdf");
        assert_eq!(object_path("avatars", "/me.png"), "/storage/v1/object/avatars/me.png");
    }
}
