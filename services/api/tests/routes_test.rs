//! HTTP tests for the router, driven through `tower::ServiceExt::oneshot`
//! against the in-memory ports.

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use medi_api::web::{router, state::AppState};
use medi_core::testing::Backend;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "medi-test-boundary";

struct TestApp {
    backend: Backend,
    state: Arc<AppState>,
    router: Router,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestResponse {
    /// The `medi_session=...` pair from the Set-Cookie header.
    fn cookie(&self) -> String {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .expect("response sets a cookie")
            .to_string()
    }
}

impl TestApp {
    fn new() -> Self {
        let backend = Backend::new();
        backend.auth.register("pat@example.com", "secret");
        let state = Arc::new(AppState::new(backend.services()));
        let router = router(state.clone());
        Self {
            backend,
            state,
            router,
        }
    }

    async fn send(&self, req: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        TestResponse {
            status,
            headers,
            body,
        }
    }

    async fn json(&self, method: Method, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut req = Request::builder().method(Method::GET).uri(uri);
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    async fn post_empty(&self, uri: &str, cookie: &str) -> TestResponse {
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    async fn sign_in(&self) -> String {
        let response = self
            .json(
                Method::POST,
                "/signin",
                None,
                json!({ "email": "Pat@Example.com", "password": "secret" }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
        response.cookie()
    }

    async fn upload(&self, cookie: &str, file_name: &str, content_type: &str) -> TestResponse {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: {content_type}\r\n\r\n%PDF-1.7 test\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"clinic_name\"\r\n\r\nRiverside Clinic\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"type_of_visit\"\r\n\r\nDermatology\r\n\
             --{b}--\r\n",
            b = BOUNDARY
        );
        let req = Request::builder()
            .method(Method::POST)
            .uri("/visits")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::COOKIE, cookie)
            .body(Body::from(body))
            .unwrap();
        self.send(req).await
    }
}

#[tokio::test]
async fn dashboard_is_refused_without_a_session() {
    let app = TestApp::new();

    let response = app.get("/dashboard", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = app.get("/dashboard", Some("medi_session=unknown")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(app.backend.log.entries().is_empty());
}

#[tokio::test]
async fn dashboard_is_served_with_a_session() {
    let app = TestApp::new();
    let cookie = app.sign_in().await;

    let response = app.get("/dashboard", Some(&cookie)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["email"], "pat@example.com");
    assert_eq!(response.body["visits"], json!([]));
    assert_eq!(response.body["summary"]["status"], "ready");
    assert_eq!(
        response.body["summary"]["displayed"],
        "Add a Document to Get Started"
    );
}

#[tokio::test]
async fn bad_credentials_are_rejected() {
    let app = TestApp::new();
    let response = app
        .json(
            Method::POST,
            "/signin",
            None,
            json!({ "email": "pat@example.com", "password": "wrong" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body, "Invalid login credentials");
    assert!(app.state.sessions.is_empty());
}

#[tokio::test]
async fn upload_translate_toggle_and_delete() {
    let app = TestApp::new();
    let cookie = app.sign_in().await;

    let response = app.upload(&cookie, "SkinCheck.pdf", "application/pdf").await;
    assert_eq!(response.status, StatusCode::CREATED);
    let visit = &response.body["visit"];
    assert_eq!(visit["summary"], "Visit regarding Skin Check.");
    assert_eq!(visit["clinic_name"], "Riverside Clinic");
    let id = visit["id"].as_str().unwrap().to_string();
    assert_eq!(response.body["visits"].as_array().unwrap().len(), 1);

    let response = app
        .json(
            Method::POST,
            &format!("/visits/{id}/translate"),
            Some(&cookie),
            json!({ "language": "Spanish" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.body["displayed_summary"],
        "(Spanish) Visit regarding Skin Check."
    );
    assert_eq!(response.body["summary"], "Visit regarding Skin Check.");
    assert_eq!(response.body["toggle_label"], "Show Original");

    let response = app.post_empty(&format!("/visits/{id}/toggle"), &cookie).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["displayed_summary"], "Visit regarding Skin Check.");
    assert_eq!(response.body["toggle_label"], "Show Spanish");

    let response = app.get(&format!("/visits/{id}/download"), Some(&cookie)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.headers.get(header::CONTENT_TYPE).unwrap(),
        "application/pdf"
    );

    let req = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/visits/{id}"))
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.send(req).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!([]));
    assert!(app.backend.storage.is_empty());
    assert!(app.backend.db.visits().is_empty());
}

#[tokio::test]
async fn non_pdf_uploads_are_rejected() {
    let app = TestApp::new();
    let cookie = app.sign_in().await;

    let response = app.upload(&cookie, "notes.txt", "text/plain").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body, "Only PDF documents can be uploaded.");
    assert!(app.backend.db.visits().is_empty());
}

#[tokio::test]
async fn unknown_visit_is_not_found() {
    let app = TestApp::new();
    let cookie = app.sign_in().await;

    let response = app
        .post_empty(&format!("/visits/{}/toggle", uuid::Uuid::new_v4()), &cookie)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .get(&format!("/visits/{}/download", uuid::Uuid::new_v4()), Some(&cookie))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn summary_translation_round_trip() {
    let app = TestApp::new();
    let cookie = app.sign_in().await;

    let response = app.get("/summary", Some(&cookie)).await;
    assert_eq!(response.body["text"], "Add a Document to Get Started");

    let response = app
        .json(
            Method::POST,
            "/summary/translate",
            Some(&cookie),
            json!({ "language": "  " }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .json(
            Method::POST,
            "/summary/translate",
            Some(&cookie),
            json!({ "language": "French" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.body["displayed"],
        "(French) Add a Document to Get Started"
    );
    assert_eq!(response.body["toggle_label"], "Show English");

    let response = app.post_empty("/summary/toggle", &cookie).await;
    assert_eq!(response.body["displayed"], "Add a Document to Get Started");
    assert_eq!(response.body["toggle_label"], "Show French");
}

#[tokio::test]
async fn profile_is_saved_and_reloaded() {
    let app = TestApp::new();
    let cookie = app.sign_in().await;

    let response = app
        .json(
            Method::PUT,
            "/profile",
            Some(&cookie),
            json!({ "name": " Pat Doe ", "birthday": "1990-04-02", "height": 172.5 }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["name"], "Pat Doe");

    let response = app.get("/profile", Some(&cookie)).await;
    assert_eq!(response.body["name"], "Pat Doe");
    assert_eq!(response.body["birthday"], "1990-04-02");

    let response = app
        .json(Method::PUT, "/profile", Some(&cookie), json!({ "weight": -3.0 }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sign_out_ends_the_session() {
    let app = TestApp::new();
    let cookie = app.sign_in().await;

    let response = app.post_empty("/signout", &cookie).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(app.state.sessions.is_empty());

    let response = app.get("/visits", Some(&cookie)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bearer_token_restores_a_session() {
    let app = TestApp::new();
    let session = app.backend.signed_in("returning@example.com").await;

    let req = Request::builder()
        .method(Method::GET)
        .uri("/visits")
        .header(header::AUTHORIZATION, format!("Bearer {}", session.access_token))
        .body(Body::empty())
        .unwrap();
    let response = app.send(req).await;

    assert_eq!(response.status, StatusCode::OK);
    let cookie = response.cookie();
    assert!(cookie.starts_with("medi_session="));

    let response = app.get("/", Some(&cookie)).await;
    assert_eq!(response.body["signed_in_as"], "returning@example.com");
}

#[tokio::test]
async fn signup_awaiting_confirmation_sets_no_cookie() {
    let app = TestApp::new();
    app.backend.auth.set_require_confirmation(true);

    let response = app
        .json(
            Method::POST,
            "/signup",
            None,
            json!({ "email": "new@example.com", "password": "pw" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["confirmation_required"], true);
    assert!(response.headers.get(header::SET_COOKIE).is_none());
    assert!(app.state.sessions.is_empty());
}

#[tokio::test]
async fn next_user_on_the_same_browser_starts_clean() {
    let app = TestApp::new();
    let cookie = app.sign_in().await;
    let response = app.upload(&cookie, "HivTreatment.pdf", "application/pdf").await;
    assert_eq!(response.status, StatusCode::CREATED);
    let response = app.get("/summary", Some(&cookie)).await;
    assert_eq!(
        response.body["text"],
        "Patient history: Visit regarding Hiv Treatment."
    );

    app.backend.auth.register("sam@example.com", "pw");
    let response = app
        .json(
            Method::POST,
            "/signin",
            Some(&cookie),
            json!({ "email": "sam@example.com", "password": "pw" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(app.state.sessions.len(), 1);

    let response = app
        .json(
            Method::POST,
            "/summary/translate",
            Some(&cookie),
            json!({ "language": "French" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(!response.body.to_string().contains("Hiv"));

    let response = app.get("/summary", Some(&cookie)).await;
    assert_eq!(response.body["text"], "Add a Document to Get Started");
    let response = app.get("/visits", Some(&cookie)).await;
    assert_eq!(response.body, json!([]));
}

#[tokio::test]
async fn bearer_requests_share_one_view() {
    let app = TestApp::new();
    let session = app.backend.signed_in("client@example.com").await;

    let mut cookies = Vec::new();
    for _ in 0..5 {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/visits")
            .header(header::AUTHORIZATION, format!("Bearer {}", session.access_token))
            .body(Body::empty())
            .unwrap();
        let response = app.send(req).await;
        assert_eq!(response.status, StatusCode::OK);
        cookies.push(response.cookie());
    }

    assert_eq!(app.state.sessions.len(), 1);
    assert!(cookies.iter().all(|c| c == &cookies[0]));
}

#[tokio::test]
async fn expired_bearer_token_is_refused() {
    let app = TestApp::new();
    app.backend.auth.set_lifetime(chrono::Duration::seconds(-1));
    let session = app.backend.signed_in("late@example.com").await;

    let req = Request::builder()
        .method(Method::GET)
        .uri("/visits")
        .header(header::AUTHORIZATION, format!("Bearer {}", session.access_token))
        .body(Body::empty())
        .unwrap();
    let response = app.send(req).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(app.state.sessions.is_empty());
}
