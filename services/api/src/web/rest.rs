//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the dashboard endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::auth::{self, session_key, AuthResponse, CredentialsRequest};
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use medi_core::dashboard::{Dashboard, Overview};
use medi_core::domain::{DocumentFile, Profile, ProfileUpdate, VisitForm};
use medi_core::error::{ErrorKind, WorkflowError};
use medi_core::guard::RouteGuard;
use medi_core::summary::{AggregateSummary, AggregateView};
use medi_core::visits::{Translation, VisitEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        landing_handler,
        auth::signup_handler,
        auth::signin_handler,
        auth::signout_handler,
        dashboard_handler,
        get_profile_handler,
        save_profile_handler,
        upload_avatar_handler,
        list_visits_handler,
        create_visit_handler,
        download_visit_handler,
        delete_visit_handler,
        translate_visit_handler,
        toggle_visit_handler,
        get_summary_handler,
        translate_summary_handler,
        toggle_summary_handler,
    ),
    components(
        schemas(
            CredentialsRequest,
            AuthResponse,
            LandingResponse,
            OverviewResponse,
            ProfileResponse,
            ProfileRequest,
            VisitResponse,
            UploadResponse,
            TranslationResponse,
            TranslateRequest,
            SummaryResponse,
        )
    ),
    tags(
        (name = "Medi API", description = "Visit documents, AI summaries and translations for one patient.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Turns a workflow failure into the status and message sent to the browser.
pub fn reject(err: WorkflowError) -> (StatusCode, String) {
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if err.is_unauthorized() {
        StatusCode::UNAUTHORIZED
    } else {
        match err.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated | ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Busy | ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Store | ErrorKind::Storage | ErrorKind::Generation => {
                StatusCode::BAD_GATEWAY
            }
        }
    };
    (status, err.user_message())
}

fn bad_multipart(e: impl std::fmt::Display) -> (StatusCode, String) {
    error!("Failed to read multipart data: {}", e);
    (
        StatusCode::BAD_REQUEST,
        format!("Failed to read multipart data: {}", e),
    )
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct LandingResponse {
    pub service: String,
    /// The signed-in address, when the browser already has a session.
    pub signed_in_as: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub name: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub country: Option<String>,
    pub avatar_url: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Profile> for ProfileResponse {
    fn from(p: Profile) -> Self {
        Self {
            id: p.id,
            name: p.name,
            birthday: p.birthday,
            height: p.height,
            weight: p.weight,
            country: p.country,
            avatar_url: p.avatar_url,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ProfileRequest {
    pub name: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub country: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<ProfileRequest> for ProfileUpdate {
    fn from(r: ProfileRequest) -> Self {
        Self {
            name: r.name,
            birthday: r.birthday,
            height: r.height,
            weight: r.weight,
            country: r.country,
            avatar_url: r.avatar_url,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TranslationResponse {
    pub language: String,
    pub text: String,
    pub showing_translation: bool,
}

impl From<Translation> for TranslationResponse {
    fn from(t: Translation) -> Self {
        Self {
            language: t.language,
            text: t.text,
            showing_translation: t.showing_translation,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct VisitResponse {
    pub id: Uuid,
    pub document_url: String,
    pub file_name: String,
    pub clinic_name: String,
    pub type_of_visit: String,
    /// The stored summary, untouched by translation.
    pub summary: Option<String>,
    /// What the summary cell shows right now.
    pub displayed_summary: String,
    pub visit_date: DateTime<Utc>,
    pub translation: Option<TranslationResponse>,
    pub toggle_label: Option<String>,
}

impl From<VisitEntry> for VisitResponse {
    fn from(entry: VisitEntry) -> Self {
        let toggle_label = entry.toggle_label();
        let file_name = entry.visit.file_name().to_string();
        let visit = entry.visit;
        Self {
            id: visit.id,
            document_url: visit.document_url,
            file_name,
            clinic_name: visit.clinic_name,
            type_of_visit: visit.type_of_visit,
            summary: visit.summary,
            displayed_summary: entry.displayed_summary,
            visit_date: visit.visit_date,
            translation: entry.translation.map(TranslationResponse::from),
            toggle_label,
        }
    }
}

fn visit_list(entries: Vec<VisitEntry>) -> Vec<VisitResponse> {
    entries.into_iter().map(VisitResponse::from).collect()
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub visit: VisitResponse,
    pub visits: Vec<VisitResponse>,
}

#[derive(Deserialize, ToSchema)]
pub struct TranslateRequest {
    pub language: String,
}

#[derive(Serialize, ToSchema)]
pub struct SummaryResponse {
    /// One of `loading`, `ready` or `failed`.
    pub status: String,
    /// The generated summary, or the failure message.
    pub text: Option<String>,
    pub displayed: Option<String>,
    pub translation: Option<TranslationResponse>,
    pub toggle_label: Option<String>,
    /// Set when the last translation attempt failed.
    pub error: Option<String>,
}

impl From<AggregateView> for SummaryResponse {
    fn from(view: AggregateView) -> Self {
        let displayed = view.displayed().map(str::to_string);
        let toggle_label = view.toggle_label();
        let (status, text) = match view.summary {
            AggregateSummary::Loading => ("loading", None),
            AggregateSummary::Ready(text) => ("ready", Some(text)),
            AggregateSummary::Failed(message) => ("failed", Some(message)),
        };
        Self {
            status: status.to_string(),
            text,
            displayed,
            translation: view.translation.map(TranslationResponse::from),
            toggle_label,
            error: view.error,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct OverviewResponse {
    pub user_id: Uuid,
    pub email: String,
    pub profile: ProfileResponse,
    pub visits: Vec<VisitResponse>,
    pub summary: SummaryResponse,
}

impl From<Overview> for OverviewResponse {
    fn from(o: Overview) -> Self {
        Self {
            user_id: o.session.user_id,
            email: o.session.email,
            profile: o.profile.into(),
            visits: visit_list(o.visits),
            summary: o.summary.into(),
        }
    }
}

//=========================================================================================
// Multipart Helpers
//=========================================================================================

/// The one file part of a form plus its text fields.
struct UploadForm {
    file: Option<DocumentFile>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, (StatusCode, String)> {
        let mut form = UploadForm {
            file: None,
            fields: HashMap::new(),
        };
        while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await.map_err(bad_multipart)?;
                    form.file = Some(DocumentFile {
                        file_name,
                        content_type,
                        bytes,
                    });
                }
                None => {
                    let value = field.text().await.map_err(bad_multipart)?;
                    form.fields.insert(name, value);
                }
            }
        }
        Ok(form)
    }

    /// A missing file is handed on as an empty one so validation reports it.
    fn take_file(&mut self) -> DocumentFile {
        self.file.take().unwrap_or_else(|| DocumentFile {
            file_name: String::new(),
            content_type: None,
            bytes: Bytes::new(),
        })
    }

    fn field(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// The public landing page.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Landing page", body = LandingResponse))
)]
pub async fn landing_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<LandingResponse> {
    let signed_in_as = session_key(&headers)
        .and_then(|key| state.sessions.get(key))
        .and_then(|dashboard| {
            RouteGuard::render(&dashboard.auth().session(), |session| session.email.clone())
        });
    Json(LandingResponse {
        service: "Medi".to_string(),
        signed_in_as,
    })
}

/// Everything the dashboard shows: profile, visits and the patient summary.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Dashboard content", body = OverviewResponse),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn dashboard_handler(
    Extension(dashboard): Extension<Arc<Dashboard>>,
) -> Result<Json<OverviewResponse>, (StatusCode, String)> {
    let overview = dashboard.overview().await.map_err(reject)?;
    Ok(Json(overview.into()))
}

// --- Profile ---

#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "The user's profile, empty if none was saved", body = ProfileResponse),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn get_profile_handler(
    Extension(dashboard): Extension<Arc<Dashboard>>,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    let profile = dashboard.profile().await.map_err(reject)?;
    Ok(Json(profile.into()))
}

#[utoipa::path(
    put,
    path = "/profile",
    request_body = ProfileRequest,
    responses(
        (status = 200, description = "Profile saved", body = ProfileResponse),
        (status = 400, description = "Invalid profile values"),
        (status = 502, description = "The profile could not be stored")
    )
)]
pub async fn save_profile_handler(
    Extension(dashboard): Extension<Arc<Dashboard>>,
    Json(req): Json<ProfileRequest>,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    let profile = dashboard.save_profile(req.into()).await.map_err(reject)?;
    Ok(Json(profile.into()))
}

#[utoipa::path(
    post,
    path = "/profile/avatar",
    request_body(content_type = "multipart/form-data", description = "The image to use as avatar."),
    responses(
        (status = 200, description = "Avatar stored and profile updated", body = ProfileResponse),
        (status = 400, description = "No image was sent")
    )
)]
pub async fn upload_avatar_handler(
    Extension(dashboard): Extension<Arc<Dashboard>>,
    multipart: Multipart,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    let mut form = UploadForm::read(multipart).await?;
    let profile = dashboard
        .upload_avatar(form.take_file())
        .await
        .map_err(reject)?;
    Ok(Json(profile.into()))
}

// --- Visits ---

#[utoipa::path(
    get,
    path = "/visits",
    responses(
        (status = 200, description = "All visits, newest first", body = [VisitResponse]),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn list_visits_handler(
    Extension(dashboard): Extension<Arc<Dashboard>>,
) -> Result<Json<Vec<VisitResponse>>, (StatusCode, String)> {
    let visits = dashboard.visits().await.map_err(reject)?;
    Ok(Json(visit_list(visits)))
}

/// Upload a visit document.
///
/// Accepts multipart/form-data with a `file` part (PDF) and the text fields
/// `clinic_name` and `type_of_visit`.
#[utoipa::path(
    post,
    path = "/visits",
    request_body(content_type = "multipart/form-data", description = "The document and its visit details."),
    responses(
        (status = 201, description = "Visit recorded", body = UploadResponse),
        (status = 400, description = "Missing file or fields"),
        (status = 409, description = "An upload is already in progress"),
        (status = 502, description = "The document could not be stored")
    )
)]
pub async fn create_visit_handler(
    Extension(dashboard): Extension<Arc<Dashboard>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut form = UploadForm::read(multipart).await?;
    let visit_form = VisitForm {
        clinic_name: form.field("clinic_name"),
        type_of_visit: form.field("type_of_visit"),
    };
    let (visit, visits) = dashboard
        .upload(form.take_file(), visit_form)
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            visit: visit.into(),
            visits: visit_list(visits),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/visits/{id}/download",
    params(("id" = Uuid, Path, description = "The visit id.")),
    responses(
        (status = 200, description = "The stored document as application/pdf"),
        (status = 404, description = "No such visit")
    )
)]
pub async fn download_visit_handler(
    Extension(dashboard): Extension<Arc<Dashboard>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let file = dashboard.download(id).await.map_err(reject)?;
    let content_type = file
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let disposition = format!(
        "attachment; filename=\"{}\"",
        file.file_name.replace('"', "")
    );
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.bytes,
    ))
}

#[utoipa::path(
    delete,
    path = "/visits/{id}",
    params(("id" = Uuid, Path, description = "The visit id.")),
    responses(
        (status = 200, description = "Visit deleted; the remaining visits", body = [VisitResponse]),
        (status = 404, description = "No such visit"),
        (status = 502, description = "The document or row could not be removed")
    )
)]
pub async fn delete_visit_handler(
    Extension(dashboard): Extension<Arc<Dashboard>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<VisitResponse>>, (StatusCode, String)> {
    let visits = dashboard.delete(id).await.map_err(reject)?;
    Ok(Json(visit_list(visits)))
}

#[utoipa::path(
    post,
    path = "/visits/{id}/translate",
    params(("id" = Uuid, Path, description = "The visit id.")),
    request_body = TranslateRequest,
    responses(
        (status = 200, description = "The visit showing its translation", body = VisitResponse),
        (status = 400, description = "No language given, or nothing to translate"),
        (status = 409, description = "This visit is already being translated"),
        (status = 502, description = "Translation failed")
    )
)]
pub async fn translate_visit_handler(
    Extension(dashboard): Extension<Arc<Dashboard>>,
    Path(id): Path<Uuid>,
    Json(req): Json<TranslateRequest>,
) -> Result<Json<VisitResponse>, (StatusCode, String)> {
    let entry = dashboard
        .translate_visit(id, &req.language)
        .await
        .map_err(reject)?;
    Ok(Json(entry.into()))
}

#[utoipa::path(
    post,
    path = "/visits/{id}/toggle",
    params(("id" = Uuid, Path, description = "The visit id.")),
    responses(
        (status = 200, description = "The visit with the other text shown", body = VisitResponse),
        (status = 400, description = "The visit has not been translated")
    )
)]
pub async fn toggle_visit_handler(
    Extension(dashboard): Extension<Arc<Dashboard>>,
    Path(id): Path<Uuid>,
) -> Result<Json<VisitResponse>, (StatusCode, String)> {
    let entry = dashboard.toggle_visit(id).await.map_err(reject)?;
    Ok(Json(entry.into()))
}

// --- Patient summary ---

#[utoipa::path(
    get,
    path = "/summary",
    responses(
        (status = 200, description = "The freshly generated patient summary", body = SummaryResponse),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn get_summary_handler(
    Extension(dashboard): Extension<Arc<Dashboard>>,
) -> Result<Json<SummaryResponse>, (StatusCode, String)> {
    let view = dashboard.summary().await.map_err(reject)?;
    Ok(Json(view.into()))
}

#[utoipa::path(
    post,
    path = "/summary/translate",
    request_body = TranslateRequest,
    responses(
        (status = 200, description = "The summary showing its translation", body = SummaryResponse),
        (status = 400, description = "No language given, or no summary yet"),
        (status = 409, description = "A translation is already in progress"),
        (status = 502, description = "Translation failed")
    )
)]
pub async fn translate_summary_handler(
    Extension(dashboard): Extension<Arc<Dashboard>>,
    Json(req): Json<TranslateRequest>,
) -> Result<Json<SummaryResponse>, (StatusCode, String)> {
    let view = dashboard
        .translate_summary(&req.language)
        .await
        .map_err(reject)?;
    Ok(Json(view.into()))
}

#[utoipa::path(
    post,
    path = "/summary/toggle",
    responses(
        (status = 200, description = "The summary with the other text shown", body = SummaryResponse),
        (status = 400, description = "The summary has not been translated")
    )
)]
pub async fn toggle_summary_handler(
    Extension(dashboard): Extension<Arc<Dashboard>>,
) -> Result<Json<SummaryResponse>, (StatusCode, String)> {
    let view = dashboard.toggle_summary().await.map_err(reject)?;
    Ok(Json(view.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use medi_core::error::Operation;
    use medi_core::ports::PortError;

    #[test]
    fn kinds_map_to_statuses() {
        let cases = [
            (WorkflowError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (WorkflowError::Busy("Upload"), StatusCode::CONFLICT),
            (WorkflowError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (
                Operation::SignIn.fail(PortError::Rejected("Invalid login credentials".into())),
                StatusCode::UNAUTHORIZED,
            ),
            (
                Operation::FindVisit.fail(PortError::NotFound("gone".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                Operation::UploadObject.fail(PortError::Unexpected("boom".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                Operation::DownloadObject.fail(PortError::Unauthorized),
                StatusCode::UNAUTHORIZED,
            ),
            (
                Operation::ListVisits.fail(PortError::Unauthorized),
                StatusCode::UNAUTHORIZED,
            ),
            (
                WorkflowError::Conflict("changed".into()),
                StatusCode::CONFLICT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(reject(err).0, status);
        }
    }

    #[test]
    fn upstream_refusals_are_passed_through() {
        let (_, message) =
            reject(Operation::SignUp.fail(PortError::Rejected("User already registered".into())));
        assert_eq!(message, "User already registered");
    }

    #[test]
    fn openapi_lists_the_dashboard_routes() {
        let doc = ApiDoc::openapi();
        for path in ["/dashboard", "/visits", "/visits/{id}/translate", "/summary/toggle"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
