//! crates/medi_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// An authenticated session issued by the remote auth service.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A session without an expiry instant never expires locally.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// What a successful sign-up hands back. The session is absent when the
/// backend still wants the address confirmed.
#[derive(Debug, Clone)]
pub struct SignUpData {
    pub user_id: Uuid,
    pub email: String,
    pub session: Option<Session>,
}

/// One row per user. Every field is optional until the user fills it in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    pub name: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub country: Option<String>,
    pub avatar_url: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn empty(id: Uuid) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

/// The editable part of a profile, as submitted by the profile form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub country: Option<String>,
    pub avatar_url: Option<String>,
}

/// A stored visit: one uploaded document plus its metadata and AI summary.
#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_url: String,
    pub clinic_name: String,
    pub type_of_visit: String,
    pub summary: Option<String>,
    pub visit_date: DateTime<Utc>,
}

impl Visit {
    /// The name a downloaded copy should carry: the last segment of the storage path.
    pub fn file_name(&self) -> &str {
        self.document_url
            .rsplit('/')
            .next()
            .unwrap_or(&self.document_url)
    }
}

/// A visit row about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVisit {
    pub user_id: Uuid,
    pub document_url: String,
    pub clinic_name: String,
    pub type_of_visit: String,
    pub summary: Option<String>,
    pub visit_date: DateTime<Utc>,
}

/// The metadata fields of the upload form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitForm {
    pub clinic_name: String,
    pub type_of_visit: String,
}

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A file as received from the user (upload) or from storage (download).
#[derive(Debug, Clone)]
pub struct DocumentFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl DocumentFile {
    /// The extension after the last dot, if the name has one.
    pub fn extension(&self) -> Option<&str> {
        match self.file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
            _ => None,
        }
    }

    pub fn is_pdf(&self) -> bool {
        self.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
            || self
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.eq_ignore_ascii_case(PDF_CONTENT_TYPE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn file(name: &str, content_type: Option<&str>) -> DocumentFile {
        DocumentFile {
            file_name: name.to_string(),
            content_type: content_type.map(str::to_string),
            bytes: Bytes::from_static(b"%PDF-1.7"),
        }
    }

    #[test]
    fn extension_is_taken_after_the_last_dot() {
        assert_eq!(file("lab.results.PDF", None).extension(), Some("PDF"));
        assert_eq!(file("README", None).extension(), None);
        assert_eq!(file(".hidden", None).extension(), None);
    }

    #[test]
    fn pdf_is_recognised_by_extension_or_content_type() {
        assert!(file("visit.pdf", None).is_pdf());
        assert!(file("scan", Some("application/pdf")).is_pdf());
        assert!(!file("photo.png", Some("image/png")).is_pdf());
    }

    #[test]
    fn session_expiry() {
        let now = Utc::now();
        let mut session = Session {
            user_id: Uuid::new_v4(),
            email: "a@b.c".to_string(),
            access_token: "t".to_string(),
            refresh_token: None,
            expires_at: None,
        };
        assert!(!session.is_expired(now));
        session.expires_at = Some(now - Duration::seconds(1));
        assert!(session.is_expired(now));
    }

    #[test]
    fn visit_file_name_is_last_path_segment() {
        let visit = Visit {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            document_url: "2024/cardiology.pdf".to_string(),
            clinic_name: "Heart Clinic".to_string(),
            type_of_visit: "Checkup".to_string(),
            summary: None,
            visit_date: Utc::now(),
        };
        assert_eq!(visit.file_name(), "cardiology.pdf");
    }
}
