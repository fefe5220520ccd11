//! crates/medi_core/src/ingestion.rs
//!
//! Turns an uploaded document into a stored object plus a visit row carrying an
//! AI-written summary.

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{DocumentFile, NewVisit, Session, Visit, VisitForm};
use crate::error::{Operation, WorkflowError};
use crate::ports::Services;
use crate::prompts::{self, FALLBACK_SUMMARY};
use crate::visits;

/// The stored visit and the refreshed listing that now contains it.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub visit: Visit,
    pub visits: Vec<Visit>,
}

/// Checks the upload form the way the upload control gates its button.
pub fn validate(file: &DocumentFile, form: &VisitForm) -> Result<(), WorkflowError> {
    if file.file_name.trim().is_empty() {
        return Err(WorkflowError::Validation("Please select a file first.".to_string()));
    }
    if file.bytes.is_empty() {
        return Err(WorkflowError::Validation("The selected file is empty.".to_string()));
    }
    if !file.is_pdf() {
        return Err(WorkflowError::Validation(
            "Only PDF documents can be uploaded.".to_string(),
        ));
    }
    if form.clinic_name.trim().is_empty() {
        return Err(WorkflowError::Validation("Clinic name is required.".to_string()));
    }
    if form.type_of_visit.trim().is_empty() {
        return Err(WorkflowError::Validation("Type of visit is required.".to_string()));
    }
    Ok(())
}

/// A random object name that keeps the original extension.
pub fn object_name(file: &DocumentFile) -> String {
    let id = Uuid::new_v4().simple();
    match file.extension() {
        Some(ext) => format!("{id}.{ext}"),
        None => id.to_string(),
    }
}

/// Asks the model for a short summary of the document, based on its title.
/// Never fails: a generation error yields the fixed fallback text.
pub async fn summarize_document(services: &Services, file_name: &str) -> String {
    let title = prompts::title_from_file_name(file_name);
    match services.llm.generate(&prompts::visit_summary(&title)).await {
        Ok(summary) => summary.trim().to_string(),
        Err(e) => {
            Operation::GenerateVisitSummary.log(&e);
            FALLBACK_SUMMARY.to_string()
        }
    }
}

pub async fn ingest_visit(
    services: &Services,
    session: &Session,
    file: DocumentFile,
    form: VisitForm,
) -> Result<IngestOutcome, WorkflowError> {
    validate(&file, &form)?;

    // 1. Summary first; its failure never aborts the upload.
    let summary = summarize_document(services, &file.file_name).await;

    // 2. Store the raw document.
    let bucket = &services.buckets.documents;
    let path = object_name(&file);
    services
        .storage
        .upload(
            session,
            bucket,
            &path,
            file.bytes.clone(),
            file.content_type.as_deref(),
        )
        .await
        .map_err(|e| Operation::UploadObject.fail(e))?;

    // 3. Record the visit, undoing the upload if the row cannot be written.
    let new_visit = NewVisit {
        user_id: session.user_id,
        document_url: path.clone(),
        clinic_name: form.clinic_name.trim().to_string(),
        type_of_visit: form.type_of_visit.trim().to_string(),
        summary: Some(summary),
        visit_date: Utc::now(),
    };
    let visit = match services.db.insert_visit(new_visit).await {
        Ok(visit) => visit,
        Err(e) => {
            let err = Operation::InsertVisit.fail(e);
            match services.storage.remove(session, bucket, &path).await {
                Ok(()) => warn!(path = %path, "removed uploaded document after failed insert"),
                Err(undo) => error!(
                    path = %path,
                    error = %undo,
                    "uploaded document is orphaned: insert and cleanup both failed"
                ),
            }
            return Err(err);
        }
    };
    info!(visit_id = %visit.id, user_id = %session.user_id, "visit recorded");

    // 4. Refresh the listing.
    let visits = visits::list_visits(services, session.user_id).await;
    Ok(IngestOutcome { visit, visits })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Backend;
    use bytes::Bytes;

    fn pdf(name: &str) -> DocumentFile {
        DocumentFile {
            file_name: name.to_string(),
            content_type: Some("application/pdf".to_string()),
            bytes: Bytes::from_static(b"%PDF-1.7 visit"),
        }
    }

    fn form() -> VisitForm {
        VisitForm {
            clinic_name: "Riverside Clinic".to_string(),
            type_of_visit: "Cardiology".to_string(),
        }
    }

    #[tokio::test]
    async fn successful_ingestion_stores_object_and_row() {
        let backend = Backend::new();
        let services = backend.services();
        let session = backend.signed_in("pat@example.com").await;

        let outcome = ingest_visit(&services, &session, pdf("HeartCheck_2024.pdf"), form())
            .await
            .unwrap();

        let rows = backend.db.visits();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert!(row.document_url.ends_with(".pdf"));
        assert!(backend.storage.get("pdfs", &row.document_url).is_some());
        assert_eq!(row.summary.as_deref(), Some("Visit regarding Heart Check 2024."));
        assert_eq!(row.clinic_name, "Riverside Clinic");
        assert_eq!(outcome.visits, rows);
        assert_eq!(outcome.visit.id, row.id);
    }

    #[tokio::test]
    async fn listing_shows_newest_first() {
        let backend = Backend::new();
        let services = backend.services();
        let session = backend.signed_in("pat@example.com").await;

        ingest_visit(&services, &session, pdf("first.pdf"), form()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let outcome = ingest_visit(&services, &session, pdf("second.pdf"), form())
            .await
            .unwrap();

        assert_eq!(outcome.visits.len(), 2);
        assert_eq!(outcome.visits[0].id, outcome.visit.id);
        assert!(outcome.visits[0].visit_date >= outcome.visits[1].visit_date);
    }

    #[tokio::test]
    async fn generation_failure_falls_back_and_still_records() {
        let backend = Backend::new();
        backend.llm.set_fail(true);
        let services = backend.services();
        let session = backend.signed_in("pat@example.com").await;

        ingest_visit(&services, &session, pdf("report.pdf"), form()).await.unwrap();

        let rows = backend.db.visits();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].summary.as_deref(), Some("Unable to generate summary"));
    }

    #[tokio::test]
    async fn upload_failure_creates_no_row() {
        let backend = Backend::new();
        backend.storage.set_fail_upload(true);
        let services = backend.services();
        let session = backend.signed_in("pat@example.com").await;

        let err = ingest_visit(&services, &session, pdf("report.pdf"), form())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Storage);
        assert!(backend.db.visits().is_empty());
        assert!(!backend.log.entries().contains(&"db.insert_visit".to_string()));
    }

    #[tokio::test]
    async fn insert_failure_removes_the_uploaded_object() {
        let backend = Backend::new();
        backend.db.set_fail_writes(true);
        let services = backend.services();
        let session = backend.signed_in("pat@example.com").await;

        let err = ingest_visit(&services, &session, pdf("report.pdf"), form())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Store);
        assert!(backend.storage.is_empty());
        let entries = backend.log.entries();
        assert!(entries.last().unwrap().starts_with("storage.remove pdfs/"));
    }

    #[test]
    fn validation_requires_every_field() {
        let mut blank = form();
        blank.clinic_name = "  ".to_string();
        assert!(validate(&pdf("a.pdf"), &blank).is_err());

        let mut blank = form();
        blank.type_of_visit.clear();
        assert!(validate(&pdf("a.pdf"), &blank).is_err());

        let image = DocumentFile {
            file_name: "x-ray.png".to_string(),
            content_type: Some("image/png".to_string()),
            bytes: Bytes::from_static(b"png"),
        };
        assert!(validate(&image, &form()).is_err());
        assert!(validate(&pdf("a.pdf"), &form()).is_ok());
    }

    #[test]
    fn object_name_keeps_extension() {
        let name = object_name(&pdf("Lab Results.PDF"));
        assert!(name.ends_with(".PDF"));
        assert_eq!(name.len(), 32 + 4);
        assert_ne!(name, object_name(&pdf("Lab Results.PDF")));
    }
}
