//! crates/medi_core/src/visits.rs
//!
//! Listing, download, delete and translation of stored visits.

use std::collections::HashMap;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{DocumentFile, Session, Visit, PDF_CONTENT_TYPE};
use crate::error::{Operation, WorkflowError};
use crate::ports::Services;
use crate::prompts;

/// Shown in place of a missing summary.
pub const NO_SUMMARY: &str = "No summary available";

/// All visits of a user, newest first. A failed read yields an empty list.
pub async fn list_visits(services: &Services, user_id: Uuid) -> Vec<Visit> {
    match services.db.list_visits(user_id).await {
        Ok(visits) => visits,
        Err(e) => {
            Operation::ListVisits.log(&e);
            Vec::new()
        }
    }
}

pub async fn find_visit(
    services: &Services,
    user_id: Uuid,
    visit_id: Uuid,
) -> Result<Visit, WorkflowError> {
    services
        .db
        .get_visit(user_id, visit_id)
        .await
        .map_err(|e| Operation::FindVisit.fail(e))
}

pub async fn download_visit(
    services: &Services,
    session: &Session,
    visit_id: Uuid,
) -> Result<DocumentFile, WorkflowError> {
    let visit = find_visit(services, session.user_id, visit_id).await?;
    let bytes = services
        .storage
        .download(session, &services.buckets.documents, &visit.document_url)
        .await
        .map_err(|e| Operation::DownloadObject.fail(e))?;

    Ok(DocumentFile {
        file_name: visit.file_name().to_string(),
        content_type: Some(PDF_CONTENT_TYPE.to_string()),
        bytes,
    })
}

/// Removes the stored document, then the row. The row is only touched once the
/// object removal succeeded; if the row removal then fails, the document is put
/// back from a snapshot taken beforehand.
pub async fn delete_visit(
    services: &Services,
    session: &Session,
    visit_id: Uuid,
) -> Result<Visit, WorkflowError> {
    let visit = find_visit(services, session.user_id, visit_id).await?;
    let bucket = &services.buckets.documents;
    let path = visit.document_url.as_str();

    let snapshot = match services.storage.download(session, bucket, path).await {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(path = %path, error = %e, "no snapshot taken before delete");
            None
        }
    };

    services
        .storage
        .remove(session, bucket, path)
        .await
        .map_err(|e| Operation::RemoveObject.fail(e))?;

    if let Err(e) = services.db.delete_visit(session.user_id, visit.id).await {
        let err = Operation::DeleteVisit.fail(e);
        match snapshot {
            Some(bytes) => match services
                .storage
                .upload(session, bucket, path, bytes, Some(PDF_CONTENT_TYPE))
                .await
            {
                Ok(()) => warn!(path = %path, "restored document after failed row delete"),
                Err(undo) => error!(
                    visit_id = %visit.id,
                    error = %undo,
                    "visit row left without its document"
                ),
            },
            None => error!(visit_id = %visit.id, "visit row left without its document"),
        }
        return Err(err);
    }

    info!(visit_id = %visit.id, user_id = %session.user_id, "visit deleted");
    Ok(visit)
}

pub fn require_language(language: &str) -> Result<&str, WorkflowError> {
    let language = language.trim();
    if language.is_empty() {
        return Err(WorkflowError::Validation(
            "Please enter a target language first".to_string(),
        ));
    }
    Ok(language)
}

/// Translates a visit's stored summary. Failures are surfaced, never replaced.
pub async fn translate_visit(
    services: &Services,
    user_id: Uuid,
    visit_id: Uuid,
    language: &str,
) -> Result<String, WorkflowError> {
    let language = require_language(language)?;
    let visit = find_visit(services, user_id, visit_id).await?;
    let summary = visit
        .summary
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            WorkflowError::Validation("This visit has no summary to translate".to_string())
        })?;

    services
        .llm
        .generate(&prompts::visit_translation(summary, language))
        .await
        .map(|text| text.trim().to_string())
        .map_err(|e| Operation::TranslateVisit.fail(e))
}

//=========================================================================================
// Translation cache
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub language: String,
    pub text: String,
    pub showing_translation: bool,
}

/// Per-visit translations held for the lifetime of a dashboard view.
#[derive(Debug, Default)]
pub struct TranslationCache {
    entries: HashMap<Uuid, Translation>,
}

impl TranslationCache {
    /// Stores a fresh translation and shows it.
    pub fn insert(&mut self, visit_id: Uuid, language: &str, text: String) {
        self.entries.insert(
            visit_id,
            Translation {
                language: language.to_string(),
                text,
                showing_translation: true,
            },
        );
    }

    pub fn get(&self, visit_id: Uuid) -> Option<&Translation> {
        self.entries.get(&visit_id)
    }

    /// Flips between original and translation. `None` if nothing is cached.
    pub fn toggle(&mut self, visit_id: Uuid) -> Option<&Translation> {
        let entry = self.entries.get_mut(&visit_id)?;
        entry.showing_translation = !entry.showing_translation;
        Some(entry)
    }

    pub fn remove(&mut self, visit_id: Uuid) {
        self.entries.remove(&visit_id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The text to display for a visit right now.
    pub fn displayed<'a>(&'a self, visit: &'a Visit) -> &'a str {
        match self.entries.get(&visit.id) {
            Some(t) if t.showing_translation => &t.text,
            _ => visit.summary.as_deref().unwrap_or(NO_SUMMARY),
        }
    }
}

/// A visit together with what its summary cell shows.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitEntry {
    pub visit: Visit,
    pub displayed_summary: String,
    pub translation: Option<Translation>,
}

impl VisitEntry {
    pub fn new(visit: Visit, cache: &TranslationCache) -> Self {
        Self {
            displayed_summary: cache.displayed(&visit).to_string(),
            translation: cache.get(visit.id).cloned(),
            visit,
        }
    }

    /// Label of the toggle button, when there is something to toggle.
    pub fn toggle_label(&self) -> Option<String> {
        self.translation.as_ref().map(|t| {
            if t.showing_translation {
                "Show Original".to_string()
            } else {
                format!("Show {}", t.language)
            }
        })
    }
}
