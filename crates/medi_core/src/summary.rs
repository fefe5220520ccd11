//! crates/medi_core/src/summary.rs
//!
//! The patient-level summary: every visit summary folded into one prompt, one
//! narrative back, plus a single translation overlay.

use uuid::Uuid;

use crate::error::{Operation, WorkflowError};
use crate::ports::Services;
use crate::prompts;
use crate::visits::{require_language, Translation};

pub const SUMMARY_FAILED: &str = "Failed to generate summary. Please try again later.";
pub const TRANSLATION_FAILED: &str = "Failed to translate summary. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateSummary {
    Loading,
    Ready(String),
    Failed(String),
}

impl AggregateSummary {
    pub fn text(&self) -> Option<&str> {
        match self {
            AggregateSummary::Ready(text) => Some(text),
            _ => None,
        }
    }
}

/// Joins the non-blank summaries with newlines. A failed read counts as no summaries.
pub async fn collect_summaries(services: &Services, user_id: Uuid) -> String {
    let summaries = match services.db.list_visit_summaries(user_id).await {
        Ok(summaries) => summaries,
        Err(e) => {
            Operation::ListSummaries.log(&e);
            Vec::new()
        }
    };
    summaries
        .into_iter()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Recomputes the aggregate from scratch. Nothing is cached between calls.
pub async fn compose_aggregate(services: &Services, user_id: Uuid) -> AggregateSummary {
    let summaries = collect_summaries(services, user_id).await;
    match services.llm.generate(&prompts::aggregate_summary(&summaries)).await {
        Ok(text) => AggregateSummary::Ready(text.trim().to_string()),
        Err(e) => {
            Operation::GenerateAggregate.log(&e);
            AggregateSummary::Failed(SUMMARY_FAILED.to_string())
        }
    }
}

pub async fn translate_aggregate(
    services: &Services,
    text: &str,
    language: &str,
) -> Result<String, WorkflowError> {
    let language = require_language(language)?;
    services
        .llm
        .generate(&prompts::aggregate_translation(text, language))
        .await
        .map(|text| text.trim().to_string())
        .map_err(|e| Operation::TranslateAggregate.fail(e))
}

/// What the summary panel holds between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateView {
    pub summary: AggregateSummary,
    pub translation: Option<Translation>,
    /// Set when the last translation attempt failed.
    pub error: Option<String>,
    /// Bumped every time the summary is replaced.
    pub revision: u64,
}

impl Default for AggregateView {
    fn default() -> Self {
        Self {
            summary: AggregateSummary::Loading,
            translation: None,
            error: None,
            revision: 0,
        }
    }
}

impl AggregateView {
    /// Replaces the summary; any previous translation belonged to the old text.
    pub fn set_summary(&mut self, summary: AggregateSummary) {
        self.summary = summary;
        self.translation = None;
        self.error = None;
        self.revision = self.revision.wrapping_add(1);
    }

    /// The text to translate and the revision it belongs to.
    pub fn translation_source(&self) -> Option<(u64, String)> {
        self.summary.text().map(|text| (self.revision, text.to_string()))
    }

    /// Attaches a translation made from `revision`. A summary recomputed in the
    /// meantime is left alone and `false` is returned.
    pub fn apply_translation(&mut self, revision: u64, language: &str, text: String) -> bool {
        if revision != self.revision {
            return false;
        }
        self.set_translation(language, text);
        true
    }

    pub fn set_translation(&mut self, language: &str, text: String) {
        self.translation = Some(Translation {
            language: language.to_string(),
            text,
            showing_translation: true,
        });
        self.error = None;
    }

    pub fn set_translation_failed(&mut self) {
        self.error = Some(TRANSLATION_FAILED.to_string());
    }

    /// Flips the display. Returns `false` when there is no translation yet.
    pub fn toggle(&mut self) -> bool {
        match self.translation.as_mut() {
            Some(t) => {
                t.showing_translation = !t.showing_translation;
                true
            }
            None => false,
        }
    }

    pub fn displayed(&self) -> Option<&str> {
        match &self.translation {
            Some(t) if t.showing_translation => Some(&t.text),
            _ => self.summary.text(),
        }
    }

    pub fn toggle_label(&self) -> Option<String> {
        self.translation.as_ref().map(|t| {
            if t.showing_translation {
                "Show English".to_string()
            } else {
                format!("Show {}", t.language)
            }
        })
    }
}
