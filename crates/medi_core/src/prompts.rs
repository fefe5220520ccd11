//! crates/medi_core/src/prompts.rs
//!
//! Prompt templates sent to the text generation service, and the title
//! derivation that feeds the visit summary prompt.

use std::sync::LazyLock;

use regex::Regex;

/// Stored as the summary when the model cannot produce one.
pub const FALLBACK_SUMMARY: &str = "Unable to generate summary";

/// What the model is told to answer when there are no visit summaries.
pub const EMPTY_AGGREGATE_PLACEHOLDER: &str = "Add a Document to Get Started";

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[_-]").expect("separator pattern is valid"));
static CAPITALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z])").expect("capital pattern is valid"));

/// Turns a file name like `CardiologyFollowUp_2024.pdf` into `Cardiology Follow Up 2024`.
pub fn title_from_file_name(file_name: &str) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    let spaced = SEPARATORS.replace_all(stem, " ");
    let spaced = CAPITALS.replace_all(&spaced, " $1");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn visit_summary(title: &str) -> String {
    format!(
        "Please generate a brief, no longer than 2 sentences, medical visit summary based on this document title: {title}.
Include possible type of visit, potential medical conditions discussed, and any other relevant medical information
you can infer from the title. Keep it concise but informative. Don't do any formatting, just output the pure text."
    )
}

/// `summaries` is every non-blank visit summary, joined with newlines.
pub fn aggregate_summary(summaries: &str) -> String {
    format!(
        "Given the following summaries of medical documents for this patient:

{summaries}

Please provide a comprehensive medical summary. Some things to include can be past health issues they've had,
prescriptions or medications they have received, pattern of medical visits and treatments.
Keep it concise but informative. Output only the text, nothing else, no formatting or headers or anything. If nothing is provided,
please just say \"{EMPTY_AGGREGATE_PLACEHOLDER}\""
    )
}

pub fn visit_translation(text: &str, language: &str) -> String {
    format!(
        "Translate the following medical summary to {language}.
Maintain medical accuracy and terminology:

{text}"
    )
}

pub fn aggregate_translation(text: &str, language: &str) -> String {
    format!(
        "Translate the following medical summary to {language}. Don't do any formating or headers or introductions, just provide the text.
Maintain medical accuracy and terminology:

{text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_splits_camel_case_and_separators() {
        assert_eq!(
            title_from_file_name("CardiologyFollowUp_2024-03.pdf"),
            "Cardiology Follow Up 2024 03"
        );
        assert_eq!(title_from_file_name("blood_test.pdf"), "blood test");
        assert_eq!(title_from_file_name("MRI.pdf"), "M R I");
    }

    #[test]
    fn title_keeps_names_without_extension() {
        assert_eq!(title_from_file_name("discharge-notes"), "discharge notes");
        assert_eq!(title_from_file_name(".pdf"), ".pdf");
    }

    #[test]
    fn summary_prompt_embeds_title() {
        let prompt = visit_summary("Annual Physical");
        assert!(prompt.contains("document title: Annual Physical."));
    }

    #[test]
    fn aggregate_prompt_carries_placeholder_instruction() {
        let prompt = aggregate_summary("");
        assert!(prompt.contains("please just say \"Add a Document to Get Started\""));
        assert!(!prompt.contains("{summaries}"));
    }

    #[test]
    fn translation_prompts_embed_language_and_text() {
        let prompt = visit_translation("Routine checkup.", "Spanish");
        assert!(prompt.starts_with("Translate the following medical summary to Spanish."));
        assert!(prompt.ends_with("Routine checkup."));

        let prompt = aggregate_translation("All good.", "French");
        assert!(prompt.contains("to French. Don't do any formating"));
        assert!(prompt.ends_with("All good."));
    }

    #[test]
    fn user_text_is_inserted_verbatim() {
        let prompt = visit_translation("Seen for {language} rash.", "Spanish {text}");
        assert!(prompt.starts_with("Translate the following medical summary to Spanish {text}."));
        assert!(prompt.ends_with("Seen for {language} rash."));
        assert_eq!(prompt.matches("Seen for").count(), 1);

        let prompt = aggregate_summary("Note mentions {placeholder}.");
        assert!(prompt.contains("\n\nNote mentions {placeholder}.\n\n"));
    }
}
