//! Classifying pre-extracted text records.
//!
//! This is the screening core without the OCR plumbing: records come in with
//! their text already extracted, and we report what the classifier and the
//! name matcher make of them. Useful for debugging rule sets against saved
//! OCR output, and for callers that bring their own text extraction.

use std::sync::Arc;

use futures::StreamExt as _;
use schemars::JsonSchema;

use super::work::{WorkInput, WorkOutput, WorkStatus};
use crate::{
    async_utils::BoxedStream,
    classify::{ClassificationConfig, DocumentType, RuleSet, classify},
    matcher::NameQuery,
    prelude::*,
};

/// An input record carrying pre-extracted text.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ClassifyInput {
    /// The OCR text to classify.
    pub text: String,
}

/// An output record describing a classified text.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ClassifyOutput {
    /// The detected document type.
    pub document_type: DocumentType,

    /// Whether the text mentions the target person. Omitted when no name was
    /// given — an empty query matches nothing, which would be misleading
    /// noise in a classification-only run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<bool>,
}

/// Shared configuration for a `classify` run.
pub struct ClassifyContext {
    /// The classification rules, in priority order.
    pub rules: RuleSet,

    /// Which document types to report.
    pub config: ClassificationConfig,

    /// The person to look for, if any.
    pub query: NameQuery,
}

impl ClassifyContext {
    /// Classify (and optionally name-match) a single text.
    pub fn classify_text(&self, text: &str) -> ClassifyOutput {
        let document_type = classify(text, &self.config, &self.rules);
        let matched = if self.query.is_empty() {
            None
        } else {
            Some(self.query.matches(text))
        };
        ClassifyOutput {
            document_type,
            matched,
        }
    }
}

/// Classify a stream of text records.
///
/// The work here is pure and takes microseconds per record, so unlike the
/// scan pipeline there is no concurrency to manage: records are mapped
/// straight through.
#[instrument(level = "debug", skip_all)]
pub fn process_classify_stream(
    input: BoxedStream<Result<WorkInput<ClassifyInput>>>,
    context: Arc<ClassifyContext>,
) -> BoxedStream<Result<WorkOutput<ClassifyOutput>>> {
    input
        .map(move |classify_input| {
            let context = context.clone();
            let classify_input = classify_input?;
            Ok(WorkOutput {
                id: classify_input.id,
                status: WorkStatus::Ok,
                errors: vec![],
                data: context.classify_text(&classify_input.data.text),
            })
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(surname: &str, given_name: &str) -> ClassifyContext {
        ClassifyContext {
            rules: RuleSet::builtin(),
            config: ClassificationConfig::all(),
            query: NameQuery {
                surname: surname.to_owned(),
                given_name: given_name.to_owned(),
            },
        }
    }

    #[test]
    fn reports_type_and_match() {
        let output = context("Dupont", "")
            .classify_text("CARTE NATIONALE D'IDENTITÉ — DUPONT Jean");
        assert_eq!(output.document_type, DocumentType::IdentityCard);
        assert_eq!(output.matched, Some(true));
    }

    #[test]
    fn omits_match_without_a_query() {
        let output = context("", "").classify_text("PASSEPORT");
        assert_eq!(output.document_type, DocumentType::Passport);
        assert_eq!(output.matched, None);
    }

    #[test]
    fn unknown_text_still_produces_a_record() {
        let output = context("Dupont", "").classify_text("");
        assert_eq!(output.document_type, DocumentType::Unknown);
        assert_eq!(output.matched, Some(false));
    }
}
