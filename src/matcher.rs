//! Matching OCR text against a target person's name.

use schemars::JsonSchema;

use crate::{normalize::normalize, prelude::*};

/// The surname and given name we are screening documents for.
///
/// Matching is a mandatory filter: a query with no criteria matches nothing,
/// rather than everything. Either field may be empty, in which case only the
/// other one is checked.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, Serialize)]
pub struct NameQuery {
    /// The target surname, if any.
    #[serde(default)]
    pub surname: String,

    /// The target given name, if any.
    #[serde(default)]
    pub given_name: String,
}

impl NameQuery {
    /// Create a query from optional CLI arguments.
    pub fn new(surname: Option<&str>, given_name: Option<&str>) -> Self {
        Self {
            surname: surname.unwrap_or_default().to_owned(),
            given_name: given_name.unwrap_or_default().to_owned(),
        }
    }

    /// Does this query carry any usable criteria?
    pub fn is_empty(&self) -> bool {
        normalize(&self.surname).is_empty() && normalize(&self.given_name).is_empty()
    }

    /// Does `text` mention the person this query describes?
    ///
    /// Both sides are normalized (see [`normalize`]), and each non-empty name
    /// must appear as a substring. We deliberately avoid word-boundary
    /// matching: OCR line wrapping regularly splits or joins names, and a
    /// substring test survives that at the cost of occasional partial-name
    /// collisions.
    pub fn matches(&self, text: &str) -> bool {
        let surname = normalize(&self.surname);
        let given_name = normalize(&self.given_name);
        if surname.is_empty() && given_name.is_empty() {
            return false;
        }
        let haystack = normalize(text);
        (surname.is_empty() || haystack.contains(&surname))
            && (given_name.is_empty() || haystack.contains(&given_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(surname: &str, given_name: &str) -> NameQuery {
        NameQuery {
            surname: surname.to_owned(),
            given_name: given_name.to_owned(),
        }
    }

    #[test]
    fn empty_query_never_matches() {
        assert!(!query("", "").matches("Jean DUPONT né le 4 mars 1987"));
        assert!(!query("", "").matches(""));
        // Names that normalize to nothing count as empty too.
        assert!(!query("123", "!?").matches("Jean DUPONT"));
    }

    #[test]
    fn both_names_must_match() {
        let text = "Jean DUPONT né le 4 mars 1987";
        assert!(query("Dupont", "Jean").matches(text));
        assert!(!query("Dupont", "Paul").matches(text));
        assert!(!query("Martin", "Jean").matches(text));
    }

    #[test]
    fn single_sided_queries_match() {
        let text = "Jean DUPONT né le 4 mars 1987";
        assert!(query("Dupont", "").matches(text));
        assert!(query("", "Jean").matches(text));
    }

    #[test]
    fn matching_ignores_accents_and_case() {
        assert!(query("", "Francois").matches("François Müller"));
        assert!(query("MÜLLER", "françois").matches("Francois Muller"));
    }

    #[test]
    fn matching_survives_ocr_line_wrap() {
        // A newline inside a name disappears during normalization.
        assert!(query("Dupont", "").matches("DU\nPONT Jean"));
    }
}
