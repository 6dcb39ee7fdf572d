//! Rule-based document-type classification.
//!
//! The classifier decides what kind of administrative document a page of OCR
//! text came from. It is deliberately dumb: a short list of keyword rules,
//! tried in a fixed priority order, where the first enabled rule whose
//! conditions hold wins. Rule order matters and is part of the rule set, not
//! of this module. See [`rules`] for the rule data itself.
//!
//! Keyword matching lowercases the raw text but does NOT strip diacritics.
//! OCR sometimes reads accents and sometimes drops them, so the keyword lists
//! include both variants ("république" and "republique") instead of funneling
//! everything through the name-matching normalizer. That asymmetry is
//! intentional.

pub mod rules;

use std::{collections::BTreeSet, fmt};

use clap::ValueEnum;
use schemars::JsonSchema;

use crate::prelude::*;

pub use self::rules::{KeywordRule, RuleSet};

/// The document types we know how to recognize.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// National identity card.
    IdentityCard,

    /// Passport.
    Passport,

    /// Residence permit ("titre de séjour").
    ResidencePermit,

    /// Proof of address (utility bill, rent receipt, lease, ...).
    ProofOfAddress,

    /// Bank account details (RIB/IBAN).
    BankDetails,

    /// No rule matched.
    Unknown,
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DocumentType::IdentityCard => "Carte d'identité",
            DocumentType::Passport => "Passeport",
            DocumentType::ResidencePermit => "Titre de séjour",
            DocumentType::ProofOfAddress => "Justificatif de domicile",
            DocumentType::BankDetails => "Relevé d'identité bancaire",
            DocumentType::Unknown => "Inconnu",
        };
        write!(f, "{}", label)
    }
}

/// Which document types should the classifier report?
///
/// This mirrors the caller's per-type filter checkboxes. It is an explicit
/// value passed into [`classify`], never ambient state, so the classifier
/// stays a pure function.
#[derive(Clone, Debug)]
pub struct ClassificationConfig {
    /// The enabled types. [`DocumentType::Unknown`] is never in this set.
    enabled: BTreeSet<DocumentType>,
}

impl ClassificationConfig {
    /// Enable every known document type.
    pub fn all() -> Self {
        Self::from_types(&[
            DocumentType::IdentityCard,
            DocumentType::Passport,
            DocumentType::ResidencePermit,
            DocumentType::ProofOfAddress,
            DocumentType::BankDetails,
        ])
    }

    /// Enable only the listed types. `Unknown` is ignored if present.
    pub fn from_types(types: &[DocumentType]) -> Self {
        Self {
            enabled: types
                .iter()
                .copied()
                .filter(|ty| *ty != DocumentType::Unknown)
                .collect(),
        }
    }

    /// Is this document type enabled?
    pub fn is_enabled(&self, document_type: DocumentType) -> bool {
        self.enabled.contains(&document_type)
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self::all()
    }
}

/// Classify a page of OCR text.
///
/// Rules are tried in the order they appear in `rules`; the first enabled rule
/// that fires decides the type, even if a later rule would have matched more
/// keywords. Empty or garbled text simply matches no rule and comes back as
/// [`DocumentType::Unknown`] — classification never fails.
pub fn classify(
    text: &str,
    config: &ClassificationConfig,
    rules: &RuleSet,
) -> DocumentType {
    let haystack = text.to_lowercase();
    for rule in &rules.rules {
        if config.is_enabled(rule.document_type) && rule.fires_on(&haystack) {
            return rule.document_type;
        }
    }
    DocumentType::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_all(text: &str) -> DocumentType {
        classify(text, &ClassificationConfig::all(), &RuleSet::builtin())
    }

    #[test]
    fn empty_text_is_unknown() {
        assert_eq!(classify_all(""), DocumentType::Unknown);
        assert_eq!(classify_all("rien d'intéressant ici"), DocumentType::Unknown);
    }

    #[test]
    fn identity_card_needs_two_distinct_keywords() {
        // "carte" alone is not enough, however often it repeats.
        assert_eq!(
            classify_all("carte carte carte carte"),
            DocumentType::Unknown
        );
        assert_eq!(
            classify_all("CARTE NATIONALE D'IDENTITÉ"),
            DocumentType::IdentityCard
        );
        assert_eq!(
            classify_all("REPUBLIQUE FRANCAISE carte"),
            DocumentType::IdentityCard
        );
    }

    #[test]
    fn passport_wins_by_priority_not_by_count() {
        // Identity-card keywords outnumber the single "passeport" marker, but
        // the passport rule is tried first.
        let text = "RÉPUBLIQUE FRANÇAISE PASSEPORT carte identité";
        assert_eq!(classify_all(text), DocumentType::Passport);
    }

    #[test]
    fn residence_permit_mention_blocks_passport() {
        // Residence permits routinely mention the holder's passport. The
        // exclusion terms keep them out of the passport bucket, and the
        // permit rule picks them up instead.
        let text = "TITRE DE SÉJOUR — passeport n° 12AB345";
        assert_eq!(classify_all(text), DocumentType::ResidencePermit);
    }

    #[test]
    fn proof_of_address_and_bank_details_fire() {
        assert_eq!(
            classify_all("Quittance de loyer — domicile: 3 rue des Lilas"),
            DocumentType::ProofOfAddress
        );
        assert_eq!(
            classify_all("IBAN FR76 3000 4000 5000, BIC AGRIFRPP"),
            DocumentType::BankDetails
        );
    }

    #[test]
    fn disabled_types_fall_through() {
        let rules = RuleSet::builtin();
        let text = "RÉPUBLIQUE FRANÇAISE PASSEPORT carte identité";

        // With passports disabled, the identity-card rule gets its turn.
        let no_passport = ClassificationConfig::from_types(&[
            DocumentType::IdentityCard,
            DocumentType::ResidencePermit,
        ]);
        assert_eq!(
            classify(text, &no_passport, &rules),
            DocumentType::IdentityCard
        );

        // With everything disabled, nothing can match.
        let none = ClassificationConfig::from_types(&[]);
        assert_eq!(classify(text, &none, &rules), DocumentType::Unknown);
    }

    #[test]
    fn accented_and_plain_spellings_both_match() {
        assert_eq!(
            classify_all("republique francaise"),
            DocumentType::IdentityCard
        );
        assert_eq!(
            classify_all("république française"),
            DocumentType::IdentityCard
        );
    }
}
