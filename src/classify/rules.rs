//! Keyword rule sets.
//!
//! Different deployments disagree about the exact marker terms for some
//! document types (the residence-permit list in particular exists in several
//! slightly different versions). So rule sets are data: a named, versioned
//! [`RuleSet`] value with a built-in default, loadable from a TOML or JSON
//! file via `--rules`.

use schemars::JsonSchema;

use super::DocumentType;
use crate::{async_utils::io::read_json_or_toml, prelude::*};

/// Marker terms for passports.
const PASSPORT_KEYWORDS: &[&str] = &["passeport"];

/// Terms whose presence disqualifies the passport rule. Residence permits
/// routinely mention the holder's passport number.
const PASSPORT_EXCLUSIONS: &[&str] = &["titre", "séjour", "sejour"];

/// Marker terms for national identity cards.
const IDENTITY_CARD_KEYWORDS: &[&str] = &[
    "carte",
    "identité",
    "card",
    "identity",
    "republique",
    "république",
    "francaise",
    "française",
];

/// Marker terms for residence permits.
const RESIDENCE_PERMIT_KEYWORDS: &[&str] =
    &["résidence", "permit", "residence", "titre", "sejour", "séjour"];

/// Marker terms for proof-of-address documents: rent receipts, utility
/// bills, leases, home insurance.
const PROOF_OF_ADDRESS_KEYWORDS: &[&str] = &[
    "domicile",
    "adresse",
    "address",
    "quittance",
    "loyer",
    "facture",
    "électricité",
    "electricite",
    "eau",
    "gaz",
    "edf",
    "engie",
    "bail",
    "location",
    "assurance",
    "habitation",
    "échéance",
    "echeance",
    "émission",
    "emission",
    "agence",
];

/// Marker terms for bank account details.
const BANK_DETAILS_KEYWORDS: &[&str] = &[
    "iban",
    "bic",
    "rib",
    "banque",
    "guichet",
    "compte",
    "titulaire",
    "bancaire",
    "clé",
    "cle",
    "domiciliation",
];

/// A single classification rule.
///
/// A rule fires when at least `min_matches` of its `keywords` appear in the
/// (lowercased) text, and none of its `exclusions` do. Each keyword counts at
/// most once, no matter how often it occurs.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeywordRule {
    /// The type this rule recognizes.
    pub document_type: DocumentType,

    /// Marker terms, lowercase. List accented and unaccented spellings
    /// separately; keyword matching does not strip diacritics.
    pub keywords: Vec<String>,

    /// Terms whose presence disqualifies this rule.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<String>,

    /// How many distinct keywords must be present.
    pub min_matches: usize,
}

impl KeywordRule {
    fn new(
        document_type: DocumentType,
        keywords: &[&str],
        exclusions: &[&str],
        min_matches: usize,
    ) -> Self {
        Self {
            document_type,
            keywords: keywords.iter().map(|s| (*s).to_owned()).collect(),
            exclusions: exclusions.iter().map(|s| (*s).to_owned()).collect(),
            min_matches,
        }
    }

    /// Does this rule fire on `haystack`? The caller must pass lowercased
    /// text.
    pub fn fires_on(&self, haystack: &str) -> bool {
        if self
            .exclusions
            .iter()
            .any(|term| haystack.contains(term.as_str()))
        {
            return false;
        }
        let present = self
            .keywords
            .iter()
            .filter(|keyword| haystack.contains(keyword.as_str()))
            .count();
        present >= self.min_matches
    }
}

/// An ordered list of classification rules.
///
/// Order is priority: the classifier returns the first enabled rule that
/// fires. See [`super::classify`].
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    /// A label identifying this rule set in logs and output.
    pub version: String,

    /// The rules, in priority order.
    pub rules: Vec<KeywordRule>,
}

impl RuleSet {
    /// The built-in rule set.
    pub fn builtin() -> Self {
        Self {
            version: "builtin/2".to_owned(),
            rules: vec![
                KeywordRule::new(
                    DocumentType::Passport,
                    PASSPORT_KEYWORDS,
                    PASSPORT_EXCLUSIONS,
                    1,
                ),
                KeywordRule::new(
                    DocumentType::IdentityCard,
                    IDENTITY_CARD_KEYWORDS,
                    &[],
                    2,
                ),
                KeywordRule::new(
                    DocumentType::ResidencePermit,
                    RESIDENCE_PERMIT_KEYWORDS,
                    &[],
                    2,
                ),
                KeywordRule::new(
                    DocumentType::ProofOfAddress,
                    PROOF_OF_ADDRESS_KEYWORDS,
                    &[],
                    2,
                ),
                KeywordRule::new(DocumentType::BankDetails, BANK_DETAILS_KEYWORDS, &[], 2),
            ],
        }
    }

    /// Load a rule set from a TOML or JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        let rule_set = read_json_or_toml::<Self>(path).await?;
        rule_set
            .validate()
            .with_context(|| format!("invalid rule set {:?}", path.display()))?;
        Ok(rule_set)
    }

    /// Check a rule set for mistakes that would make rules unable to fire,
    /// or fire when they shouldn't.
    pub fn validate(&self) -> Result<()> {
        for (idx, rule) in self.rules.iter().enumerate() {
            if rule.document_type == DocumentType::Unknown {
                return Err(anyhow!("rule {} targets the unknown type", idx));
            }
            if rule.keywords.is_empty() {
                return Err(anyhow!("rule {} has no keywords", idx));
            }
            if rule.min_matches == 0 || rule.min_matches > rule.keywords.len() {
                return Err(anyhow!(
                    "rule {} requires {} matches but lists {} keywords",
                    idx,
                    rule.min_matches,
                    rule.keywords.len()
                ));
            }
            for term in rule.keywords.iter().chain(&rule.exclusions) {
                if *term != term.to_lowercase() {
                    return Err(anyhow!(
                        "rule {} term {:?} is not lowercase (matching lowercases \
                         the text, so uppercase terms can never match)",
                        idx,
                        term
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rules_are_valid() {
        RuleSet::builtin().validate().unwrap();
    }

    #[test]
    fn keywords_count_distinct_presence_not_occurrences() {
        let rule = KeywordRule::new(
            DocumentType::BankDetails,
            &["iban", "bic"],
            &[],
            2,
        );
        assert!(!rule.fires_on("iban iban iban"));
        assert!(rule.fires_on("iban et bic"));
    }

    #[test]
    fn exclusions_veto_the_rule() {
        let rule = KeywordRule::new(
            DocumentType::Passport,
            PASSPORT_KEYWORDS,
            PASSPORT_EXCLUSIONS,
            1,
        );
        assert!(rule.fires_on("passeport"));
        assert!(!rule.fires_on("passeport mentionné sur le titre"));
        assert!(!rule.fires_on("passeport, séjour"));
    }

    #[test]
    fn rule_sets_parse_from_toml() {
        let rule_set: RuleSet = toml::from_str(
            r#"
            version = "custom/1"

            [[rules]]
            document_type = "passport"
            keywords = ["passeport", "passport"]
            exclusions = ["titre"]
            min_matches = 1
            "#,
        )
        .unwrap();
        rule_set.validate().unwrap();
        assert_eq!(rule_set.rules.len(), 1);
        assert_eq!(rule_set.rules[0].document_type, DocumentType::Passport);
    }

    #[test]
    fn validate_rejects_broken_rules() {
        let mut rule_set = RuleSet::builtin();
        rule_set.rules[0].min_matches = 99;
        assert!(rule_set.validate().is_err());

        let mut rule_set = RuleSet::builtin();
        rule_set.rules[0].keywords = vec!["PASSEPORT".to_owned()];
        assert!(rule_set.validate().is_err());

        let mut rule_set = RuleSet::builtin();
        rule_set.rules[0].document_type = DocumentType::Unknown;
        assert!(rule_set.validate().is_err());
    }
}
