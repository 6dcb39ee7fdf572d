//! Text normalization for name matching.
//!
//! OCR output for scanned documents is noisy: casing is unreliable, accents
//! come and go depending on scan quality, and punctuation gets garbled. We
//! reduce both the haystack and the needle to a common form before doing any
//! substring matching.
//!
//! Note that the document classifier does NOT use this normalizer. Keyword
//! lists carry accented and unaccented variants explicitly, so the classifier
//! only lowercases. See [`crate::classify`].

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Normalize text for accent- and case-insensitive substring matching.
///
/// Decomposes to NFD and drops combining marks ("é" → "e", "ç" → "c"),
/// lowercases, then keeps only ASCII letters, hyphens, and spaces. A
/// transliteration table would miss precomposed characters that only NFD
/// splits correctly, so we rely on canonical decomposition.
///
/// The result of this function is a fixed point: normalizing twice returns
/// the same string as normalizing once.
pub fn normalize(text: &str) -> String {
    let stripped = text
        .nfd()
        .filter(|&c| !is_combining_mark(c))
        .collect::<String>()
        .to_lowercase();
    stripped
        .chars()
        .filter(|c| c.is_ascii_lowercase() || *c == '-' || *c == ' ')
        .collect::<String>()
        .trim()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_accents_and_lowercases() {
        assert_eq!(normalize("RÉPUBLIQUE FRANÇAISE"), "republique francaise");
        assert_eq!(normalize("François Müller"), "francois muller");
        assert_eq!(normalize("Noël-Éloïse"), "noel-eloise");
    }

    #[test]
    fn removes_punctuation_and_digits() {
        assert_eq!(normalize("DUPONT, Jean (1987)"), "dupont jean");
        assert_eq!(normalize("No12-AB345"), "no-ab");
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(normalize("  Dupont  "), "dupont");
        // Characters removed at the edges must not leave stray spaces behind.
        assert_eq!(normalize("12 Dupont 34"), "dupont");
    }

    #[test]
    fn is_idempotent() {
        for s in [
            "RÉPUBLIQUE FRANÇAISE",
            "  Carte nationale d'identité  ",
            "12 Dupont 34",
            "",
            "çàéîoù",
        ] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("  \t\n "), "");
        assert_eq!(normalize("1234 !?"), "");
    }
}
