//! ISO 639 language code comparison
//!
//! Containers mix two-letter (639-1), terminological (639-2/T) and
//! bibliographic (639-2/B) codes, sometimes with a region suffix. Codes are
//! compared after folding all three forms onto the 639-2/T code.

/// (639-1, 639-2/T, 639-2/B)
const LANGUAGES: &[(&str, &str, &str)] = &[
    ("ar", "ara", "ara"),
    ("cs", "ces", "cze"),
    ("da", "dan", "dan"),
    ("de", "deu", "ger"),
    ("el", "ell", "gre"),
    ("en", "eng", "eng"),
    ("es", "spa", "spa"),
    ("fa", "fas", "per"),
    ("fi", "fin", "fin"),
    ("fr", "fra", "fre"),
    ("he", "heb", "heb"),
    ("hi", "hin", "hin"),
    ("hu", "hun", "hun"),
    ("is", "isl", "ice"),
    ("it", "ita", "ita"),
    ("ja", "jpn", "jpn"),
    ("ko", "kor", "kor"),
    ("nl", "nld", "dut"),
    ("no", "nor", "nor"),
    ("pl", "pol", "pol"),
    ("pt", "por", "por"),
    ("ro", "ron", "rum"),
    ("ru", "rus", "rus"),
    ("sk", "slk", "slo"),
    ("sv", "swe", "swe"),
    ("th", "tha", "tha"),
    ("tr", "tur", "tur"),
    ("uk", "ukr", "ukr"),
    ("vi", "vie", "vie"),
    ("zh", "zho", "chi"),
];

/// Fold a language code to its canonical lower-case form
///
/// Known codes map to 639-2/T; unknown codes are returned lower-cased with any
/// region suffix stripped.
pub fn canonical(code: &str) -> String {
    let base = code
        .trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|(one, t, b)| *one == base || *t == base || *b == base)
        .map(|(_, t, _)| (*t).to_string())
        .unwrap_or(base)
}

/// True when both codes name the same language; empty codes never match
pub fn languages_match(a: &str, b: &str) -> bool {
    let a = canonical(a);
    !a.is_empty() && a == canonical(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_and_three_letter_forms_match() {
        assert!(languages_match("en", "eng"));
        assert!(languages_match("ger", "de"));
        assert!(languages_match("DEU", "ger"));
        assert!(languages_match("pt-BR", "por"));
        assert!(!languages_match("eng", "jpn"));
    }

    #[test]
    fn test_empty_never_matches() {
        assert!(!languages_match("", ""));
        assert!(!languages_match("eng", ""));
    }

    #[test]
    fn test_unknown_codes_compare_verbatim() {
        assert!(languages_match("tlh", "TLH"));
        assert!(!languages_match("tlh", "qya"));
    }
}
