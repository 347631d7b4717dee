use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Canonical form of a question used for both cache keys and embedding input:
/// NFC-normalized, lowercased, whitespace collapsed to single spaces.
pub fn normalize_question(question: &str) -> String {
    question
        .nfc()
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex-encoded SHA-256 fingerprint of the normalized question. Derived value;
/// two questions differing only in case or spacing share a fingerprint.
pub fn question_fingerprint(question: &str) -> String {
    let normalized = normalize_question(question);
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_collapses_whitespace_and_case() {
        assert_eq!(
            normalize_question("  What   IS\tthe refund\npolicy? "),
            "what is the refund policy?"
        );
    }

    #[test]
    fn test_equivalent_questions_share_fingerprint() {
        let a = question_fingerprint("What is the refund policy?");
        let b = question_fingerprint("  what IS the   refund policy?");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_questions_differ() {
        let a = question_fingerprint("What is the refund policy?");
        let b = question_fingerprint("What is the vacation policy?");
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = question_fingerprint("anything");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
