//! Query normalization and hashing for the anti-repetition short-circuit
//!
//! Normalization is pinned as: trim, Unicode-lowercase, strip every
//! character that is neither alphanumeric nor whitespace, collapse
//! whitespace runs to a single space. The hash is the hex SHA-256 digest of
//! the normalized text. Two messages that differ only in case, punctuation,
//! or spacing therefore hash identically.

use sha2::{Digest, Sha256};

/// Normalize a user message for dedup comparison
pub fn normalize(message: &str) -> String {
    let filtered: String = message
        .trim()
        .chars()
        .flat_map(|c| c.to_lowercase())
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hex SHA-256 of the normalized message
pub fn query_hash(message: &str) -> String {
    digest_hex(normalize(message).as_bytes())
}

/// Hex SHA-256 of arbitrary content (summary dedup)
pub fn content_hash(content: &str) -> String {
    digest_hex(content.as_bytes())
}

fn digest_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_noise() {
        assert_eq!(
            normalize("  Give me a  FULL financial summary!!  "),
            "give me a full financial summary"
        );
    }

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize("what's up?"), "what s up");
    }

    #[test]
    fn test_equivalent_messages_hash_identically() {
        assert_eq!(
            query_hash("Give me a full financial summary"),
            query_hash("give me a FULL financial summary!")
        );
    }

    #[test]
    fn test_distinct_messages_hash_differently() {
        assert_ne!(query_hash("summary please"), query_hash("anomalies please"));
    }

    #[test]
    fn test_hash_shape() {
        let hash = query_hash("hello");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_normalize_is_idempotent(message in ".{0,80}") {
                let once = normalize(&message);
                prop_assert_eq!(normalize(&once), once.clone());
            }

            #[test]
            fn prop_hash_ignores_surrounding_whitespace(message in "[a-z ]{0,40}") {
                let padded = format!("  {message}\t");
                prop_assert_eq!(query_hash(&message), query_hash(&padded));
            }
        }
    }
}
