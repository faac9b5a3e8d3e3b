//! Opaque identifier generation.
//!
//! Produces `PREFIX-BASE32UPPERCASE` strings over a visually unambiguous alphabet
//! (A-Z and 2-9, excluding 0, 1, I, O) using a cryptographically strong RNG.

use chrono::Utc;
use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

fn random_suffix(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect()
}

fn generate_id(prefix: &str, length: usize) -> String {
    format!("{prefix}-{}", random_suffix(length))
}

/// `ORD-YYYYMMDD-XXXXXXXX`, sorts roughly chronologically.
pub fn generate_order_ref() -> String {
    let date = Utc::now().format("%Y%m%d");
    format!("ORD-{date}-{}", random_suffix(8))
}

pub fn generate_session_key() -> String {
    generate_id("SESS", 12)
}

pub fn generate_line_id() -> String {
    generate_id("L", 8)
}

pub fn generate_issue_id() -> String {
    generate_id("ISS", 8)
}

pub fn generate_action_id() -> String {
    generate_id("ACT", 8)
}

pub fn generate_idempotency_key() -> String {
    generate_id("IDEM", 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_safe_alphabet(s: &str) {
        for c in s.chars() {
            assert!(
                c == '-' || ALPHABET.contains(&(c as u8)) || c.is_ascii_digit(),
                "unexpected character '{c}' in id '{s}'"
            );
        }
        assert!(!s.contains(['0', '1', 'I', 'O']));
    }

    #[test]
    fn session_key_has_expected_shape() {
        let key = generate_session_key();
        assert!(key.starts_with("SESS-"));
        assert_eq!(key.len(), "SESS-".len() + 12);
        assert_safe_alphabet(&key);
    }

    #[test]
    fn order_ref_is_date_prefixed() {
        let r = generate_order_ref();
        let today = Utc::now().format("ORD-%Y%m%d-").to_string();
        assert!(r.starts_with(&today), "{r} does not start with {today}");
        assert_eq!(r.len(), today.len() + 8);
    }

    #[test]
    fn idempotency_key_length() {
        let key = generate_idempotency_key();
        assert_eq!(key.len(), "IDEM-".len() + 16);
    }

    #[test]
    fn ids_are_not_trivially_repeating() {
        let a = generate_line_id();
        let b = generate_line_id();
        assert_ne!(a, b);
    }

    #[test]
    fn all_prefixes_shaped_correctly() {
        assert!(generate_line_id().starts_with("L-"));
        assert!(generate_issue_id().starts_with("ISS-"));
        assert!(generate_action_id().starts_with("ACT-"));
    }
}
