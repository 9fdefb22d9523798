//! HMAC helpers shared by the processor adapters.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 over the concatenation of `parts` and return it hex-encoded.
///
/// # Panics
///
/// Never panics in practice: HMAC-SHA256 accepts keys of any size per RFC 2104.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, parts: &[&[u8]]) -> String {
    // INVARIANT: `new_from_slice` only fails for fixed-size MACs.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    for part in parts {
        mac.update(part);
    }
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time string comparison to prevent timing attacks.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Parse a `k=v` list such as `t=1,v1=abc` into pairs, skipping malformed items.
pub fn header_pairs(header: &str, separator: char) -> impl Iterator<Item = (&str, &str)> {
    header
        .split(separator)
        .filter_map(|part| part.trim().split_once('='))
}

/// Whether a signature made at `signed_at` is at most `tolerance` seconds from `now`.
///
/// Timestamps so far off that the distance overflows are out of tolerance.
#[must_use]
pub fn within_tolerance(now: i64, signed_at: i64, tolerance: i64) -> bool {
    now.checked_sub(signed_at)
        .and_then(i64::checked_abs)
        .is_some_and(|skew| skew <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_matches_known_vector() {
        let result = hmac_sha256_hex(
            "key",
            &[b"The quick brown fox jumps over the lazy dog"],
        );
        assert_eq!(
            result,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn parts_are_concatenated() {
        assert_eq!(
            hmac_sha256_hex("secret", &[b"12", b".", b"body"]),
            hmac_sha256_hex("secret", &[b"12.body"])
        );
    }

    #[test]
    fn constant_time_eq_compares_content_and_length() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(constant_time_eq("", ""));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
        assert!(!constant_time_eq("abc", "ABC"));
    }

    #[test]
    fn tolerance_is_symmetric_and_saturates() {
        assert!(within_tolerance(1_000, 700, 300));
        assert!(within_tolerance(1_000, 1_300, 300));
        assert!(!within_tolerance(1_000, 1_301, 300));
        assert!(!within_tolerance(1_000, i64::MIN, 300));
        assert!(!within_tolerance(-1, i64::MAX, 300));
    }

    #[test]
    fn header_pairs_skip_garbage() {
        let pairs: Vec<_> = header_pairs("t=1, v1=aa,junk,v0=bb", ',').collect();
        assert_eq!(pairs, vec![("t", "1"), ("v1", "aa"), ("v0", "bb")]);
    }
}
