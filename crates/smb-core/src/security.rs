//! Webhook authentication helpers.

/// Compare two secrets without short-circuiting on the first differing byte.
pub fn constant_time_eq(left: &str, right: &str) -> bool {
    let left_bytes = left.as_bytes();
    let right_bytes = right.as_bytes();
    if left_bytes.len() != right_bytes.len() {
        return false;
    }

    let mut diff = 0_u8;
    for (a, b) in left_bytes.iter().zip(right_bytes.iter()) {
        diff |= *a ^ *b;
    }
    diff == 0
}

/// Check a webhook secret header against the configured secret.
///
/// A missing header or an empty configured secret never authenticates.
pub fn verify_secret_token(provided: Option<&str>, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    provided.is_some_and(|token| constant_time_eq(token, expected))
}
