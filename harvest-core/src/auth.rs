//! Bearer-token header handling.

const BEARER_PREFIX: &str = "bearer ";

/// Normalise a token to exactly one `Bearer ` prefix.
///
/// Any number of leading case-insensitive `bearer ` prefixes are stripped
/// before the canonical one is added, so `"bearer Bearer abc"` and `"abc"`
/// both yield `"Bearer abc"`. Returns `None` for an empty token.
pub fn bearer(token: &str) -> Option<String> {
    let mut rest = token.trim();
    while rest.len() >= BEARER_PREFIX.len()
        && rest.is_char_boundary(BEARER_PREFIX.len())
        && rest[..BEARER_PREFIX.len()].eq_ignore_ascii_case(BEARER_PREFIX)
    {
        rest = rest[BEARER_PREFIX.len()..].trim_start();
    }
    if rest.is_empty() || rest.eq_ignore_ascii_case(BEARER_PREFIX.trim_end()) {
        None
    } else {
        Some(format!("Bearer {rest}"))
    }
}

/// Authorization header pair for `token`, or nothing when the token is empty.
pub fn auth_headers(token: &str) -> Vec<(String, String)> {
    bearer(token)
        .map(|value| vec![("Authorization".to_string(), value)])
        .unwrap_or_default()
}

