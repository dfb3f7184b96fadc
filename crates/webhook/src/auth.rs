//! Inbound request authentication.

use axum::http::{HeaderMap, header::AUTHORIZATION};

/// Vendor header checked before `Authorization`.
pub const TOKEN_HEADER: &str = "x-hookrelay-token";

/// Compare two byte strings in time independent of where they differ.
///
/// Length differences do not short-circuit: every byte position up to the
/// longer input is visited.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());
    let mut diff = a.len() ^ b.len();
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= usize::from(x ^ y);
    }
    diff == 0
}

/// The token presented by the caller: the vendor header if present and
/// non-empty, otherwise an `Authorization: Bearer` credential.
#[must_use]
pub fn presented_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(token);
    }

    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

/// Whether `headers` carry `expected`. An empty `expected` never validates.
#[must_use]
pub fn validate_bearer_token(headers: &HeaderMap, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    presented_token(headers).is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, axum::http::HeaderValue, rstest::rstest};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn constant_time_eq_cases() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(constant_time_eq(b"", b""));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(!constant_time_eq(b"abc\0", b"abc"));
        assert!(!constant_time_eq(b"", b"a"));
    }

    #[rstest]
    #[case(&[("authorization", "Bearer s3cret")], true)]
    #[case(&[("authorization", "bearer s3cret")], true)]
    #[case(&[("x-hookrelay-token", "s3cret")], true)]
    #[case(&[("x-hookrelay-token", "s3cret"), ("authorization", "Bearer wrong")], true)]
    #[case(&[("x-hookrelay-token", "wrong"), ("authorization", "Bearer s3cret")], false)]
    #[case(&[("x-hookrelay-token", " "), ("authorization", "Bearer s3cret")], true)]
    #[case(&[("authorization", "Bearer wrong")], false)]
    #[case(&[("authorization", "Basic s3cret")], false)]
    #[case(&[("authorization", "Bearer")], false)]
    #[case(&[("authorization", "s3cret")], false)]
    #[case(&[], false)]
    fn bearer_validation(#[case] pairs: &[(&'static str, &'static str)], #[case] ok: bool) {
        assert_eq!(validate_bearer_token(&headers(pairs), "s3cret"), ok);
    }

    #[test]
    fn configured_token_with_trailing_newline_matches() {
        let cfg = crate::config::WebhookAccountConfig::from_value(serde_json::json!({
            "inbound": { "token": "s3cret\n" }
        }))
        .unwrap();
        let expected = cfg.inbound.token().unwrap();
        assert!(validate_bearer_token(&headers(&[("authorization", "Bearer s3cret")]), expected));
    }

    #[test]
    fn empty_expected_token_never_matches() {
        assert!(!validate_bearer_token(&headers(&[("authorization", "Bearer ")]), ""));
    }
}
