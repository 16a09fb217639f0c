//! Server-side helpers for reading tokens from HTTP requests

use http::HeaderMap;

/// Request header carrying the compact token
pub const TOKEN_HEADER: &str = "Token";

/// Extract the token from the `Token` header
///
/// Returns `None` if the header is absent, not visible ASCII, or blank.
///
/// # Example
/// ```
/// # use tokenward_auth::server::{TOKEN_HEADER, token_from_headers};
/// let mut headers = http::HeaderMap::new();
/// headers.insert(TOKEN_HEADER, "abc.def.ghi".parse().unwrap());
/// assert_eq!(token_from_headers(&headers), Some("abc.def.ghi"));
/// ```
pub fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(TOKEN_HEADER)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
