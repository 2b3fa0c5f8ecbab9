//! `Cookie` header parsing and `Set-Cookie` serialization.

use axum::http::{header::COOKIE, HeaderMap};
use std::collections::HashMap;

/// Attributes applied to every cookie this service writes
#[derive(Debug, Clone, Copy)]
pub struct CookieAttributes {
    pub max_age_secs: i64,
    pub secure: bool,
}

/// Parse every `Cookie` header into a name → value map.
///
/// Values are percent-decoded; a value that fails to decode is kept raw. When
/// a name repeats, the first occurrence wins.
pub fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();

    for header in headers.get_all(COOKIE) {
        let Ok(header) = header.to_str() else {
            continue;
        };

        for pair in header.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };

            let value = urlencoding::decode(value)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| value.to_string());
            cookies.entry(name.trim().to_string()).or_insert(value);
        }
    }

    cookies
}

/// Serialize a `Set-Cookie` value.
///
/// Always `Path=/`, `SameSite=Lax` and `HttpOnly`; `Secure` when requested.
pub fn serialize_cookie(name: &str, value: &str, attributes: CookieAttributes) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; SameSite=Lax; HttpOnly; Max-Age={}",
        name,
        urlencoding::encode(value),
        attributes.max_age_secs.max(0)
    );

    if attributes.secure {
        cookie.push_str("; Secure");
    }

    cookie
}
