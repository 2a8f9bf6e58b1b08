//! Masking of credentials in request logs.
//!
//! The run token travels in a header on every call, so request headers are
//! always passed through [`mask_headers`] before they reach `tracing`.

use http::header::{HeaderMap, HeaderValue};
use std::sync::atomic::{AtomicBool, Ordering};
use url::Url;

const MASK: &str = "*****";

static MASK_SENSITIVE: AtomicBool = AtomicBool::new(true);

/// Sets whether sensitive data should be masked in logs.
pub fn set_mask_sensitive(enabled: bool) {
    MASK_SENSITIVE.store(enabled, Ordering::Relaxed);
}

pub fn should_mask_sensitive() -> bool {
    MASK_SENSITIVE.load(Ordering::Relaxed)
}

/// Query parameter names to mask (case-insensitive comparison).
const SENSITIVE_QUERY_PARAMS: &[&str] = &["runtoken", "run_token", "token", "api_key", "password"];

/// Header names to mask (case-insensitive comparison).
const SENSITIVE_HEADERS: &[&str] = &[
    crate::http::RUN_TOKEN_HEADER,
    "authorization",
    "cookie",
];

/// Masks sensitive query parameters in a URL.
///
/// ```
/// use url::Url;
/// use backslash_core::masking::mask_url;
///
/// let url = Url::parse("https://bs.example.com/rest/sessions?token=secret&page=1").unwrap();
/// let masked = mask_url(&url);
/// assert!(masked.as_str().contains("token=*****"));
/// assert!(masked.as_str().contains("page=1"));
/// ```
pub fn mask_url(url: &Url) -> Url {
    let mut masked_url = url.clone();
    if !should_mask_sensitive() {
        return masked_url;
    }

    let Some(query) = url.query() else {
        return masked_url;
    };

    // Work on the raw query string so the original encoding survives.
    let masked_query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if is_sensitive(key, SENSITIVE_QUERY_PARAMS) => format!("{key}={MASK}"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");

    masked_url.set_query(Some(&masked_query));
    masked_url
}

/// Masks sensitive header values.
pub fn mask_headers(headers: &HeaderMap) -> HeaderMap {
    if !should_mask_sensitive() {
        return headers.clone();
    }

    let mut masked = HeaderMap::new();
    for (name, value) in headers.iter() {
        let value = if is_sensitive(name.as_str(), SENSITIVE_HEADERS) {
            HeaderValue::from_static(MASK)
        } else {
            value.clone()
        };
        masked.append(name.clone(), value);
    }
    masked
}

fn is_sensitive(name: &str, sensitive: &[&str]) -> bool {
    sensitive.iter().any(|s| name.eq_ignore_ascii_case(s))
}
