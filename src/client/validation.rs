//! 端点校验：在任何网络或缓存访问之前拒绝非法的请求路径。
//!
//! Endpoint validation.

use crate::ApiError;
use once_cell::sync::Lazy;
use regex::Regex;

static ABSOLUTE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").expect("absolute-url pattern is valid")
});

/// Checks an endpoint path before it is joined onto the base URL.
///
/// `url` is only used to label the returned error.
pub(crate) fn validate_endpoint(endpoint: &str, url: &str) -> Result<(), ApiError> {
    let reject = |reason: &str| {
        Err(ApiError::validation(
            format!("Invalid endpoint '{}': {}", endpoint, reason),
            url,
        )
        .with_details(serde_json::json!({ "endpoint": endpoint, "reason": reason })))
    };

    if endpoint.is_empty() {
        return reject("must not be empty");
    }
    if ABSOLUTE_URL.is_match(endpoint) || endpoint.starts_with("//") {
        return reject("must be a path, not an absolute URL");
    }
    if !endpoint.starts_with('/') {
        return reject("must start with '/'");
    }
    if endpoint.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return reject("must not contain whitespace or control characters");
    }
    let path = endpoint.split(['?', '#']).next().unwrap_or(endpoint);
    if path.split('/').any(|segment| segment == "..") {
        return reject("must not contain '..' segments");
    }
    Ok(())
}
