//! API key extraction from request headers.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

use crate::error::ServiceError;

/// Header carrying a bare API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Reads the caller's API key from `x-api-key` or `Authorization: Bearer`.
///
/// Returns `Ok(None)` when neither header is present.
///
/// # Errors
///
/// An authentication error when a header is present but unusable.
pub fn api_key_from_headers(headers: &HeaderMap) -> Result<Option<String>, ServiceError> {
    if let Some(value) = headers.get(API_KEY_HEADER) {
        let key = value
            .to_str()
            .map_err(|_| ServiceError::authentication("x-api-key header is not valid text"))?
            .trim();
        if key.is_empty() {
            return Err(ServiceError::authentication("x-api-key header is empty"));
        }
        return Ok(Some(key.to_string()));
    }

    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ServiceError::authentication("Authorization header is not valid text"))?;
    let token = value
        .split_once(' ')
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            ServiceError::authentication("Authorization header must be 'Bearer <key>'")
        })?;
    Ok(Some(token.to_string()))
}

/// Like [`api_key_from_headers`], but a missing key is an error.
///
/// # Errors
///
/// An authentication error naming `purpose` when no key was sent.
pub fn require_api_key(headers: &HeaderMap, purpose: &str) -> Result<String, ServiceError> {
    api_key_from_headers(headers)?
        .ok_or_else(|| ServiceError::authentication(format!("{purpose} requires an API key")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;
    use crate::error::ErrorKind;

    fn headers(name: &'static str, value: &'static str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(name, HeaderValue::from_static(value));
        map
    }

    #[test]
    fn test_reads_x_api_key() {
        let key = api_key_from_headers(&headers("x-api-key", " sk-1 ")).unwrap();
        assert_eq!(key.as_deref(), Some("sk-1"));
    }

    #[test]
    fn test_reads_bearer_token() {
        let key = api_key_from_headers(&headers("authorization", "Bearer sk-2")).unwrap();
        assert_eq!(key.as_deref(), Some("sk-2"));
    }

    #[test]
    fn test_rejects_other_schemes() {
        let err = api_key_from_headers(&headers("authorization", "Basic abc")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
    }

    #[test]
    fn test_missing_key() {
        assert!(api_key_from_headers(&HeaderMap::new()).unwrap().is_none());
        let err = require_api_key(&HeaderMap::new(), "audio conversion").unwrap_err();
        assert_eq!(err.message, "audio conversion requires an API key");
    }
}
