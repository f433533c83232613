use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::error::ApiError;
use super::AppState;
use crate::session::{ClientHandle, SessionBlob};

pub const PHONE_HEADER: &str = "x-phone";
pub const SESSION_HEADER: &str = "x-session-data";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Phone and session taken from the `X-Phone` / `X-Session-Data` headers
#[derive(Debug, Clone)]
pub struct SessionHeaders {
    pub phone: String,
    pub session: SessionBlob,
}

impl SessionHeaders {
    /// `None` when either header is absent
    pub fn from_headers(headers: &HeaderMap) -> Result<Option<Self>, ApiError> {
        let (Some(phone), Some(session)) = (header(headers, PHONE_HEADER), header(headers, SESSION_HEADER))
        else {
            return Ok(None);
        };
        let session = SessionBlob::from_base64(session)?;
        Ok(Some(Self {
            phone: phone.to_string(),
            session,
        }))
    }

    /// Decode a query token holding base64 of `phone:session_data`
    pub fn from_token(token: &str) -> Result<Self, ApiError> {
        let decoded = STANDARD
            .decode(token.trim())
            .map_err(|_| ApiError::Unauthorized("Invalid token"))?;
        let decoded = String::from_utf8(decoded).map_err(|_| ApiError::Unauthorized("Invalid token"))?;
        let (phone, session) = decoded
            .split_once(':')
            .ok_or(ApiError::Unauthorized("Invalid token format"))?;
        let session = SessionBlob::from_base64(session)?;
        Ok(Self {
            phone: phone.to_string(),
            session,
        })
    }
}

impl FromRequestParts<AppState> for SessionHeaders {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)?
            .ok_or(ApiError::Unauthorized("Missing authentication headers"))
    }
}

/// Transient client built from the request's session headers
pub struct AuthenticatedClient {
    pub phone: String,
    pub handle: ClientHandle,
}

impl FromRequestParts<AppState> for AuthenticatedClient {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let SessionHeaders { phone, session } = SessionHeaders::from_request_parts(parts, state).await?;
        let handle = state.factory.create_client_from_blob(&session).await?;
        log::debug!("Authenticated request for {}", phone);
        Ok(Self { phone, handle })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_splits_on_first_colon() {
        let session = SessionBlob::new(b"{\"k\":1}".to_vec()).to_base64();
        let token = STANDARD.encode(format!("+15550100:{}", session));
        let parsed = SessionHeaders::from_token(&token).expect("token should parse");
        assert_eq!(parsed.phone, "+15550100");
        assert_eq!(parsed.session.as_bytes(), b"{\"k\":1}");
    }

    #[test]
    fn test_token_without_colon_is_rejected() {
        let token = STANDARD.encode("no-separator");
        assert!(matches!(
            SessionHeaders::from_token(&token),
            Err(ApiError::Unauthorized("Invalid token format"))
        ));
        assert!(matches!(
            SessionHeaders::from_token("%%%"),
            Err(ApiError::Unauthorized("Invalid token"))
        ));
    }

    #[test]
    fn test_headers_require_both_values() {
        let mut headers = HeaderMap::new();
        headers.insert(PHONE_HEADER, HeaderValue::from_static("+15550100"));
        assert!(SessionHeaders::from_headers(&headers).expect("no error").is_none());

        headers.insert(SESSION_HEADER, HeaderValue::from_static("e30="));
        let parsed = SessionHeaders::from_headers(&headers)
            .expect("no error")
            .expect("both headers present");
        assert_eq!(parsed.session.as_bytes(), b"{}");
    }
}
