use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;

use crate::errors::GatewayError;

/// Opaque authenticated-session state.
///
/// Nothing in the gateway looks inside the bytes; they are produced by the
/// platform, carried to the caller as base64 text and handed back on every
/// request that needs an authorized client.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionBlob(Bytes);

impl SessionBlob {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Decode transport text; empty or malformed input is an invalid session
    pub fn from_base64(encoded: &str) -> Result<Self, GatewayError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(GatewayError::InvalidSession("session data is empty".to_string()));
        }
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|e| GatewayError::InvalidSession(format!("failed to decode session data: {}", e)))?;
        if decoded.is_empty() {
            return Err(GatewayError::InvalidSession("session data is empty".to_string()));
        }
        Ok(Self(Bytes::from(decoded)))
    }
}

impl fmt::Debug for SessionBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionBlob(<{} bytes>)", self.0.len())
    }
}
