/// Errors raised by a session store
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Session store I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Session store path is not usable: {0}")]
    InvalidPath(String),
}

/// Errors reported by the messaging platform client
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlatformError {
    #[error("Platform RPC error {code}: {message}")]
    Rpc { code: i32, message: String },
    #[error("Client is not authorized")]
    Unauthorized,
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Handshake cancelled: {0}")]
    Cancelled(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("Session storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for PlatformError {
    fn from(e: StorageError) -> Self {
        PlatformError::Storage(e.to_string())
    }
}

impl PlatformError {
    pub fn rpc(code: i32, message: impl Into<String>) -> Self {
        PlatformError::Rpc {
            code,
            message: message.into(),
        }
    }
}

/// Errors that can occur while coordinating logins and serving requests
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to create client: {0}")]
    ClientCreation(#[source] PlatformError),
    #[error("No pending auth for phone {0}")]
    NoPendingAuth(String),
    #[error("No pending password request for phone {0}")]
    NoPendingPassword(String),
    #[error("A value is already waiting to be consumed for phone {0}")]
    AlreadySubmitted(String),
    #[error("Invalid session data: {0}")]
    InvalidSession(String),
    #[error("Session data is not available yet")]
    SessionUnavailable,
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, std::time::Duration),
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl GatewayError {
    /// Whether the error was caused by the caller's input rather than the platform
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GatewayError::NoPendingAuth(_)
                | GatewayError::NoPendingPassword(_)
                | GatewayError::AlreadySubmitted(_)
                | GatewayError::InvalidSession(_)
        )
    }
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
