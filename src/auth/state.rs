use chrono::{DateTime, Utc};

/// Progress of a phone's login as seen by the rest of the gateway
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub phone: String,
    /// Set once the platform reports the verification code was sent
    pub phone_hash: Option<String>,
    needs_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn new(phone: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            phone: phone.into(),
            phone_hash: None,
            needs_password: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn needs_password(&self) -> bool {
        self.needs_password
    }

    /// Only ever moves false to true
    pub fn mark_needs_password(&mut self) {
        self.needs_password = true;
        self.touch();
    }

    pub fn record_phone_hash(&mut self, hash: impl Into<String>) {
        self.phone_hash = Some(hash.into());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Status published by a handshake task as it progresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeStatus {
    Starting,
    AwaitingCode,
    PasswordRequired,
    Completed,
    Failed(String),
}

impl HandshakeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeStatus::Completed | HandshakeStatus::Failed(_))
    }

    /// States a code submitter waits for
    pub fn settles_code(&self) -> bool {
        matches!(self, HandshakeStatus::PasswordRequired) || self.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_password_is_monotonic() {
        let mut session = AuthSession::new("+15550100");
        assert!(!session.needs_password());
        session.mark_needs_password();
        session.mark_needs_password();
        assert!(session.needs_password());
        assert!(session.updated_at >= session.created_at);
    }

    #[test]
    fn test_status_classification() {
        assert!(!HandshakeStatus::AwaitingCode.settles_code());
        assert!(HandshakeStatus::PasswordRequired.settles_code());
        assert!(!HandshakeStatus::PasswordRequired.is_terminal());
        assert!(HandshakeStatus::Completed.is_terminal());
        assert!(HandshakeStatus::Failed("PHONE_CODE_INVALID".into()).is_terminal());
    }
}
