use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use super::coordinator::AuthShared;
use super::rendezvous::SlotKind;
use super::state::HandshakeStatus;
use crate::errors::PlatformError;
use crate::platform::{HandshakeCallbacks, SentCode, TermsOfService, UserInfo};

/// Name registered when the platform asks to sign up a new account
const SIGN_UP_FIRST_NAME: &str = "Symbian";
const SIGN_UP_LAST_NAME: &str = "User";

/// Answers the platform's handshake questions for one login.
///
/// Every write goes to state tagged with this login's id, so a handshake that
/// was replaced by a newer login for the same phone cannot disturb it.
pub struct PhoneAuthenticator {
    phone: String,
    login_id: Uuid,
    shared: Arc<AuthShared>,
    progress: Arc<watch::Sender<HandshakeStatus>>,
}

impl PhoneAuthenticator {
    pub(crate) fn new(
        phone: String,
        login_id: Uuid,
        shared: Arc<AuthShared>,
        progress: Arc<watch::Sender<HandshakeStatus>>,
    ) -> Self {
        Self {
            phone,
            login_id,
            shared,
            progress,
        }
    }

    async fn wait_for(&self, kind: SlotKind) -> Result<String, PlatformError> {
        self.shared
            .channels
            .wait(&self.phone, self.login_id, kind)
            .await
            .ok_or_else(|| PlatformError::Cancelled(format!("login for {} was closed", self.phone)))
    }
}

#[async_trait]
impl HandshakeCallbacks for PhoneAuthenticator {
    async fn phone(&self) -> Result<String, PlatformError> {
        Ok(self.phone.clone())
    }

    async fn code(&self, sent: &SentCode) -> Result<String, PlatformError> {
        let login_id = self.login_id;
        self.shared
            .sessions
            .with_entry(&self.phone, |pending| {
                if pending.login_id == login_id {
                    pending.session.record_phone_hash(sent.phone_code_hash.clone());
                }
            })
            .await;
        self.progress.send_replace(HandshakeStatus::AwaitingCode);
        log::info!(
            "Verification code ({} digits) sent to {}, waiting for submission",
            sent.code_length,
            self.phone
        );

        self.wait_for(SlotKind::Code).await
    }

    async fn password(&self) -> Result<String, PlatformError> {
        // The slot must exist before anyone can observe needs_password
        if !self.shared.channels.open_password(&self.phone, self.login_id).await {
            return Err(PlatformError::Cancelled(format!(
                "login for {} was replaced",
                self.phone
            )));
        }
        let login_id = self.login_id;
        self.shared
            .sessions
            .with_entry(&self.phone, |pending| {
                if pending.login_id == login_id {
                    pending.session.mark_needs_password();
                }
            })
            .await;
        self.progress.send_replace(HandshakeStatus::PasswordRequired);
        log::info!("Two-factor password required for {}", self.phone);

        self.wait_for(SlotKind::Password).await
    }

    async fn accept_terms_of_service(&self, tos: &TermsOfService) -> Result<(), PlatformError> {
        log::info!("Accepting terms of service {} for {}", tos.id, self.phone);
        Ok(())
    }

    async fn sign_up(&self) -> Result<UserInfo, PlatformError> {
        log::info!("Registering new account for {}", self.phone);
        Ok(UserInfo {
            first_name: SIGN_UP_FIRST_NAME.to_string(),
            last_name: SIGN_UP_LAST_NAME.to_string(),
        })
    }
}
