use tokio::sync::watch;
use uuid::Uuid;

use super::coordinator::AuthCoordinator;
use super::state::HandshakeStatus;
use crate::errors::{GatewayError, Result};
use crate::session::{ClientHandle, SessionBlob};

/// How a code or password submission ended
#[derive(Debug)]
pub enum LoginOutcome {
    /// Handshake finished. `session` is `None` when the platform had not
    /// flushed the session within the export budget; `warning` says so.
    Authorized {
        phone: String,
        session: Option<SessionBlob>,
        warning: Option<String>,
    },
    /// The account has two-factor auth; submit the password next
    PasswordRequired,
    /// The platform refused the login
    Rejected(String),
    /// The login did not settle within the budget or has disappeared
    Expired,
}

/// Drives a login from a code or password submission to an exported session.
///
/// Progress is read from the login's watch channel, never guessed from
/// elapsed time. Every wait is bounded by `poll_interval × poll_attempts`.
#[derive(Clone)]
pub struct LoginCompletion {
    coordinator: AuthCoordinator,
}

impl LoginCompletion {
    pub fn new(coordinator: AuthCoordinator) -> Self {
        Self { coordinator }
    }

    pub async fn submit_code(&self, phone: &str, code: &str) -> Result<LoginOutcome> {
        let (login_id, mut progress) = self
            .coordinator
            .login_progress(phone)
            .await
            .ok_or_else(|| GatewayError::NoPendingAuth(phone.to_string()))?;
        self.coordinator.submit_code(phone, code).await?;

        let status = self.settle(&mut progress, HandshakeStatus::settles_code).await;
        self.finish(phone, login_id, status).await
    }

    pub async fn submit_password(&self, phone: &str, password: &str) -> Result<LoginOutcome> {
        let (login_id, mut progress) = self
            .coordinator
            .login_progress(phone)
            .await
            .ok_or_else(|| GatewayError::NoPendingPassword(phone.to_string()))?;
        self.coordinator.submit_password(phone, password).await?;

        let status = self.settle(&mut progress, HandshakeStatus::is_terminal).await;
        self.finish(phone, login_id, status).await
    }

    /// Wait until the published status satisfies `settled`, or the budget runs out
    async fn settle(
        &self,
        progress: &mut watch::Receiver<HandshakeStatus>,
        settled: fn(&HandshakeStatus) -> bool,
    ) -> Option<HandshakeStatus> {
        let budget = self.coordinator.config().poll_budget();
        let waited = tokio::time::timeout(budget, progress.wait_for(settled))
            .await
            .map(|result| result.map(|status| status.clone()));
        match waited {
            Ok(Ok(status)) => Some(status),
            // Publisher is gone; its last word still counts
            Ok(Err(_)) => {
                let status = progress.borrow().clone();
                settled(&status).then_some(status)
            }
            Err(_) => None,
        }
    }

    async fn finish(
        &self,
        phone: &str,
        login_id: Uuid,
        status: Option<HandshakeStatus>,
    ) -> Result<LoginOutcome> {
        match status {
            Some(HandshakeStatus::PasswordRequired) => Ok(LoginOutcome::PasswordRequired),
            Some(HandshakeStatus::Completed) => {
                self.coordinator.clear_login(phone, login_id).await;
                match self.coordinator.take_client_for(phone, login_id).await {
                    Some(handle) => Ok(self.export(phone, handle).await),
                    None => {
                        log::warn!("Client for completed login {} of {} is gone", login_id, phone);
                        Ok(LoginOutcome::Expired)
                    }
                }
            }
            Some(HandshakeStatus::Failed(reason)) => {
                self.coordinator.clear_login(phone, login_id).await;
                Ok(LoginOutcome::Rejected(reason))
            }
            Some(_) | None => {
                log::warn!("Login {} of {} did not settle in time", login_id, phone);
                Ok(LoginOutcome::Expired)
            }
        }
    }

    /// Poll the handle's store until the platform has flushed the session
    async fn export(&self, phone: &str, handle: ClientHandle) -> LoginOutcome {
        let config = self.coordinator.config();
        for attempt in 1..=config.poll_attempts {
            match handle.export_session().await {
                Ok(session) => {
                    log::info!("Exported session for {} ({} bytes)", phone, session.len());
                    return LoginOutcome::Authorized {
                        phone: phone.to_string(),
                        session: Some(session),
                        warning: None,
                    };
                }
                Err(GatewayError::SessionUnavailable) => {}
                Err(e) => log::warn!("Session export for {} failed: {}", phone, e),
            }
            if attempt < config.poll_attempts {
                tokio::time::sleep(config.poll_interval).await;
            }
        }

        log::warn!("Session for {} was not flushed within {:?}", phone, config.poll_budget());
        LoginOutcome::Authorized {
            phone: phone.to_string(),
            session: None,
            warning: Some(GatewayError::SessionUnavailable.to_string()),
        }
    }
}
