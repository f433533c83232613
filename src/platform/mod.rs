//! Boundary to the messaging platform client library.
//!
//! The gateway never talks to the platform directly; it goes through
//! [`Platform`] to allocate clients and [`PlatformClient`] to use them. A
//! client reads and writes its authorization through the [`SessionStorage`]
//! it was connected with, which is how sessions are exported and imported.

pub mod normalize;
pub mod sandbox;
pub mod wire;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::PlatformError;
use crate::session::SessionStorage;
use wire::{DialogsResponse, HistoryResponse, SentMessageResponse, UpdatesEnvelope};

/// Details of a verification code the platform has just sent
#[derive(Debug, Clone)]
pub struct SentCode {
    pub phone_code_hash: String,
    pub code_length: usize,
}

#[derive(Debug, Clone)]
pub struct TermsOfService {
    pub id: String,
    pub text: String,
}

/// Profile used when the platform asks to register a new account
#[derive(Debug, Clone, PartialEq)]
pub struct UserInfo {
    pub first_name: String,
    pub last_name: String,
}

/// Values the platform asks for while running a login handshake.
///
/// `code` and `password` may block for as long as it takes a user to supply
/// the value from another request. Every other method returns immediately.
#[async_trait]
pub trait HandshakeCallbacks: Send + Sync {
    async fn phone(&self) -> Result<String, PlatformError>;

    /// Blocks until the verification code is delivered
    async fn code(&self, sent: &SentCode) -> Result<String, PlatformError>;

    /// Blocks until the two-factor password is delivered
    async fn password(&self) -> Result<String, PlatformError>;

    async fn accept_terms_of_service(&self, tos: &TermsOfService) -> Result<(), PlatformError>;

    async fn sign_up(&self) -> Result<UserInfo, PlatformError>;
}

/// Allocates platform clients
#[async_trait]
pub trait Platform: Send + Sync {
    /// Create a client whose authorization lives in `storage`.
    ///
    /// An empty storage yields an unauthorized client; a populated one must
    /// hold a session previously written by this platform.
    async fn connect(
        &self,
        storage: Arc<dyn SessionStorage>,
    ) -> Result<Arc<dyn PlatformClient>, PlatformError>;
}

/// One connected platform client
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Run the login handshake if the client is not authorized yet.
    ///
    /// On success the authorization has been (or is about to be) written to
    /// the client's session storage.
    async fn run_handshake(
        &self,
        callbacks: Arc<dyn HandshakeCallbacks>,
    ) -> Result<(), PlatformError>;

    async fn fetch_dialogs(&self, limit: usize) -> Result<DialogsResponse, PlatformError>;

    async fn fetch_history(
        &self,
        chat_id: i64,
        limit: usize,
    ) -> Result<HistoryResponse, PlatformError>;

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        random_id: i64,
    ) -> Result<SentMessageResponse, PlatformError>;

    async fn mark_read(&self, chat_id: i64, max_id: i32) -> Result<(), PlatformError>;

    /// Download the largest available size of the photo attached to a message
    async fn fetch_media(&self, chat_id: i64, message_id: i32) -> Result<Vec<u8>, PlatformError>;

    /// Subscribe to the live update stream of this client
    async fn updates(&self) -> Result<mpsc::Receiver<UpdatesEnvelope>, PlatformError>;
}
