use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::blob::SessionBlob;
use super::storage::{FileSessionStorage, SessionStorage};
use crate::config::GatewayConfig;
use crate::errors::{GatewayError, PlatformError, Result, StorageError};
use crate::models::{Dialog, Message};
use crate::platform::{normalize, Platform, PlatformClient};

/// Run a platform call under a deadline
pub(crate) async fn bounded<T, F>(op: &'static str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, PlatformError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(GatewayError::from),
        Err(_) => Err(GatewayError::Timeout(op, limit)),
    }
}

/// One platform client together with the file holding its session.
///
/// The handle is the sole owner of that file: dropping the handle deletes it.
pub struct ClientHandle {
    client: Arc<dyn PlatformClient>,
    storage: Arc<FileSessionStorage>,
    call_timeout: Duration,
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("session_path", &self.storage.path())
            .field("client", &"<platform_client>")
            .finish()
    }
}

impl ClientHandle {
    pub fn client(&self) -> Arc<dyn PlatformClient> {
        self.client.clone()
    }

    pub fn session_path(&self) -> &Path {
        self.storage.path()
    }

    /// Read the session the platform has written so far
    pub async fn export_session(&self) -> Result<SessionBlob> {
        match self.storage.load_session().await? {
            Some(data) => Ok(SessionBlob::new(data)),
            None => Err(GatewayError::SessionUnavailable),
        }
    }

    pub async fn dialogs(&self, limit: usize) -> Result<Vec<Dialog>> {
        let response = bounded("fetch dialogs", self.call_timeout, self.client.fetch_dialogs(limit)).await?;
        Ok(normalize::normalize_dialogs(&response, Utc::now()))
    }

    pub async fn messages(&self, chat_id: i64, limit: usize) -> Result<Vec<Message>> {
        let response = bounded(
            "fetch messages",
            self.call_timeout,
            self.client.fetch_history(chat_id, limit),
        )
        .await?;
        Ok(normalize::normalize_history(chat_id, &response))
    }

    /// Latest `limit` messages of a chat with an id above `after_id`
    pub async fn new_messages(&self, chat_id: i64, after_id: i32, limit: usize) -> Result<Vec<Message>> {
        let mut messages = self.messages(chat_id, limit).await?;
        messages.retain(|m| m.id > after_id);
        Ok(messages)
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<i32> {
        let random_id: i64 = rand::random();
        let response = bounded(
            "send message",
            self.call_timeout,
            self.client.send_message(chat_id, text, random_id),
        )
        .await?;
        normalize::sent_message_id(&response).ok_or_else(|| {
            GatewayError::Platform(PlatformError::UnexpectedResponse(
                "send response carried no message id".to_string(),
            ))
        })
    }

    pub async fn mark_read(&self, chat_id: i64, max_id: i32) -> Result<()> {
        bounded("mark read", self.call_timeout, self.client.mark_read(chat_id, max_id)).await
    }

    pub async fn photo(&self, chat_id: i64, message_id: i32, media_timeout: Duration) -> Result<Vec<u8>> {
        bounded("download photo", media_timeout, self.client.fetch_media(chat_id, message_id)).await
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.storage.remove_now();
    }
}

/// Creates client handles, each bound to its own session file
#[derive(Clone)]
pub struct ClientFactory {
    platform: Arc<dyn Platform>,
    session_dir: PathBuf,
    call_timeout: Duration,
}

impl ClientFactory {
    pub fn new(platform: Arc<dyn Platform>, config: &GatewayConfig) -> Self {
        Self {
            platform,
            session_dir: config.session_dir.clone(),
            call_timeout: config.call_timeout,
        }
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    async fn connect(&self, storage: Arc<FileSessionStorage>) -> std::result::Result<ClientHandle, PlatformError> {
        let shared: Arc<dyn SessionStorage> = storage.clone();
        let connected = tokio::time::timeout(self.call_timeout, self.platform.connect(shared)).await;
        // No handle exists yet to clean up the file on failure
        let client = match connected {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                storage.remove_now();
                return Err(e);
            }
            Err(_) => {
                storage.remove_now();
                return Err(PlatformError::Connection(format!(
                    "connect timed out after {:?}",
                    self.call_timeout
                )));
            }
        };
        Ok(ClientHandle {
            client,
            storage,
            call_timeout: self.call_timeout,
        })
    }

    /// Allocate an unauthorized client with an empty session store
    pub async fn create_client(&self) -> Result<ClientHandle> {
        tokio::fs::create_dir_all(&self.session_dir)
            .await
            .map_err(StorageError::from)?;
        let storage = Arc::new(FileSessionStorage::unique_in(&self.session_dir));
        let handle = self
            .connect(storage)
            .await
            .map_err(GatewayError::ClientCreation)?;
        log::debug!("Created client with session {}", handle.session_path().display());
        Ok(handle)
    }

    /// Materialize a client from a previously exported session
    pub async fn create_client_from_blob(&self, blob: &SessionBlob) -> Result<ClientHandle> {
        if blob.is_empty() {
            return Err(GatewayError::InvalidSession("session data is empty".to_string()));
        }
        tokio::fs::create_dir_all(&self.session_dir)
            .await
            .map_err(|e| GatewayError::InvalidSession(format!("failed to prepare session store: {}", e)))?;

        let storage = Arc::new(FileSessionStorage::unique_in(&self.session_dir));
        if let Err(e) = storage.store_session(blob.as_bytes().to_vec()).await {
            storage.remove_now();
            return Err(GatewayError::InvalidSession(format!("failed to write session file: {}", e)));
        }

        self.connect(storage)
            .await
            .map_err(|e| GatewayError::InvalidSession(e.to_string()))
    }
}
