//! In-process platform used for development and by the test suite.
//!
//! It keeps accounts, chats and authorized sessions in memory and behaves
//! like the real client library where the gateway can observe it: logins go
//! through the same callback sequence, sessions are written to the client's
//! storage (optionally late), fetches answer with the various wire variants,
//! and pushed messages arrive on the update stream.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, Mutex};

use super::wire::{
    DialogBatch, DialogClass, DialogsResponse, HistoryResponse, MessageBatch, MessageClass, Peer,
    SentMessageResponse, UpdateClass, UpdatesEnvelope, WireChat, WireDialog, WireMedia,
    WireMessage, WireUser,
};
use super::{HandshakeCallbacks, Platform, PlatformClient, SentCode, TermsOfService};
use crate::errors::PlatformError;
use crate::session::SessionStorage;

const UPDATE_BUFFER: usize = 64;
const SANDBOX_DC: i32 = 2;

/// A phone number the sandbox knows how to log in
#[derive(Debug, Clone)]
pub struct SandboxAccount {
    pub phone: String,
    pub code: String,
    pub password: Option<String>,
    pub registered: bool,
    pub first_name: String,
    pub last_name: String,
}

impl SandboxAccount {
    pub fn new(phone: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            code: code.into(),
            password: None,
            registered: true,
            first_name: "Sandbox".to_string(),
            last_name: "User".to_string(),
        }
    }

    /// Require a two-factor password after the code
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// The phone has no account yet; login goes through sign-up
    pub fn unregistered(mut self) -> Self {
        self.registered = false;
        self
    }

    pub fn named(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }
}

/// What a sandbox client writes to its session storage
#[derive(Debug, Serialize, Deserialize)]
struct SandboxSessionFile {
    dc_id: i32,
    auth_key: String,
    phone: String,
}

struct SandboxChat {
    peer: Peer,
    messages: Vec<WireMessage>,
    photos: HashMap<i32, Vec<u8>>,
    read_max: i32,
    pts: i32,
}

impl SandboxChat {
    fn unread(&self) -> i32 {
        self.messages
            .iter()
            .filter(|m| !m.out && m.id > self.read_max)
            .count() as i32
    }
}

#[derive(Default)]
struct SandboxState {
    accounts: HashMap<String, SandboxAccount>,
    /// auth key -> phone
    sessions: HashMap<String, String>,
    chats: BTreeMap<i64, SandboxChat>,
    users: Vec<WireUser>,
    wire_chats: Vec<WireChat>,
    next_message_id: i32,
    flush_delay: Duration,
    fetch_delay: Duration,
    fetch_failures: u32,
    connect_failures: u32,
    subscribers: Vec<mpsc::Sender<UpdatesEnvelope>>,
}

impl SandboxState {
    fn chat_mut(&mut self, chat_id: i64) -> Result<&mut SandboxChat, PlatformError> {
        self.chats
            .get_mut(&chat_id)
            .ok_or_else(|| PlatformError::rpc(400, "PEER_ID_INVALID"))
    }

    fn append(&mut self, peer: Peer, out: bool, text: &str, media: Option<WireMedia>) -> WireMessage {
        self.next_message_id += 1;
        let from = match peer {
            Peer::User(_) => None,
            other => Some(other),
        };
        let message = WireMessage {
            id: self.next_message_id,
            peer,
            from: if out { None } else { from },
            out,
            date: unix_now(),
            text: text.to_string(),
            media,
        };
        if let Some(chat) = self.chats.get_mut(&peer.id()) {
            chat.pts += 1;
            chat.messages.push(message.clone());
        }
        message
    }

    fn take_fetch_failure(&mut self) -> Result<(), PlatformError> {
        if self.fetch_failures > 0 {
            self.fetch_failures -= 1;
            return Err(PlatformError::Connection("sandbox transient failure".to_string()));
        }
        Ok(())
    }

    fn broadcast(&mut self, envelope: UpdatesEnvelope) {
        self.subscribers.retain(|tx| match tx.try_send(envelope.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("Sandbox update subscriber is full, dropping update");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn code_hash(phone: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(phone.as_bytes());
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    hex::encode(&hasher.finalize()[..8])
}

/// In-memory platform shared by every client it connects
#[derive(Clone, Default)]
pub struct SandboxPlatform {
    state: Arc<Mutex<SandboxState>>,
}

impl SandboxPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_account(&self, account: SandboxAccount) {
        let mut state = self.state.lock().await;
        state.accounts.insert(account.phone.clone(), account);
    }

    /// Private chat with a user; returns the chat's peer
    pub async fn add_contact(
        &self,
        id: i64,
        first_name: &str,
        last_name: &str,
        username: Option<&str>,
    ) -> Peer {
        let peer = Peer::User(id);
        let mut state = self.state.lock().await;
        state.users.push(WireUser {
            id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            username: username.map(str::to_string),
        });
        state.chats.insert(id, SandboxChat::empty(peer));
        peer
    }

    pub async fn add_group(&self, id: i64, title: &str) -> Peer {
        let peer = Peer::Chat(id);
        let mut state = self.state.lock().await;
        state.wire_chats.push(WireChat::Chat {
            id,
            title: title.to_string(),
        });
        state.chats.insert(id, SandboxChat::empty(peer));
        peer
    }

    pub async fn add_channel(&self, id: i64, title: &str) -> Peer {
        let peer = Peer::Channel(id);
        let mut state = self.state.lock().await;
        state.wire_chats.push(WireChat::Channel {
            id,
            title: title.to_string(),
        });
        state.chats.insert(id, SandboxChat::empty(peer));
        peer
    }

    /// Add a message to a chat's history without pushing an update
    pub async fn add_message(&self, peer: Peer, text: &str, out: bool) -> i32 {
        self.state.lock().await.append(peer, out, text, None).id
    }

    /// Add an incoming photo message and keep its bytes for download
    pub async fn add_photo(&self, peer: Peer, caption: &str, bytes: Vec<u8>) -> i32 {
        let mut state = self.state.lock().await;
        let photo_id = i64::from(rand::random::<u32>());
        let message = state.append(peer, false, caption, Some(WireMedia::Photo(Some(photo_id))));
        if let Some(chat) = state.chats.get_mut(&peer.id()) {
            chat.photos.insert(message.id, bytes);
        }
        message.id
    }

    pub async fn add_media(&self, peer: Peer, media: WireMedia) -> i32 {
        self.state.lock().await.append(peer, false, "", Some(media)).id
    }

    /// Deliver an incoming message: stored in history and pushed to update streams
    pub async fn push_message(&self, peer: Peer, text: &str) -> i32 {
        let mut state = self.state.lock().await;
        let message = state.append(peer, false, text, None);
        let id = message.id;
        let envelope = match peer {
            Peer::Channel(_) => UpdatesEnvelope::Updates(vec![UpdateClass::NewChannelMessage(
                MessageClass::Message(message),
            )]),
            _ => UpdatesEnvelope::Short(UpdateClass::NewMessage(MessageClass::Message(message))),
        };
        state.broadcast(envelope);
        id
    }

    /// Delay between a successful login and the session reaching storage
    pub async fn set_flush_delay(&self, delay: Duration) {
        self.state.lock().await.flush_delay = delay;
    }

    /// Delay applied to every fetch, for exercising call timeouts
    pub async fn set_fetch_delay(&self, delay: Duration) {
        self.state.lock().await.fetch_delay = delay;
    }

    /// Make the next `count` fetches fail with a connection error
    pub async fn fail_next_fetches(&self, count: u32) {
        self.state.lock().await.fetch_failures = count;
    }

    pub async fn fail_next_connects(&self, count: u32) {
        self.state.lock().await.connect_failures = count;
    }

    pub async fn authorized_sessions(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    pub async fn unread_count(&self, peer: Peer) -> Option<i32> {
        self.state.lock().await.chats.get(&peer.id()).map(SandboxChat::unread)
    }
}

impl SandboxChat {
    fn empty(peer: Peer) -> Self {
        Self {
            peer,
            messages: Vec::new(),
            photos: HashMap::new(),
            read_max: 0,
            pts: 0,
        }
    }
}

#[async_trait]
impl Platform for SandboxPlatform {
    async fn connect(
        &self,
        storage: Arc<dyn SessionStorage>,
    ) -> Result<Arc<dyn PlatformClient>, PlatformError> {
        {
            let mut state = self.state.lock().await;
            if state.connect_failures > 0 {
                state.connect_failures -= 1;
                return Err(PlatformError::Connection("sandbox refused the connection".to_string()));
            }
        }

        let authorized = match storage.load_session().await? {
            None => None,
            Some(data) => {
                let file: SandboxSessionFile = serde_json::from_slice(&data).map_err(|e| {
                    PlatformError::UnexpectedResponse(format!("unreadable session: {}", e))
                })?;
                let state = self.state.lock().await;
                match state.sessions.get(&file.auth_key) {
                    Some(phone) if *phone == file.phone => Some(file.phone),
                    _ => return Err(PlatformError::Unauthorized),
                }
            }
        };

        Ok(Arc::new(SandboxClient {
            platform: self.clone(),
            storage,
            phone: Mutex::new(authorized),
        }))
    }
}

struct SandboxClient {
    platform: SandboxPlatform,
    storage: Arc<dyn SessionStorage>,
    /// Phone this client is logged in as
    phone: Mutex<Option<String>>,
}

impl SandboxClient {
    /// Common preamble of every data call
    async fn ready(&self) -> Result<(), PlatformError> {
        if self.phone.lock().await.is_none() {
            return Err(PlatformError::Unauthorized);
        }
        let delay = {
            let mut state = self.platform.state.lock().await;
            state.take_fetch_failure()?;
            state.fetch_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn authorize(&self, phone: &str) -> Result<(), PlatformError> {
        let auth_key = hex::encode(rand::random::<[u8; 32]>());
        let flush_delay = {
            let mut state = self.platform.state.lock().await;
            state.sessions.insert(auth_key.clone(), phone.to_string());
            state.flush_delay
        };
        *self.phone.lock().await = Some(phone.to_string());

        let file = SandboxSessionFile {
            dc_id: SANDBOX_DC,
            auth_key,
            phone: phone.to_string(),
        };
        let data = serde_json::to_vec(&file)
            .map_err(|e| PlatformError::UnexpectedResponse(format!("failed to encode session: {}", e)))?;

        if flush_delay.is_zero() {
            self.storage.store_session(data).await?;
        } else {
            let storage = self.storage.clone();
            tokio::spawn(async move {
                tokio::time::sleep(flush_delay).await;
                if let Err(e) = storage.store_session(data).await {
                    log::warn!("Sandbox failed to flush session: {}", e);
                }
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformClient for SandboxClient {
    async fn run_handshake(
        &self,
        callbacks: Arc<dyn HandshakeCallbacks>,
    ) -> Result<(), PlatformError> {
        if self.phone.lock().await.is_some() {
            return Ok(());
        }

        let phone = callbacks.phone().await?;
        let account = self
            .platform
            .state
            .lock()
            .await
            .accounts
            .get(&phone)
            .cloned()
            .ok_or_else(|| PlatformError::rpc(400, "PHONE_NUMBER_INVALID"))?;

        let sent = SentCode {
            phone_code_hash: code_hash(&phone),
            code_length: account.code.len(),
        };
        let code = callbacks.code(&sent).await?;
        if code.trim() != account.code {
            return Err(PlatformError::rpc(400, "PHONE_CODE_INVALID"));
        }

        if !account.registered {
            let tos = TermsOfService {
                id: "sandbox-tos-1".to_string(),
                text: "Sandbox terms of service".to_string(),
            };
            callbacks.accept_terms_of_service(&tos).await?;
            let profile = callbacks.sign_up().await?;
            let mut state = self.platform.state.lock().await;
            if let Some(stored) = state.accounts.get_mut(&phone) {
                stored.registered = true;
                stored.first_name = profile.first_name;
                stored.last_name = profile.last_name;
            }
        }

        if let Some(expected) = &account.password {
            let password = callbacks.password().await?;
            if &password != expected {
                return Err(PlatformError::rpc(400, "PASSWORD_HASH_INVALID"));
            }
        }

        self.authorize(&phone).await
    }

    async fn fetch_dialogs(&self, limit: usize) -> Result<DialogsResponse, PlatformError> {
        self.ready().await?;
        let state = self.platform.state.lock().await;

        let mut chats: Vec<&SandboxChat> = state.chats.values().collect();
        chats.sort_by_key(|chat| {
            std::cmp::Reverse(chat.messages.last().map(|m| m.date).unwrap_or_default())
        });
        let count = chats.len();

        let mut batch = DialogBatch {
            users: state.users.clone(),
            chats: state.wire_chats.clone(),
            ..Default::default()
        };
        for chat in chats.into_iter().take(limit) {
            let top = chat.messages.last();
            batch.dialogs.push(DialogClass::Dialog(WireDialog {
                peer: chat.peer,
                top_message: top.map(|m| m.id).unwrap_or_default(),
                unread_count: chat.unread(),
            }));
            if let Some(top) = top {
                batch.messages.push(MessageClass::Message(top.clone()));
            }
        }

        if count > limit {
            Ok(DialogsResponse::Slice {
                count: count as i32,
                batch,
            })
        } else {
            Ok(DialogsResponse::Dialogs(batch))
        }
    }

    async fn fetch_history(&self, chat_id: i64, limit: usize) -> Result<HistoryResponse, PlatformError> {
        self.ready().await?;
        let mut state = self.platform.state.lock().await;
        let users = state.users.clone();
        let wire_chats = state.wire_chats.clone();
        let chat = state.chat_mut(chat_id)?;

        let count = chat.messages.len();
        let batch = MessageBatch {
            // Newest first
            messages: chat
                .messages
                .iter()
                .rev()
                .take(limit)
                .cloned()
                .map(MessageClass::Message)
                .collect(),
            chats: wire_chats,
            users,
        };

        Ok(match chat.peer {
            Peer::Channel(_) => HistoryResponse::Channel {
                pts: chat.pts,
                count: count as i32,
                batch,
            },
            _ if count > limit => HistoryResponse::Slice {
                count: count as i32,
                batch,
            },
            _ => HistoryResponse::Messages(batch),
        })
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        random_id: i64,
    ) -> Result<SentMessageResponse, PlatformError> {
        self.ready().await?;
        let mut state = self.platform.state.lock().await;
        let peer = state.chat_mut(chat_id)?.peer;
        let message = state.append(peer, true, text, None);

        Ok(match peer {
            Peer::User(_) => SentMessageResponse::ShortSent {
                id: message.id,
                date: message.date,
            },
            _ => SentMessageResponse::Updates(vec![
                UpdateClass::MessageId {
                    id: message.id,
                    random_id,
                },
                UpdateClass::NewMessage(MessageClass::Message(message)),
            ]),
        })
    }

    async fn mark_read(&self, chat_id: i64, max_id: i32) -> Result<(), PlatformError> {
        self.ready().await?;
        let mut state = self.platform.state.lock().await;
        let chat = state.chat_mut(chat_id)?;
        chat.read_max = chat.read_max.max(max_id);
        Ok(())
    }

    async fn fetch_media(&self, chat_id: i64, message_id: i32) -> Result<Vec<u8>, PlatformError> {
        self.ready().await?;
        let mut state = self.platform.state.lock().await;
        let chat = state.chat_mut(chat_id)?;
        chat.photos
            .get(&message_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("photo in message {}", message_id)))
    }

    async fn updates(&self) -> Result<mpsc::Receiver<UpdatesEnvelope>, PlatformError> {
        if self.phone.lock().await.is_none() {
            return Err(PlatformError::Unauthorized);
        }
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        self.platform.state.lock().await.subscribers.push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::UserInfo;
    use crate::session::FileSessionStorage;

    struct Scripted {
        phone: String,
        code: String,
        password: Option<String>,
    }

    #[async_trait]
    impl HandshakeCallbacks for Scripted {
        async fn phone(&self) -> Result<String, PlatformError> {
            Ok(self.phone.clone())
        }

        async fn code(&self, sent: &SentCode) -> Result<String, PlatformError> {
            assert_eq!(sent.phone_code_hash.len(), 16);
            Ok(self.code.clone())
        }

        async fn password(&self) -> Result<String, PlatformError> {
            self.password
                .clone()
                .ok_or_else(|| PlatformError::Cancelled("no password".into()))
        }

        async fn accept_terms_of_service(&self, _tos: &TermsOfService) -> Result<(), PlatformError> {
            Ok(())
        }

        async fn sign_up(&self) -> Result<UserInfo, PlatformError> {
            Ok(UserInfo {
                first_name: "New".into(),
                last_name: "Person".into(),
            })
        }
    }

    async fn fresh_client(platform: &SandboxPlatform, dir: &std::path::Path) -> Arc<dyn PlatformClient> {
        let storage: Arc<dyn SessionStorage> = Arc::new(FileSessionStorage::unique_in(dir));
        platform.connect(storage).await.expect("connect")
    }

    fn scripted(code: &str, password: Option<&str>) -> Arc<dyn HandshakeCallbacks> {
        Arc::new(Scripted {
            phone: "+15550100".into(),
            code: code.into(),
            password: password.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_login_writes_reusable_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let platform = SandboxPlatform::new();
        platform.add_account(SandboxAccount::new("+15550100", "12345")).await;

        let storage: Arc<dyn SessionStorage> =
            Arc::new(FileSessionStorage::unique_in(dir.path()));
        let client = platform.connect(storage.clone()).await.expect("connect");
        assert!(matches!(client.fetch_dialogs(10).await, Err(PlatformError::Unauthorized)));

        client.run_handshake(scripted("12345", None)).await.expect("login");
        let data = storage.load_session().await.expect("load").expect("session written");

        let restored: Arc<dyn SessionStorage> = Arc::new(FileSessionStorage::unique_in(dir.path()));
        restored.store_session(data).await.expect("store");
        let again = platform.connect(restored).await.expect("reconnect");
        again.fetch_dialogs(10).await.expect("authorized client can fetch");
    }

    #[tokio::test]
    async fn test_wrong_code_and_password_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let platform = SandboxPlatform::new();
        platform
            .add_account(SandboxAccount::new("+15550100", "12345").with_password("hunter2"))
            .await;

        let err = fresh_client(&platform, dir.path())
            .await
            .run_handshake(scripted("00000", None))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Rpc { ref message, .. } if message == "PHONE_CODE_INVALID"));

        let err = fresh_client(&platform, dir.path())
            .await
            .run_handshake(scripted("12345", Some("wrong")))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Rpc { ref message, .. } if message == "PASSWORD_HASH_INVALID"));

        fresh_client(&platform, dir.path())
            .await
            .run_handshake(scripted("12345", Some("hunter2")))
            .await
            .expect("correct password");
        assert_eq!(platform.authorized_sessions().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_session_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let platform = SandboxPlatform::new();
        let storage = Arc::new(FileSessionStorage::unique_in(dir.path()));
        storage
            .store_session(br#"{"dc_id":2,"auth_key":"00","phone":"+1"}"#.to_vec())
            .await
            .expect("store");
        let result = platform.connect(storage).await;
        assert!(matches!(result, Err(PlatformError::Unauthorized)));
    }
}
