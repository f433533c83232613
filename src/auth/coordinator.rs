use std::sync::{Arc, Weak};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::callbacks::PhoneAuthenticator;
use super::rendezvous::{RendezvousChannels, SlotKind};
use super::state::{AuthSession, HandshakeStatus};
use crate::config::AuthConfig;
use crate::errors::Result;
use crate::platform::{HandshakeCallbacks, PlatformClient};
use crate::session::{ClientFactory, ClientHandle};
use crate::store::ExpiringMap;

/// Auth session of one login plus the channel its handshake publishes on
#[derive(Clone)]
pub(crate) struct PendingLogin {
    pub login_id: Uuid,
    pub session: AuthSession,
    pub progress: Arc<watch::Sender<HandshakeStatus>>,
}

/// State shared between the coordinator and the handshake callbacks
pub(crate) struct AuthShared {
    pub sessions: ExpiringMap<String, PendingLogin>,
    pub channels: RendezvousChannels,
}

struct RegisteredClient {
    login_id: Uuid,
    handle: ClientHandle,
}

struct Inner {
    factory: ClientFactory,
    registry: ExpiringMap<String, RegisteredClient>,
    shared: Arc<AuthShared>,
    config: AuthConfig,
    /// Held while a login's entries are installed or removed across the maps
    replace_lock: Mutex<()>,
}

/// Runs login handshakes in the background and brokers the values they need.
///
/// Each phone has at most one login. Starting a new one replaces the previous
/// login's entries; the replaced handshake then fails on its own and its
/// cleanup only ever touches entries carrying its own login id.
#[derive(Clone)]
pub struct AuthCoordinator {
    inner: Arc<Inner>,
}

impl AuthCoordinator {
    pub fn new(factory: ClientFactory, config: AuthConfig) -> Self {
        let shared = AuthShared {
            sessions: ExpiringMap::new(config.pending_ttl),
            channels: RendezvousChannels::new(),
        };
        Self {
            inner: Arc::new(Inner {
                factory,
                registry: ExpiringMap::new(config.pending_ttl),
                shared: Arc::new(shared),
                config,
                replace_lock: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    /// Start a login for `phone` and return its id.
    ///
    /// Returns once the handshake task is spawned; the code prompt arrives
    /// through [`AuthCoordinator::progress`].
    pub async fn begin_login(&self, phone: &str) -> Result<Uuid> {
        let handle = self.inner.factory.create_client().await?;
        let client = handle.client();
        let login_id = Uuid::new_v4();
        let (progress, _) = watch::channel(HandshakeStatus::Starting);
        let progress = Arc::new(progress);

        // Slots, auth session and client always belong to the same login
        let replaced = {
            let _guard = self.inner.replace_lock.lock().await;
            let shared = &self.inner.shared;
            shared.channels.open(phone, login_id).await;
            shared
                .sessions
                .insert(
                    phone.to_string(),
                    PendingLogin {
                        login_id,
                        session: AuthSession::new(phone),
                        progress: progress.clone(),
                    },
                )
                .await;
            self.inner
                .registry
                .insert(phone.to_string(), RegisteredClient { login_id, handle })
                .await
        };
        if let Some(replaced) = replaced {
            log::info!(
                "Replacing pending login {} for {}",
                replaced.login_id,
                phone
            );
        }

        log::info!("Starting login {} for {}", login_id, phone);
        let coordinator = self.clone();
        let phone = phone.to_string();
        tokio::spawn(async move {
            coordinator
                .run_handshake(phone, login_id, client, progress)
                .await;
        });

        Ok(login_id)
    }

    async fn run_handshake(
        &self,
        phone: String,
        login_id: Uuid,
        client: Arc<dyn PlatformClient>,
        progress: Arc<watch::Sender<HandshakeStatus>>,
    ) {
        let callbacks: Arc<dyn HandshakeCallbacks> = Arc::new(PhoneAuthenticator::new(
            phone.clone(),
            login_id,
            self.inner.shared.clone(),
            progress.clone(),
        ));
        let limit = self.inner.config.handshake_timeout;

        match tokio::time::timeout(limit, client.run_handshake(callbacks)).await {
            Ok(Ok(())) => {
                // Nothing reads the slots any more
                self.inner.shared.channels.close_if(&phone, login_id).await;
                log::info!("Login {} for {} completed", login_id, phone);
                progress.send_replace(HandshakeStatus::Completed);
            }
            Ok(Err(e)) => {
                log::warn!("Login {} for {} failed: {}", login_id, phone, e);
                self.abandon(&phone, login_id, &progress, e.to_string()).await;
            }
            Err(_) => {
                log::warn!("Login {} for {} timed out after {:?}", login_id, phone, limit);
                self.abandon(
                    &phone,
                    login_id,
                    &progress,
                    format!("handshake timed out after {:?}", limit),
                )
                .await;
            }
        }
    }

    /// Remove a failed login's entries, then tell its waiters
    async fn abandon(
        &self,
        phone: &str,
        login_id: Uuid,
        progress: &watch::Sender<HandshakeStatus>,
        reason: String,
    ) {
        let phone_key = phone.to_string();
        let _guard = self.inner.replace_lock.lock().await;
        self.inner
            .registry
            .remove_if(&phone_key, |entry| entry.login_id == login_id)
            .await;
        self.inner.shared.channels.close_if(phone, login_id).await;
        self.inner
            .shared
            .sessions
            .remove_if(&phone_key, |pending| pending.login_id == login_id)
            .await;
        progress.send_replace(HandshakeStatus::Failed(reason));
    }

    /// Deliver a verification code to the waiting handshake
    pub async fn submit_code(&self, phone: &str, code: &str) -> Result<()> {
        self.inner
            .shared
            .channels
            .submit(phone, SlotKind::Code, code.trim().to_string())
            .await?;
        log::info!("Code submitted for {}", phone);
        Ok(())
    }

    /// Deliver the two-factor password to the waiting handshake
    pub async fn submit_password(&self, phone: &str, password: &str) -> Result<()> {
        self.inner
            .shared
            .channels
            .submit(phone, SlotKind::Password, password.to_string())
            .await?;
        log::info!("Password submitted for {}", phone);
        Ok(())
    }

    pub async fn peek_state(&self, phone: &str) -> Option<AuthSession> {
        self.inner
            .shared
            .sessions
            .with_entry(&phone.to_string(), |pending| pending.session.clone())
            .await
    }

    /// Forget the auth session and slots of a phone; idempotent
    pub async fn clear(&self, phone: &str) {
        self.inner.shared.sessions.remove(&phone.to_string()).await;
        self.inner.shared.channels.close(phone).await;
    }

    pub(crate) async fn clear_login(&self, phone: &str, login_id: Uuid) {
        self.inner
            .shared
            .sessions
            .remove_if(&phone.to_string(), |pending| pending.login_id == login_id)
            .await;
        self.inner.shared.channels.close_if(phone, login_id).await;
    }

    /// Move the client handle of a phone out of the registry
    pub async fn take_client(&self, phone: &str) -> Option<ClientHandle> {
        self.inner
            .registry
            .remove(&phone.to_string())
            .await
            .map(|entry| entry.handle)
    }

    pub(crate) async fn take_client_for(&self, phone: &str, login_id: Uuid) -> Option<ClientHandle> {
        self.inner
            .registry
            .remove_if(&phone.to_string(), |entry| entry.login_id == login_id)
            .await
            .map(|entry| entry.handle)
    }

    /// Subscribe to the progress of the current login of a phone
    pub async fn progress(&self, phone: &str) -> Option<watch::Receiver<HandshakeStatus>> {
        self.login_progress(phone).await.map(|(_, rx)| rx)
    }

    pub(crate) async fn login_progress(
        &self,
        phone: &str,
    ) -> Option<(Uuid, watch::Receiver<HandshakeStatus>)> {
        self.inner
            .shared
            .sessions
            .with_entry(&phone.to_string(), |pending| {
                (pending.login_id, pending.progress.subscribe())
            })
            .await
    }

    pub async fn pending_logins(&self) -> usize {
        self.inner.shared.sessions.len().await
    }

    pub async fn registered_clients(&self) -> usize {
        self.inner.registry.len().await
    }

    /// Drop logins older than the pending TTL; returns how many were removed
    pub async fn sweep_expired(&self) -> usize {
        let expired = self.inner.shared.sessions.sweep().await;
        for (phone, pending) in &expired {
            log::info!("Login {} for {} expired", pending.login_id, phone);
            self.inner.shared.channels.close_if(phone, pending.login_id).await;
            pending
                .progress
                .send_replace(HandshakeStatus::Failed("login expired".to_string()));
        }
        let stale_clients = self.inner.registry.sweep().await;
        if !stale_clients.is_empty() {
            log::debug!("Released {} expired client handles", stale_clients.len());
        }
        expired.len()
    }

    /// Run [`AuthCoordinator::sweep_expired`] every cleanup interval.
    ///
    /// The task stops once every coordinator clone has been dropped.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    log::debug!("Coordinator dropped, stopping sweeper");
                    break;
                };
                let swept = AuthCoordinator { inner }.sweep_expired().await;
                if swept > 0 {
                    log::info!("Swept {} expired logins", swept);
                }
            }
        })
    }
}
