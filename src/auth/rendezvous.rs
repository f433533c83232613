use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::errors::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Code,
    Password,
}

/// Single-value handoff between a request and the handshake task
struct Slot {
    tx: mpsc::Sender<String>,
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl Slot {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

struct ChannelPair {
    login_id: Uuid,
    code: Slot,
    password: Option<Slot>,
}

impl ChannelPair {
    fn slot(&self, kind: SlotKind) -> Option<&Slot> {
        match kind {
            SlotKind::Code => Some(&self.code),
            SlotKind::Password => self.password.as_ref(),
        }
    }
}

/// Per-phone code and password slots.
///
/// Writers never wait: a slot that already holds an unconsumed value rejects
/// the second write. Closing a phone's pair wakes its waiter with `None`.
#[derive(Clone, Default)]
pub struct RendezvousChannels {
    pairs: Arc<Mutex<HashMap<String, ChannelPair>>>,
}

impl RendezvousChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh pair with its code slot, replacing any previous one
    pub async fn open(&self, phone: &str, login_id: Uuid) {
        let pair = ChannelPair {
            login_id,
            code: Slot::new(),
            password: None,
        };
        self.pairs.lock().await.insert(phone.to_string(), pair);
    }

    /// Create the password slot of the given login.
    ///
    /// Returns false when the login has been replaced or cleared meanwhile.
    pub async fn open_password(&self, phone: &str, login_id: Uuid) -> bool {
        let mut pairs = self.pairs.lock().await;
        match pairs.get_mut(phone) {
            Some(pair) if pair.login_id == login_id => {
                pair.password.get_or_insert_with(Slot::new);
                true
            }
            _ => false,
        }
    }

    pub async fn has_slot(&self, phone: &str, kind: SlotKind) -> bool {
        self.pairs
            .lock()
            .await
            .get(phone)
            .is_some_and(|pair| pair.slot(kind).is_some())
    }

    /// Hand a value to the waiting handshake without blocking
    pub async fn submit(&self, phone: &str, kind: SlotKind, value: String) -> Result<(), GatewayError> {
        let pairs = self.pairs.lock().await;
        let slot = pairs.get(phone).and_then(|pair| pair.slot(kind));
        let Some(slot) = slot else {
            return Err(match kind {
                SlotKind::Code => GatewayError::NoPendingAuth(phone.to_string()),
                SlotKind::Password => GatewayError::NoPendingPassword(phone.to_string()),
            });
        };
        slot.tx.try_send(value).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => GatewayError::AlreadySubmitted(phone.to_string()),
            mpsc::error::TrySendError::Closed(_) => match kind {
                SlotKind::Code => GatewayError::NoPendingAuth(phone.to_string()),
                SlotKind::Password => GatewayError::NoPendingPassword(phone.to_string()),
            },
        })
    }

    /// Wait for the next value in a slot of the given login.
    ///
    /// The map lock is released before waiting. `None` means the slot is
    /// missing or was closed while waiting.
    pub async fn wait(&self, phone: &str, login_id: Uuid, kind: SlotKind) -> Option<String> {
        let rx = {
            let pairs = self.pairs.lock().await;
            let pair = pairs.get(phone).filter(|pair| pair.login_id == login_id)?;
            pair.slot(kind)?.rx.clone()
        };
        let mut rx = rx.lock().await;
        rx.recv().await
    }

    /// Drop both slots of a phone; idempotent
    pub async fn close(&self, phone: &str) -> bool {
        self.pairs.lock().await.remove(phone).is_some()
    }

    /// Drop the slots only if they still belong to `login_id`
    pub async fn close_if(&self, phone: &str, login_id: Uuid) -> bool {
        let mut pairs = self.pairs.lock().await;
        if pairs.get(phone).is_some_and(|pair| pair.login_id == login_id) {
            pairs.remove(phone);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const PHONE: &str = "+15550100";

    #[tokio::test]
    async fn test_submit_without_open_fails() {
        let channels = RendezvousChannels::new();
        let result = channels.submit(PHONE, SlotKind::Code, "12345".into()).await;
        assert!(matches!(result, Err(GatewayError::NoPendingAuth(_))));
    }

    #[tokio::test]
    async fn test_password_slot_missing_until_opened() {
        let channels = RendezvousChannels::new();
        let login_id = Uuid::new_v4();
        channels.open(PHONE, login_id).await;

        let result = channels.submit(PHONE, SlotKind::Password, "pw".into()).await;
        assert!(matches!(result, Err(GatewayError::NoPendingPassword(_))));

        assert!(channels.open_password(PHONE, login_id).await);
        assert!(channels.has_slot(PHONE, SlotKind::Password).await);
        channels
            .submit(PHONE, SlotKind::Password, "pw".into())
            .await
            .expect("password slot should accept a value");
        assert_eq!(
            channels.wait(PHONE, login_id, SlotKind::Password).await.as_deref(),
            Some("pw")
        );
    }

    #[tokio::test]
    async fn test_second_write_fails_fast() {
        let channels = RendezvousChannels::new();
        channels.open(PHONE, Uuid::new_v4()).await;
        channels
            .submit(PHONE, SlotKind::Code, "11111".into())
            .await
            .expect("first write");
        let second = tokio::time::timeout(
            Duration::from_millis(100),
            channels.submit(PHONE, SlotKind::Code, "22222".into()),
        )
        .await
        .expect("second write must not block");
        assert!(matches!(second, Err(GatewayError::AlreadySubmitted(_))));
    }

    #[tokio::test]
    async fn test_close_wakes_waiter() {
        let channels = RendezvousChannels::new();
        let login_id = Uuid::new_v4();
        channels.open(PHONE, login_id).await;

        let waiter = {
            let channels = channels.clone();
            tokio::spawn(async move { channels.wait(PHONE, login_id, SlotKind::Code).await })
        };
        tokio::task::yield_now().await;
        assert!(channels.close(PHONE).await);
        assert!(!channels.close(PHONE).await);

        let value = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("task should not panic");
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_close_if_ignores_other_login() {
        let channels = RendezvousChannels::new();
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        channels.open(PHONE, old).await;
        channels.open(PHONE, new).await;

        assert!(!channels.close_if(PHONE, old).await);
        assert!(!channels.open_password(PHONE, old).await);
        assert!(channels.has_slot(PHONE, SlotKind::Code).await);
        assert!(channels.close_if(PHONE, new).await);
    }
}
