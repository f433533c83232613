use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::PollConfig;
use crate::errors::{GatewayError, Result};
use crate::models::Message;
use crate::session::{ClientFactory, SessionBlob};

#[derive(Debug, Clone)]
pub struct PollRequest {
    pub session: SessionBlob,
    pub chat_id: i64,
    /// Only messages with a greater id are reported
    pub since_message_id: i32,
    /// Requested wait in seconds; out-of-range values use the default
    pub timeout_secs: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollResult {
    pub has_new: bool,
    pub messages: Vec<Message>,
}

impl PollResult {
    fn empty() -> Self {
        Self {
            has_new: false,
            messages: Vec::new(),
        }
    }
}

/// Answers long-poll requests by repeatedly checking a chat until something
/// newer than the caller's watermark shows up or the deadline passes.
///
/// Each check builds a transient client from the caller's session, so the
/// dispatcher itself keeps no state between requests.
#[derive(Clone)]
pub struct PollDispatcher {
    factory: ClientFactory,
    config: PollConfig,
}

impl PollDispatcher {
    pub fn new(factory: ClientFactory, config: PollConfig) -> Self {
        Self { factory, config }
    }

    pub fn resolve_timeout(&self, requested: Option<i64>) -> Duration {
        let max = self.config.max_timeout.as_secs() as i64;
        match requested {
            Some(secs) if (1..=max).contains(&secs) => Duration::from_secs(secs as u64),
            _ => self.config.default_timeout,
        }
    }

    /// Wait for new messages; reaching the deadline is a successful empty result
    pub async fn long_poll(&self, request: PollRequest) -> Result<PollResult> {
        let wait = self.resolve_timeout(request.timeout_secs);
        let deadline = Instant::now() + wait;
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::debug!(
            "Long poll on chat {} after message {} for {:?}",
            request.chat_id,
            request.since_message_id,
            wait
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    log::debug!("Long poll on chat {} timed out", request.chat_id);
                    return Ok(PollResult::empty());
                }
                _ = ticker.tick() => {}
            }

            match tokio::time::timeout_at(deadline, self.check(&request)).await {
                Ok(Ok(messages)) if !messages.is_empty() => {
                    log::info!(
                        "Long poll on chat {} found {} new messages",
                        request.chat_id,
                        messages.len()
                    );
                    return Ok(PollResult {
                        has_new: true,
                        messages,
                    });
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => log::warn!("Long poll check on chat {} failed: {}", request.chat_id, e),
                Err(_) => {
                    log::debug!("Long poll on chat {} reached its deadline mid-check", request.chat_id);
                    return Ok(PollResult::empty());
                }
            }
        }
    }

    async fn check(&self, request: &PollRequest) -> Result<Vec<Message>, GatewayError> {
        let handle = self.factory.create_client_from_blob(&request.session).await?;
        handle
            .new_messages(request.chat_id, request.since_message_id, self.config.fetch_limit)
            .await
    }
}
