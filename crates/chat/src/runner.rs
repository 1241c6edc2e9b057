use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::events::{ChatEnvelope, EventContext, EventDispatcher, HandlerResult};
use crate::messages::{MessageTemplate, BOT_COMMANDS};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport send failed: {0}")]
    Send(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Connection to a chat platform. `next_envelope` returning `None` means the stream ended.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn register_commands(&self, commands: &[(&str, &str)]) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError>;
    async fn acknowledge(&self, update_id: &str) -> Result<(), TransportError>;
    async fn send(&self, chat_id: &str, message: &MessageTemplate) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopChatTransport;

#[async_trait]
impl ChatTransport for NoopChatTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn register_commands(&self, _commands: &[(&str, &str)]) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _update_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(&self, _chat_id: &str, _message: &MessageTemplate) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct BotRunner {
    transport: Arc<dyn ChatTransport>,
    dispatcher: Arc<EventDispatcher>,
    reconnect_policy: ReconnectPolicy,
}

impl Default for BotRunner {
    fn default() -> Self {
        Self {
            transport: Arc::new(NoopChatTransport),
            dispatcher: Arc::new(EventDispatcher::default()),
            reconnect_policy: ReconnectPolicy::default(),
        }
    }
}

impl BotRunner {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher: Arc::new(dispatcher), reconnect_policy }
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "chat transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "chat transport retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    /// Reads updates until the stream ends. Each update is screened by the dispatcher as it
    /// arrives and then handled on its own task, so a slow spin never holds up other users.
    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening chat transport connection");
        self.transport.connect().await?;
        self.transport.register_commands(&BOT_COMMANDS).await?;
        info!(attempt, commands = BOT_COMMANDS.len(), "chat transport connected");

        let mut in_flight = JoinSet::new();
        let pumped = loop {
            while let Some(joined) = in_flight.try_join_next() {
                report_join_failure(joined);
            }

            let envelope = match self.transport.next_envelope().await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => break Ok(()),
                Err(error) => break Err(error),
            };

            info!(
                event_name = "ingress.chat.update_received",
                update_id = %envelope.update_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.update_id,
                "received chat update"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.update_id).await {
                warn!(
                    event_name = "ingress.chat.ack_sent",
                    update_id = %envelope.update_id,
                    correlation_id = %envelope.update_id,
                    error = %error,
                    "failed to acknowledge chat update"
                );
            } else {
                debug!(
                    event_name = "ingress.chat.ack_sent",
                    update_id = %envelope.update_id,
                    correlation_id = %envelope.update_id,
                    "acknowledged chat update"
                );
            }

            let context = EventContext { correlation_id: envelope.update_id.clone() };
            let settled = self.dispatcher.screen(&envelope, &context);
            let dispatcher = self.dispatcher.clone();
            let transport = self.transport.clone();

            in_flight.spawn(async move {
                let result = match settled {
                    Some(result) => result,
                    None => match dispatcher.run_handler(&envelope, &context).await {
                        Ok(result) => result,
                        Err(error) => {
                            warn!(
                                update_id = %envelope.update_id,
                                correlation_id = %envelope.update_id,
                                error = %error,
                                "event dispatch failed; continuing chat loop"
                            );
                            return;
                        }
                    },
                };

                deliver(transport.as_ref(), &envelope, &result).await;
            });
        };

        // Replies still in flight are delivered before the connection is closed or retried.
        while let Some(joined) = in_flight.join_next().await {
            report_join_failure(joined);
        }

        pumped?;
        info!(attempt, "chat transport stream closed");
        self.transport.disconnect().await
    }
}

fn report_join_failure(joined: Result<(), JoinError>) {
    if let Err(error) = joined {
        warn!(
            event_name = "ingress.chat.handler_aborted",
            error = %error,
            "chat update handler task failed"
        );
    }
}

async fn deliver(transport: &dyn ChatTransport, envelope: &ChatEnvelope, result: &HandlerResult) {
    let (Some(chat_id), Some(message)) = (envelope.event.chat_id(), result.reply()) else {
        return;
    };

    if let Err(error) = transport.send(chat_id, message).await {
        warn!(
            event_name = "egress.chat.reply_failed",
            update_id = %envelope.update_id,
            correlation_id = %envelope.update_id,
            chat_id,
            error = %error,
            "failed to send reply"
        );
    } else {
        debug!(
            event_name = "egress.chat.reply_sent",
            update_id = %envelope.update_id,
            correlation_id = %envelope.update_id,
            chat_id,
            "reply sent"
        );
    }
}
