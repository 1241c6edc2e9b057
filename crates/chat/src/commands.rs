use std::sync::Arc;

use async_trait::async_trait;
use slotbot_core::{ActionKey, ApplicationError, UserId};
use thiserror::Error;

use crate::messages::{self, MessageTemplate, SPIN_BUTTON_TEXT};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandPayload {
    pub chat_id: String,
    pub user_id: String,
    pub text: String,
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub command: BotCommand,
    pub args: String,
    pub chat_id: String,
    pub user_id: UserId,
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Stop,
    Help,
    Spin,
    Unknown { name: String },
}

impl BotCommand {
    pub fn from_name(name: &str) -> Self {
        match name {
            "start" => Self::Start,
            "stop" => Self::Stop,
            "help" => Self::Help,
            "spin" => Self::Spin,
            other => Self::Unknown { name: other.to_owned() },
        }
    }

    /// Throttle key guarding this command. Unknown commands are not throttled.
    pub fn action_key(&self) -> Option<ActionKey> {
        match self {
            Self::Start | Self::Stop | Self::Help => Some(ActionKey::Default),
            Self::Spin => Some(ActionKey::Spin),
            Self::Unknown { .. } => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("message is not a bot command: {0:?}")]
    NotACommand(String),
    #[error("bot command has no name")]
    EmptyCommand,
}

/// Splits `/name@botname args` into a command and its argument text.
pub fn parse_command_text(text: &str) -> Result<(BotCommand, String), CommandParseError> {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix('/') else {
        return Err(CommandParseError::NotACommand(trimmed.to_owned()));
    };

    let mut parts = body.split_whitespace();
    let head = parts.next().unwrap_or_default();
    let name = head.split('@').next().unwrap_or_default().to_ascii_lowercase();
    if name.is_empty() {
        return Err(CommandParseError::EmptyCommand);
    }

    let args = parts.collect::<Vec<_>>().join(" ");
    Ok((BotCommand::from_name(&name), args))
}

pub fn normalize_command(payload: CommandPayload) -> Result<CommandEnvelope, CommandParseError> {
    let (command, args) = parse_command_text(&payload.text)?;
    Ok(CommandEnvelope {
        command,
        args,
        chat_id: payload.chat_id,
        user_id: UserId::from(payload.user_id),
        request_id: payload.request_id,
    })
}

/// Plain messages only trigger a command when they are the spin button.
pub fn infer_text_command(text: &str) -> Option<BotCommand> {
    (text.trim() == SPIN_BUTTON_TEXT).then_some(BotCommand::Spin)
}

pub struct CommandRouter<S> {
    service: Arc<S>,
}

impl<S> CommandRouter<S>
where
    S: GameCommandService,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    pub async fn route(&self, envelope: &CommandEnvelope) -> Result<MessageTemplate, ApplicationError> {
        match &envelope.command {
            BotCommand::Start => self.service.start(envelope).await,
            BotCommand::Stop => Ok(messages::stop_message()),
            BotCommand::Help => Ok(messages::help_message()),
            BotCommand::Spin => self.service.spin(envelope).await,
            BotCommand::Unknown { name } => Ok(messages::unknown_command_message(name)),
        }
    }
}

#[async_trait]
pub trait GameCommandService: Send + Sync {
    async fn start(&self, envelope: &CommandEnvelope) -> Result<MessageTemplate, ApplicationError>;

    async fn spin(&self, envelope: &CommandEnvelope) -> Result<MessageTemplate, ApplicationError>;
}
