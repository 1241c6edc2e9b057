use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use slotbot_chat::commands::CommandPayload;
use slotbot_chat::events::{game_dispatcher, ChatEnvelope, ChatEvent, TextMessageEvent};
use slotbot_chat::game::{DiceRoller, GameSettings, RandomDice, SlotGameService};
use slotbot_chat::guard::ThrottleGuard;
use slotbot_chat::messages::{Keyboard, MessageTemplate, Sticker, SPIN_BUTTON_TEXT};
use slotbot_chat::runner::{BotRunner, ChatTransport, ReconnectPolicy, TransportError};
use slotbot_core::config::{AppConfig, LoadOptions};
use slotbot_core::{ActionThrottle, ApplicationError, CooldownTable, InMemoryScoreStore};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::sync::Mutex;

use super::{block_on, CommandResult};

const CONSOLE_CHAT_ID: &str = "console";
const REELS_SPINNING: &str = "[dice: 🎰 reels spinning...]";

/// Terminal stand-in for a chat platform: one update per input line, replies written as text.
pub struct ConsoleTransport<R, W> {
    lines: Mutex<Lines<R>>,
    output: Mutex<W>,
    user_id: String,
    updates: AtomicU64,
}

impl<R, W> ConsoleTransport<R, W>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R, writer: W, user_id: impl Into<String>) -> Self {
        Self {
            lines: Mutex::new(reader.lines()),
            output: Mutex::new(writer),
            user_id: user_id.into(),
            updates: AtomicU64::new(0),
        }
    }

    pub fn updates_seen(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }

    fn envelope_for(&self, line: &str) -> ChatEnvelope {
        let update = self.updates.fetch_add(1, Ordering::SeqCst) + 1;
        let update_id = format!("console-{update}");
        let text = line.trim();

        let event = if text.starts_with('/') {
            ChatEvent::Command(CommandPayload {
                chat_id: CONSOLE_CHAT_ID.to_owned(),
                user_id: self.user_id.clone(),
                text: text.to_owned(),
                request_id: update_id.clone(),
            })
        } else {
            // An empty line presses the spin button.
            let text = if text.is_empty() { SPIN_BUTTON_TEXT } else { text };
            ChatEvent::Text(TextMessageEvent {
                chat_id: CONSOLE_CHAT_ID.to_owned(),
                user_id: self.user_id.clone(),
                text: text.to_owned(),
            })
        };

        ChatEnvelope { update_id, event }
    }
}

impl<R> ConsoleTransport<R, Vec<u8>> {
    pub async fn transcript(&self) -> String {
        String::from_utf8_lossy(&self.output.lock().await).into_owned()
    }
}

pub fn render_console(message: &MessageTemplate) -> String {
    let mut rendered = String::new();
    if let Some(Sticker::Bankrupt) = message.sticker {
        rendered.push_str("[sticker: empty wallet]\n");
    }
    rendered.push_str(&message.render_plain());
    match message.keyboard {
        Keyboard::Spin => rendered.push_str(&format!("\n[keyboard: {SPIN_BUTTON_TEXT}]")),
        Keyboard::Remove => rendered.push_str("\n[keyboard removed]"),
        Keyboard::Unchanged => {}
    }
    rendered
}

#[async_trait]
impl<R, W> ChatTransport for ConsoleTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn register_commands(&self, commands: &[(&str, &str)]) -> Result<(), TransportError> {
        let menu = commands
            .iter()
            .map(|(name, description)| format!("/{name} - {description}"))
            .collect::<Vec<_>>()
            .join("\n");
        let mut output = self.output.lock().await;
        output
            .write_all(format!("{menu}\n\n").as_bytes())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        output.flush().await.map_err(|error| TransportError::Connect(error.to_string()))
    }

    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError> {
        let line = self
            .lines
            .lock()
            .await
            .next_line()
            .await
            .map_err(|error| TransportError::Receive(error.to_string()))?;
        Ok(line.map(|line| self.envelope_for(&line)))
    }

    async fn acknowledge(&self, _update_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(&self, _chat_id: &str, message: &MessageTemplate) -> Result<(), TransportError> {
        let mut output = self.output.lock().await;
        output
            .write_all(format!("{}\n\n", render_console(message)).as_bytes())
            .await
            .map_err(|error| TransportError::Send(error.to_string()))?;
        output.flush().await.map_err(|error| TransportError::Send(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// The console shows the reels itself, the way a chat platform plays the dice animation.
#[async_trait]
impl<R, W> DiceRoller for ConsoleTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn roll(&self, chat_id: &str) -> Result<i64, ApplicationError> {
        let raw = RandomDice.roll(chat_id).await?;
        let mut output = self.output.lock().await;
        output
            .write_all(format!("{REELS_SPINNING}\n\n").as_bytes())
            .await
            .map_err(|error| ApplicationError::Integration(error.to_string()))?;
        output.flush().await.map_err(|error| ApplicationError::Integration(error.to_string()))?;
        Ok(raw)
    }
}

/// Runs the real dispatcher, throttle and game service against `transport` until input ends.
pub async fn run_session<R, W>(
    transport: Arc<ConsoleTransport<R, W>>,
    settings: GameSettings,
    cooldowns: CooldownTable,
) -> anyhow::Result<u64>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let service = Arc::new(SlotGameService::new(
        Arc::new(InMemoryScoreStore::new()),
        transport.clone(),
        settings,
    ));
    let guard = ThrottleGuard::with_system_clock(Arc::new(ActionThrottle::new(cooldowns)));
    let runner = BotRunner::new(
        transport.clone(),
        game_dispatcher(service, Some(guard)),
        ReconnectPolicy { max_retries: 0, base_delay_ms: 0, max_delay_ms: 0 },
    );

    runner.start().await?;
    Ok(transport.updates_seen())
}

pub fn run(user_id: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("play", "config_validation", error.to_string(), 2)
        }
    };

    let transport = Arc::new(ConsoleTransport::new(
        tokio::io::BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        user_id,
    ));
    let session = run_session(
        transport,
        GameSettings::from(&config.game),
        config.throttle.cooldowns,
    );

    match block_on(session) {
        Ok(Ok(updates)) => {
            CommandResult::success("play", format!("session ended after {updates} updates"))
        }
        Ok(Err(error)) => CommandResult::failure("play", "session", error.to_string(), 1),
        Err(error) => CommandResult::failure("play", "runtime", error, 1),
    }
}
