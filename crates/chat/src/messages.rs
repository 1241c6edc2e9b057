use std::time::Duration;

use serde::Serialize;
use slotbot_core::game::payout::{DOUBLE_SEVEN_BONUS, TRIPLE_BONUS, TRIPLE_SEVEN_BONUS};
use slotbot_core::game::SPIN_COST;
use slotbot_core::{InterfaceError, SpinOutcome};

/// Text of the reply-keyboard button that triggers a spin.
pub const SPIN_BUTTON_TEXT: &str = "🎰 Try your luck!";

/// Reply keyboard state the transport should leave the chat in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Keyboard {
    Unchanged,
    Spin,
    Remove,
}

/// Stickers are named by meaning; the transport maps them to its own file ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sticker {
    Bankrupt,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: String },
    Context { block_id: String, elements: Vec<String> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
    pub keyboard: Keyboard,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sticker: Option<Sticker>,
}

impl MessageTemplate {
    /// Plain-text rendering for transports without rich formatting.
    pub fn render_plain(&self) -> String {
        let mut lines = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Section { text, .. } => lines.push(text.clone()),
                Block::Context { elements, .. } => lines.extend(elements.iter().cloned()),
            }
        }
        if lines.is_empty() {
            return self.fallback_text.clone();
        }
        lines.join("\n")
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
    keyboard: Keyboard,
    sticker: Option<Sticker>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self {
            fallback_text: fallback_text.into(),
            blocks: Vec::new(),
            keyboard: Keyboard::Unchanged,
            sticker: None,
        }
    }

    pub fn section(mut self, block_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Section { block_id: block_id.into(), text: text.into() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard;
        self
    }

    pub fn sticker(mut self, sticker: Sticker) -> Self {
        self.sticker = Some(sticker);
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate {
            fallback_text: self.fallback_text,
            blocks: self.blocks,
            keyboard: self.keyboard,
            sticker: self.sticker,
        }
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<String>,
}

impl ContextBuilder {
    pub fn line(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(text.into());
        self
    }

    fn build(self) -> Vec<String> {
        self.elements
    }
}

/// Commands advertised to the chat platform's command menu.
pub const BOT_COMMANDS: [(&str, &str); 4] = [
    ("start", "Restart the casino"),
    ("spin", "Show the keyboard and spin"),
    ("stop", "Remove the keyboard"),
    ("help", "How the casino works"),
];

pub fn welcome_message(start_points: i64) -> MessageTemplate {
    MessageBuilder::new(format!("Welcome to the virtual casino! You have {start_points} points."))
        .section("casino.welcome.greeting.v1", "Welcome to the virtual casino!")
        .section(
            "casino.welcome.rules.v1",
            format!(
                "You have {start_points} points. Each spin costs {SPIN_COST} point, winning combinations pay:\n\n\
                 3 identical symbols (except sevens) - {TRIPLE_BONUS} points\n\
                 7️⃣7️⃣▫️ - {DOUBLE_SEVEN_BONUS} points (dot = anything)\n\
                 7️⃣7️⃣7️⃣ - {TRIPLE_SEVEN_BONUS} points"
            ),
        )
        .section(
            "casino.welcome.disclaimer.v1",
            "Note: this bot is a demo and your score may be reset at any time. \
             Gambling addiction is real; there are no paid options here.",
        )
        .context("casino.welcome.commands.v1", |context| {
            context.line("Remove the keyboard: /stop").line("Show it again: /spin");
        })
        .keyboard(Keyboard::Spin)
        .build()
}

pub fn stop_message() -> MessageTemplate {
    MessageBuilder::new("Keyboard removed.")
        .section(
            "casino.stop.summary.v1",
            "Keyboard removed. Start over: /start, bring the keyboard back and keep playing: /spin",
        )
        .keyboard(Keyboard::Remove)
        .build()
}

pub fn help_message() -> MessageTemplate {
    MessageBuilder::new("Casino help")
        .section(
            "casino.help.symbols.v1",
            "The machine has 4 symbols: BAR, grapes, lemon and seven, so there are 64 combinations.",
        )
        .section(
            "casino.help.encoding.v1",
            "Every dice value from 1 to 64 is decoded in base 4: subtract one and read the three \
             digits left to right, 0 = BAR, 1 = grapes, 2 = lemon, 3 = seven.",
        )
        .build()
}

pub fn spin_result_message(outcome: &SpinOutcome, new_score: i64) -> MessageTemplate {
    let verdict = if outcome.payout.is_win {
        format!("You won {} points!", outcome.payout.delta)
    } else {
        "No luck this time.".to_owned()
    };

    MessageBuilder::new(format!("{verdict} Your score: {new_score}."))
        .section(
            "casino.spin.combo.v1",
            format!("Your combination: {} (#{})", outcome.combination, outcome.raw),
        )
        .section("casino.spin.verdict.v1", format!("{verdict} Your score: {new_score}."))
        .keyboard(Keyboard::Spin)
        .build()
}

pub fn bankrupt_message() -> MessageTemplate {
    MessageBuilder::new("Your balance is zero.")
        .section(
            "casino.bankrupt.summary.v1",
            "Your balance is zero. You can accept your fate and get on with your life, \
             press /start to begin again, or /stop to remove the keyboard.",
        )
        .sticker(Sticker::Bankrupt)
        .build()
}

pub fn throttled_notice(remaining: Duration) -> MessageTemplate {
    let seconds = remaining.as_secs_f64();
    MessageBuilder::new("Too many requests!")
        .section("casino.throttle.notice.v1", "Too many requests! Slow down a little.")
        .context("casino.throttle.retry.v1", |context| {
            context.line(format!("Try again in {seconds:.1}s."));
        })
        .build()
}

pub fn unknown_command_message(name: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Unknown command /{name}"))
        .section(
            "casino.unknown.summary.v1",
            format!("Unknown command `/{name}`. Try /help or /spin."),
        )
        .build()
}

pub fn error_message(error: &InterfaceError) -> MessageTemplate {
    let mut builder = MessageBuilder::new(error.user_message())
        .section("casino.error.summary.v1", format!("⚠️ {}", error.user_message()));
    if let InterfaceError::BadOutcome { message, .. } = error {
        let detail = message.clone();
        builder = builder.context("casino.error.detail.v1", |context| {
            context.line(detail);
        });
    }
    let correlation_id = error.correlation_id().to_owned();
    builder
        .context("casino.error.context.v1", |context| {
            context.line(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}
