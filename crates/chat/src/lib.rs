//! Chat Integration - transport-agnostic slot machine bot
//!
//! This crate turns chat updates into game actions:
//! - **Runner** (`runner`) - transport loop with reconnection; each update is handled on its own task
//! - **Commands** (`commands`) - `/start`, `/spin`, `/stop`, `/help` and the spin button
//! - **Events** (`events`) - dispatcher that consults the throttle before any handler
//! - **Guard** (`guard`) - per user and action cooldowns, one notice per burst
//! - **Game** (`game`) - score bookkeeping around the outcome engine
//! - **Messages** (`messages`) - reply builders with keyboard and sticker hints
//!
//! # Architecture
//!
//! ```text
//! ChatTransport → BotRunner → EventDispatcher → ThrottleGuard
//!                                   ↓
//!                             CommandHandler → SlotGameService → slotbot-core
//!                                   ↓
//!              ChatTransport::send ← MessageTemplate
//! ```
//!
//! # Key Types
//!
//! - `BotRunner` - update loop with reconnection logic and concurrent handlers
//! - `EventDispatcher` - routes events to handlers after the throttle check
//! - `SlotGameService` - the `GameCommandService` backed by a `ScoreStore`
//! - `MessageBuilder` - constructs replies

pub mod commands;
pub mod events;
pub mod game;
pub mod guard;
pub mod messages;
pub mod runner;
