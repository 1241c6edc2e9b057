//! Game command service: score bookkeeping around the pure outcome engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use slotbot_core::config::GameConfig;
use slotbot_core::game::combo::{MAX_RAW_OUTCOME, MIN_RAW_OUTCOME};
use slotbot_core::{play, ApplicationError, ScoreStore};
use tracing::info;

use crate::commands::{CommandEnvelope, GameCommandService};
use crate::messages::{self, MessageTemplate};

/// Produces the raw dice value for a spin.
///
/// Rolling is the first thing the user sees of a spin: an implementation shows the reels
/// (on chat platforms, by sending the slot dice animation) before returning the value they
/// stopped on. The service then waits out the reveal delay and replies with the result.
#[async_trait]
pub trait DiceRoller: Send + Sync {
    async fn roll(&self, chat_id: &str) -> Result<i64, ApplicationError>;
}

/// Draws a value locally and shows nothing. For headless runs where no chat can see the reels.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomDice;

#[async_trait]
impl DiceRoller for RandomDice {
    async fn roll(&self, _chat_id: &str) -> Result<i64, ApplicationError> {
        let raw = rand::thread_rng().gen_range(MIN_RAW_OUTCOME..=MAX_RAW_OUTCOME);
        Ok(raw)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GameSettings {
    pub start_points: i64,
    pub reveal_delay: Duration,
}

impl From<&GameConfig> for GameSettings {
    fn from(config: &GameConfig) -> Self {
        Self { start_points: config.start_points, reveal_delay: config.reveal_delay() }
    }
}

pub struct SlotGameService {
    store: Arc<dyn ScoreStore>,
    dice: Arc<dyn DiceRoller>,
    settings: GameSettings,
}

impl SlotGameService {
    pub fn new(store: Arc<dyn ScoreStore>, dice: Arc<dyn DiceRoller>, settings: GameSettings) -> Self {
        Self { store, dice, settings }
    }

    pub fn settings(&self) -> GameSettings {
        self.settings
    }
}

#[async_trait]
impl GameCommandService for SlotGameService {
    async fn start(&self, envelope: &CommandEnvelope) -> Result<MessageTemplate, ApplicationError> {
        self.store.set(&envelope.user_id, self.settings.start_points).await?;
        info!(
            event_name = "game.score.reset",
            correlation_id = %envelope.request_id,
            user_id = %envelope.user_id,
            score = self.settings.start_points,
            "score reset"
        );
        Ok(messages::welcome_message(self.settings.start_points))
    }

    async fn spin(&self, envelope: &CommandEnvelope) -> Result<MessageTemplate, ApplicationError> {
        let score =
            self.store.get(&envelope.user_id).await?.unwrap_or(self.settings.start_points);
        if score <= 0 {
            info!(
                event_name = "game.spin.bankrupt",
                correlation_id = %envelope.request_id,
                user_id = %envelope.user_id,
                "spin refused on empty balance"
            );
            return Ok(messages::bankrupt_message());
        }

        let raw = self.dice.roll(&envelope.chat_id).await?;
        let outcome = play(raw)?;
        // A /start can land while the dice is rolling, so the delta is applied to whatever
        // score is stored now rather than to the balance read above.
        let new_score = self
            .store
            .adjust(&envelope.user_id, self.settings.start_points, outcome.payout.delta)
            .await?;

        info!(
            event_name = "game.spin.settled",
            correlation_id = %envelope.request_id,
            user_id = %envelope.user_id,
            raw,
            combination = %outcome.combination,
            delta = outcome.payout.delta,
            score = new_score,
            "spin settled"
        );

        // Let the reel animation finish before revealing the result.
        if !self.settings.reveal_delay.is_zero() {
            tokio::time::sleep(self.settings.reveal_delay).await;
        }

        Ok(messages::spin_result_message(&outcome, new_score))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use slotbot_core::{
        ApplicationError, DomainError, InMemoryScoreStore, ScoreStore, StoreError, UserId,
    };
    use tokio::sync::{Mutex, Notify};

    use super::{DiceRoller, GameSettings, RandomDice, SlotGameService};
    use crate::commands::{BotCommand, CommandEnvelope, GameCommandService};
    use crate::messages::{Keyboard, Sticker};

    #[derive(Default)]
    struct ScriptedDice {
        values: Mutex<VecDeque<i64>>,
    }

    impl ScriptedDice {
        fn new(values: &[i64]) -> Self {
            Self { values: Mutex::new(values.iter().copied().collect()) }
        }
    }

    #[async_trait]
    impl DiceRoller for ScriptedDice {
        async fn roll(&self, _chat_id: &str) -> Result<i64, ApplicationError> {
            self.values
                .lock()
                .await
                .pop_front()
                .ok_or_else(|| ApplicationError::Integration("dice script exhausted".to_owned()))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ScoreStore for BrokenStore {
        async fn get(&self, _user_id: &UserId) -> Result<Option<i64>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_owned()))
        }

        async fn set(&self, _user_id: &UserId, _score: i64) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_owned()))
        }

        async fn adjust(
            &self,
            _user_id: &UserId,
            _initial: i64,
            _delta: i64,
        ) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_owned()))
        }
    }

    /// Holds every roll until the test releases it.
    struct GatedDice {
        value: i64,
        rolling: Notify,
        release: Notify,
    }

    impl GatedDice {
        fn new(value: i64) -> Self {
            Self { value, rolling: Notify::new(), release: Notify::new() }
        }
    }

    #[async_trait]
    impl DiceRoller for GatedDice {
        async fn roll(&self, _chat_id: &str) -> Result<i64, ApplicationError> {
            self.rolling.notify_one();
            self.release.notified().await;
            Ok(self.value)
        }
    }

    fn settings(start_points: i64) -> GameSettings {
        GameSettings { start_points, reveal_delay: Duration::ZERO }
    }

    fn envelope(command: BotCommand) -> CommandEnvelope {
        CommandEnvelope {
            command,
            args: String::new(),
            chat_id: "100".to_owned(),
            user_id: UserId::from("42"),
            request_id: "upd-1".to_owned(),
        }
    }

    fn service(store: Arc<InMemoryScoreStore>, dice: &[i64], start_points: i64) -> SlotGameService {
        SlotGameService::new(store, Arc::new(ScriptedDice::new(dice)), settings(start_points))
    }

    #[tokio::test]
    async fn first_spin_starts_from_start_points() {
        let store = Arc::new(InMemoryScoreStore::new());
        let game = service(store.clone(), &[64], 50);

        let reply = game.spin(&envelope(BotCommand::Spin)).await.expect("spin");

        assert_eq!(store.get(&UserId::from("42")).await.expect("get"), Some(59));
        assert!(reply.render_plain().contains("Your score: 59."));
        assert_eq!(reply.keyboard, Keyboard::Spin);
    }

    #[tokio::test]
    async fn losing_spin_costs_one_point() {
        let store = Arc::new(InMemoryScoreStore::new());
        store.set(&UserId::from("42"), 10).await.expect("seed");
        let game = service(store.clone(), &[2], 50);

        game.spin(&envelope(BotCommand::Spin)).await.expect("spin");

        assert_eq!(store.get(&UserId::from("42")).await.expect("get"), Some(9));
    }

    #[tokio::test]
    async fn start_resets_score_and_shows_keyboard() {
        let store = Arc::new(InMemoryScoreStore::new());
        store.set(&UserId::from("42"), 0).await.expect("seed");
        let game = service(store.clone(), &[], 50);

        let reply = game.start(&envelope(BotCommand::Start)).await.expect("start");

        assert_eq!(store.get(&UserId::from("42")).await.expect("get"), Some(50));
        assert_eq!(reply.keyboard, Keyboard::Spin);
    }

    #[tokio::test]
    async fn bankrupt_user_gets_sticker_and_no_roll() {
        let store = Arc::new(InMemoryScoreStore::new());
        store.set(&UserId::from("42"), 0).await.expect("seed");
        // Empty script: rolling would fail the test.
        let game = service(store.clone(), &[], 50);

        let reply = game.spin(&envelope(BotCommand::Spin)).await.expect("spin");

        assert_eq!(reply.sticker, Some(Sticker::Bankrupt));
        assert_eq!(store.get(&UserId::from("42")).await.expect("get"), Some(0));
    }

    #[tokio::test]
    async fn last_point_can_be_spent_then_user_is_bankrupt() {
        let store = Arc::new(InMemoryScoreStore::new());
        let game = service(store.clone(), &[2], 1);

        let first = game.spin(&envelope(BotCommand::Spin)).await.expect("spin");
        let second = game.spin(&envelope(BotCommand::Spin)).await.expect("spin");

        assert_eq!(first.sticker, None);
        assert_eq!(second.sticker, Some(Sticker::Bankrupt));
    }

    #[tokio::test]
    async fn out_of_range_dice_leaves_score_untouched() {
        let store = Arc::new(InMemoryScoreStore::new());
        store.set(&UserId::from("42"), 20).await.expect("seed");
        let game = service(store.clone(), &[0], 50);

        let error = game.spin(&envelope(BotCommand::Spin)).await.expect_err("bad dice");

        assert!(matches!(error, ApplicationError::Domain(DomainError::Combo(_))));
        assert_eq!(store.get(&UserId::from("42")).await.expect("get"), Some(20));
    }

    #[tokio::test]
    async fn store_failure_propagates_as_persistence_error() {
        let game = SlotGameService::new(
            Arc::new(BrokenStore),
            Arc::new(ScriptedDice::new(&[64])),
            settings(50),
        );

        let error = game.spin(&envelope(BotCommand::Spin)).await.expect_err("store down");

        assert!(matches!(error, ApplicationError::Persistence(_)));
    }

    #[tokio::test]
    async fn start_during_roll_is_not_overwritten_by_the_spin() {
        let store = Arc::new(InMemoryScoreStore::new());
        store.set(&UserId::from("42"), 10).await.expect("seed");
        let dice = Arc::new(GatedDice::new(2));
        let game = Arc::new(SlotGameService::new(store.clone(), dice.clone(), settings(50)));

        let spinning = tokio::spawn({
            let game = game.clone();
            async move { game.spin(&envelope(BotCommand::Spin)).await }
        });
        dice.rolling.notified().await;
        game.start(&envelope(BotCommand::Start)).await.expect("start");
        dice.release.notify_one();
        let reply = spinning.await.expect("join").expect("spin");

        assert_eq!(store.get(&UserId::from("42")).await.expect("get"), Some(49));
        assert!(reply.render_plain().contains("Your score: 49."));
    }

    #[tokio::test(start_paused = true)]
    async fn reply_waits_for_reveal_delay() {
        let store = Arc::new(InMemoryScoreStore::new());
        let game = SlotGameService::new(
            store,
            Arc::new(ScriptedDice::new(&[22])),
            GameSettings { start_points: 50, reveal_delay: Duration::from_secs(2) },
        );

        let started = tokio::time::Instant::now();
        game.spin(&envelope(BotCommand::Spin)).await.expect("spin");

        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn random_dice_stays_in_range() {
        for _ in 0..256 {
            let raw = RandomDice.roll("100").await.expect("roll");
            assert!((1..=64).contains(&raw));
        }
    }
}
