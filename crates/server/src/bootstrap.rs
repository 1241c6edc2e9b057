use std::sync::Arc;

use slotbot_chat::events::game_dispatcher;
use slotbot_chat::game::{GameSettings, RandomDice, SlotGameService};
use slotbot_chat::guard::ThrottleGuard;
use slotbot_chat::runner::{BotRunner, NoopChatTransport, ReconnectPolicy};
use slotbot_core::config::{AppConfig, ConfigError};
use slotbot_core::{ActionThrottle, InMemoryScoreStore, ScoreStore};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub struct Application {
    pub config: AppConfig,
    pub instance_id: Uuid,
    pub throttle: Arc<ActionThrottle>,
    pub store: Arc<dyn ScoreStore>,
    pub bot_runner: BotRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let instance_id = Uuid::new_v4();
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        instance_id = %instance_id,
        "starting application bootstrap"
    );
    config.require_bot_token()?;

    let store: Arc<dyn ScoreStore> = Arc::new(InMemoryScoreStore::new());
    let throttle = Arc::new(ActionThrottle::new(config.throttle.cooldowns));
    let service = Arc::new(SlotGameService::new(
        store.clone(),
        Arc::new(RandomDice),
        GameSettings::from(&config.game),
    ));
    let guard = ThrottleGuard::with_system_clock(throttle.clone());
    let bot_runner = BotRunner::new(
        Arc::new(NoopChatTransport),
        game_dispatcher(service, Some(guard)),
        ReconnectPolicy::default(),
    );

    for (action, cooldown) in config.throttle.cooldowns.entries() {
        info!(
            event_name = "system.bootstrap.cooldown_registered",
            correlation_id = "bootstrap",
            action = %action,
            cooldown_ms = cooldown.as_millis() as u64,
            "throttle cooldown registered"
        );
    }

    Ok(Application { config, instance_id, throttle, store, bot_runner })
}

#[cfg(test)]
mod tests {
    use slotbot_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use slotbot_core::ActionKey;

    use crate::bootstrap::{bootstrap_with_config, BootstrapError};

    fn load(token: &str) -> AppConfig {
        AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                bot_token: Some(token.to_string()),
                cooldowns_ms: vec![(ActionKey::Spin, 2_500)],
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("config should load")
    }

    #[test]
    fn bootstrap_fails_fast_without_bot_token() {
        let mut config = AppConfig::default();
        config.bot.token = None;

        let result = bootstrap_with_config(config);

        assert!(matches!(result, Err(BootstrapError::Config(_))));
        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("bot.token"));
    }

    #[test]
    fn bootstrap_wires_throttle_from_config() {
        let app = bootstrap_with_config(load("123456:valid-secret"))
            .expect("bootstrap should succeed");

        assert_eq!(app.throttle.cooldowns().cooldown(ActionKey::Spin).as_millis(), 2_500);
        assert_eq!(app.throttle.tracked_keys(), 0);
        assert_eq!(app.bot_runner.dispatcher().handler_count(), 2);
        assert!(app.bot_runner.dispatcher().guard().is_some());
    }

    #[tokio::test]
    async fn bootstrapped_runner_drains_noop_transport() {
        let app = bootstrap_with_config(load("123456:valid-secret"))
            .expect("bootstrap should succeed");

        app.bot_runner.start().await.expect("noop transport ends cleanly");
    }
}
