use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::throttle::{ActionKey, CooldownTable, ThrottleError};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub game: GameConfig,
    pub throttle: ThrottleConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct GameConfig {
    pub start_points: i64,
    pub reveal_delay_ms: u64,
}

impl GameConfig {
    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_delay_ms)
    }
}

#[derive(Clone, Debug)]
pub struct ThrottleConfig {
    pub cooldowns: CooldownTable,
    pub stale_after_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl ThrottleConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bot_token: Option<String>,
    pub log_level: Option<String>,
    pub start_points: Option<i64>,
    pub reveal_delay_ms: Option<u64>,
    pub cooldowns_ms: Vec<(ActionKey, u64)>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error(transparent)]
    Throttle(#[from] ThrottleError),
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_START_POINTS: i64 = 50;

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bot: BotConfig { token: None },
            game: GameConfig { start_points: DEFAULT_START_POINTS, reveal_delay_ms: 2_000 },
            throttle: ThrottleConfig {
                cooldowns: CooldownTable::default(),
                stale_after_secs: 3_600,
                cleanup_interval_secs: 300,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("slotbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(bot) = patch.bot {
            if let Some(token) = bot.token {
                self.bot.token = Some(secret_value(token));
            }
        }

        if let Some(game) = patch.game {
            if let Some(start_points) = game.start_points {
                self.game.start_points = start_points;
            }
            if let Some(reveal_delay_ms) = game.reveal_delay_ms {
                self.game.reveal_delay_ms = reveal_delay_ms;
            }
        }

        if let Some(throttle) = patch.throttle {
            for (name, millis) in throttle.cooldowns.unwrap_or_default() {
                let action = name.parse::<ActionKey>()?;
                self.throttle.cooldowns.set(action, Duration::from_millis(millis));
            }
            if let Some(stale_after_secs) = throttle.stale_after_secs {
                self.throttle.stale_after_secs = stale_after_secs;
            }
            if let Some(cleanup_interval_secs) = throttle.cleanup_interval_secs {
                self.throttle.cleanup_interval_secs = cleanup_interval_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let token = read_env("SLOTBOT_BOT_TOKEN").or_else(|| read_env("BOT_TOKEN"));
        if let Some(value) = token {
            self.bot.token = Some(secret_value(value));
        }

        if let Some(value) = read_env("SLOTBOT_GAME_START_POINTS") {
            self.game.start_points = parse_i64("SLOTBOT_GAME_START_POINTS", &value)?;
        }
        if let Some(value) = read_env("SLOTBOT_GAME_REVEAL_DELAY_MS") {
            self.game.reveal_delay_ms = parse_u64("SLOTBOT_GAME_REVEAL_DELAY_MS", &value)?;
        }

        for action in ActionKey::ALL {
            let key = cooldown_env_key(action);
            if let Some(value) = read_env(&key) {
                let millis = parse_u64(&key, &value)?;
                self.throttle.cooldowns.set(action, Duration::from_millis(millis));
            }
        }
        if let Some(value) = read_env("SLOTBOT_THROTTLE_STALE_AFTER_SECS") {
            self.throttle.stale_after_secs =
                parse_u64("SLOTBOT_THROTTLE_STALE_AFTER_SECS", &value)?;
        }
        if let Some(value) = read_env("SLOTBOT_THROTTLE_CLEANUP_INTERVAL_SECS") {
            self.throttle.cleanup_interval_secs =
                parse_u64("SLOTBOT_THROTTLE_CLEANUP_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("SLOTBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SLOTBOT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("SLOTBOT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        let log_level = read_env("SLOTBOT_LOGGING_LEVEL").or_else(|| read_env("SLOTBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SLOTBOT_LOGGING_FORMAT").or_else(|| read_env("SLOTBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bot_token) = overrides.bot_token {
            self.bot.token = Some(secret_value(bot_token));
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(start_points) = overrides.start_points {
            self.game.start_points = start_points;
        }
        if let Some(reveal_delay_ms) = overrides.reveal_delay_ms {
            self.game.reveal_delay_ms = reveal_delay_ms;
        }
        for (action, millis) in overrides.cooldowns_ms {
            self.throttle.cooldowns.set(action, Duration::from_millis(millis));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_bot(&self.bot)?;
        validate_game(&self.game)?;
        validate_throttle(&self.throttle)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// The bot token, required by the long-running bot process but not by offline tools.
    pub fn require_bot_token(&self) -> Result<&SecretString, ConfigError> {
        self.bot.token.as_ref().ok_or_else(|| {
            ConfigError::Validation(
                "bot.token is required. Set SLOTBOT_BOT_TOKEN (or BOT_TOKEN) or `[bot] token`"
                    .to_string(),
            )
        })
    }
}

pub fn cooldown_env_key(action: ActionKey) -> String {
    format!("SLOTBOT_THROTTLE_{}_MS", action.as_str().to_ascii_uppercase())
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("slotbot.toml"), PathBuf::from("config/slotbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_bot(bot: &BotConfig) -> Result<(), ConfigError> {
    let Some(token) = &bot.token else {
        return Ok(());
    };

    let token = token.expose_secret().trim();
    let well_formed = match token.split_once(':') {
        Some((bot_id, secret)) => {
            !bot_id.is_empty() && bot_id.chars().all(|c| c.is_ascii_digit()) && !secret.is_empty()
        }
        None => false,
    };
    if !well_formed {
        return Err(ConfigError::Validation(
            "bot.token must look like `<numeric bot id>:<secret>` as issued by the bot registry"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_game(game: &GameConfig) -> Result<(), ConfigError> {
    if game.start_points <= 0 {
        return Err(ConfigError::Validation(
            "game.start_points must be greater than zero".to_string(),
        ));
    }

    if game.reveal_delay_ms > 60_000 {
        return Err(ConfigError::Validation(
            "game.reveal_delay_ms must be in range 0..=60000".to_string(),
        ));
    }

    Ok(())
}

fn validate_throttle(throttle: &ThrottleConfig) -> Result<(), ConfigError> {
    if throttle.stale_after_secs == 0 {
        return Err(ConfigError::Validation(
            "throttle.stale_after_secs must be greater than zero".to_string(),
        ));
    }

    if throttle.cleanup_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "throttle.cleanup_interval_secs must be greater than zero".to_string(),
        ));
    }

    if throttle.stale_after() < throttle.cooldowns.longest() {
        return Err(ConfigError::Validation(
            "throttle.stale_after_secs must cover the longest configured cooldown".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    bot: Option<BotPatch>,
    game: Option<GamePatch>,
    throttle: Option<ThrottlePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BotPatch {
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GamePatch {
    start_points: Option<i64>,
    reveal_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ThrottlePatch {
    cooldowns: Option<BTreeMap<String, u64>>,
    stale_after_secs: Option<u64>,
    cleanup_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
