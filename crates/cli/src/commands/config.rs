use std::env;
use std::fs;
use std::path::Path;

use secrecy::ExposeSecret;
use slotbot_core::config::{cooldown_env_key, resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    render(&config, resolve_config_path(None).as_deref())
}

fn render(config: &AppConfig, config_file_path: Option<&Path>) -> String {
    let config_file_doc = load_config_file_doc(config_file_path);
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path)
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    let token = match &config.bot.token {
        Some(token) => redact_token(token.expose_secret()),
        None => "<unset>".to_string(),
    };
    lines.push(render_line(
        "bot.token",
        &token,
        source("bot.token", &["SLOTBOT_BOT_TOKEN", "BOT_TOKEN"]),
    ));

    lines.push(render_line(
        "game.start_points",
        &config.game.start_points.to_string(),
        source("game.start_points", &["SLOTBOT_GAME_START_POINTS"]),
    ));
    lines.push(render_line(
        "game.reveal_delay_ms",
        &config.game.reveal_delay_ms.to_string(),
        source("game.reveal_delay_ms", &["SLOTBOT_GAME_REVEAL_DELAY_MS"]),
    ));

    for (action, cooldown) in config.throttle.cooldowns.entries() {
        let key_path = format!("throttle.cooldowns.{action}");
        let env_key = cooldown_env_key(action);
        lines.push(render_line(
            &key_path,
            &format!("{}ms", cooldown.as_millis()),
            source(&key_path, &[env_key.as_str()]),
        ));
    }
    lines.push(render_line(
        "throttle.stale_after_secs",
        &config.throttle.stale_after_secs.to_string(),
        source("throttle.stale_after_secs", &["SLOTBOT_THROTTLE_STALE_AFTER_SECS"]),
    ));
    lines.push(render_line(
        "throttle.cleanup_interval_secs",
        &config.throttle.cleanup_interval_secs.to_string(),
        source("throttle.cleanup_interval_secs", &["SLOTBOT_THROTTLE_CLEANUP_INTERVAL_SECS"]),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", &["SLOTBOT_SERVER_BIND_ADDRESS"]),
    ));
    lines.push(render_line(
        "server.health_check_port",
        &config.server.health_check_port.to_string(),
        source("server.health_check_port", &["SLOTBOT_SERVER_HEALTH_CHECK_PORT"]),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["SLOTBOT_LOGGING_LEVEL", "SLOTBOT_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["SLOTBOT_LOGGING_FORMAT", "SLOTBOT_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the public bot id before `:` and hides the secret half.
pub fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((bot_id, _)) = trimmed.split_once(':') {
        return format!("{bot_id}:***");
    }

    "<redacted>".to_string()
}
