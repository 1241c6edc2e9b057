use serde::Serialize;
use slotbot_core::config::{AppConfig, LoadOptions};
use slotbot_core::game::expected_delta;
use slotbot_core::ActionThrottle;

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report(AppConfig::load(LoadOptions::default()));
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report<E: std::fmt::Display>(loaded: Result<AppConfig, E>) -> DoctorReport {
    let mut checks = Vec::new();

    match loaded {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_bot_token(&config));
            checks.push(check_throttle_table(&config));
            checks.push(check_game_economy(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["bot_token_readiness", "throttle_table", "game_economy"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_bot_token(config: &AppConfig) -> DoctorCheck {
    match config.require_bot_token() {
        Ok(_) => DoctorCheck {
            name: "bot_token_readiness",
            status: CheckStatus::Pass,
            details: "token present; format validated by config contract".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "bot_token_readiness",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_throttle_table(config: &AppConfig) -> DoctorCheck {
    let throttle = ActionThrottle::new(config.throttle.cooldowns);
    let table = throttle
        .cooldowns()
        .entries()
        .map(|(action, cooldown)| format!("{action}={}ms", cooldown.as_millis()))
        .collect::<Vec<_>>()
        .join(", ");

    DoctorCheck {
        name: "throttle_table",
        status: CheckStatus::Pass,
        details: format!(
            "{table}; idle windows evicted after {}s, swept every {}s",
            config.throttle.stale_after_secs, config.throttle.cleanup_interval_secs
        ),
    }
}

fn check_game_economy(config: &AppConfig) -> DoctorCheck {
    DoctorCheck {
        name: "game_economy",
        status: CheckStatus::Pass,
        details: format!(
            "start_points={}, expected delta per spin {:+.4}",
            config.game.start_points,
            expected_delta()
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
