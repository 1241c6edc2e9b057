use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use slotbot_core::{ActionThrottle, ScoreStore, UserId};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct HealthState {
    pub instance_id: Uuid,
    pub throttle: Arc<ActionThrottle>,
    pub store: Arc<dyn ScoreStore>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub instance_id: String,
    pub service: HealthCheck,
    pub throttle: HealthCheck,
    pub score_store: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let score_store = score_store_check(state.store.as_ref()).await;
    let ready = score_store.status == "ready";

    let cooldowns = state
        .throttle
        .cooldowns()
        .entries()
        .map(|(action, cooldown)| format!("{action}={}ms", cooldown.as_millis()))
        .collect::<Vec<_>>()
        .join(", ");

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        instance_id: state.instance_id.to_string(),
        service: HealthCheck {
            status: "ready",
            detail: "slotbot-server runtime initialized".to_string(),
        },
        throttle: HealthCheck {
            status: "ready",
            detail: format!(
                "{} cooldown windows tracked ({cooldowns})",
                state.throttle.tracked_keys()
            ),
        },
        score_store,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn score_store_check(store: &dyn ScoreStore) -> HealthCheck {
    match store.get(&UserId::from("health-probe")).await {
        Ok(_) => HealthCheck { status: "ready", detail: "score store read succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("score store read failed: {error}") }
        }
    }
}
