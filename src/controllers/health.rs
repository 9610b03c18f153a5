use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::domain::feed::{ActivationState, FeedRepository};
use crate::infrastructure::db::{check_connection, DbPool};

pub struct HealthState {
    pub pool: Option<Arc<DbPool>>,
    pub feeds: Vec<FeedRepository>,
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn health_ready(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let database = match &state.pool {
        Some(pool) => match check_connection(pool).await {
            Ok(_) => "connected",
            Err(_) => "disconnected",
        },
        None => "not_configured",
    };

    let mut feeds = Map::new();
    let mut all_running = true;
    for repo in &state.feeds {
        let status = if repo.is_stopped() {
            all_running = false;
            "stopped"
        } else if repo.activation() == ActivationState::Active {
            "active"
        } else {
            "inactive"
        };
        feeds.insert(repo.key().to_string(), Value::from(status));
    }

    let ready = database != "disconnected" && all_running;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if ready { "ready" } else { "not_ready" },
            "database": database,
            "feeds": feeds,
        })),
    )
}
