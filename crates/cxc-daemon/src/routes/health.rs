use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::debug;

use crate::envelope::ok;
use crate::error::ApiError;
use crate::state::{uptime_secs, AppState};

#[derive(Serialize)]
struct HealthDto {
    service: &'static str,
    version: &'static str,
    uptime_secs: u64,
}

pub async fn health(State(state): State<AppState>) -> Response {
    sqlx::query("select 1")
        .execute(&state.pool)
        .await
        .ok();
    ok(HealthDto {
        service: state.build.service,
        version: state.build.version,
        uptime_secs: uptime_secs(),
    })
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

pub async fn odds_snapshot(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(ok(state.odds.snapshot().await))
}

pub async fn odds_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| odds_ws_loop(socket, state))
}

async fn odds_ws_loop(mut socket: WebSocket, state: AppState) {
    if let Some(snapshot) = state.odds.snapshot().await {
        if socket
            .send(Message::Text(snapshot.to_string()))
            .await
            .is_err()
        {
            return;
        }
    }

    let mut rx = state.odds.subscribe();
    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Ok(value) => {
                        if socket.send(Message::Text(value.to_string())).await.is_err() {
                            return;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "odds ws subscriber lagged, dropping stale messages");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => return,
                }
            }
        }
    }
}
