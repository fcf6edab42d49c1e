//! cxc-daemon entry point.
//!
//! Thin on purpose: load config, connect to Postgres and Redis, bootstrap
//! the schema, spawn the background workers, and serve HTTP. All route
//! handlers live in `routes/`; all shared state lives in `state.rs`.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};

use cxc_authz::Authz;
use cxc_config::AppConfig;
use cxc_daemon::{routes, state::AppState};
use cxc_ledger::SuperAdminCache;
use cxc_odds::OddsRelay;
use cxc_payout::PayoutQueue;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let config = AppConfig::from_env().context("loading configuration")?;

    let pool = cxc_db::connect(&config.database_url)
        .await
        .context("connecting to Postgres")?;
    cxc_db::bootstrap_all(&pool, &config)
        .await
        .context("bootstrapping schema and RBAC")?;

    let authz = Authz::new(pool.clone());
    let payout_queue = PayoutQueue::connect(&config.redis_url, config.payout_queue_key.clone())
        .await
        .context("connecting payout queue")?;
    let odds = OddsRelay::new();

    spawn_payout_workers(pool.clone(), payout_queue.clone(), config.payout_worker_concurrency);
    spawn_sweeper(pool.clone(), payout_queue.clone());
    spawn_odds_relay(config.redis_url.clone(), config.odds_channel.clone(), odds.clone());

    let bind_addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {:?}", config.bind_addr))?;
    let state = AppState::new(pool, config, authz, payout_queue, odds);

    let app = routes::build_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer());

    info!("cxc-daemon listening on http://{bind_addr}");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
}

fn spawn_payout_workers(pool: sqlx::PgPool, queue: PayoutQueue, concurrency: usize) {
    let super_admin = SuperAdminCache::new();
    for worker_id in 0..concurrency.max(1) {
        let pool = pool.clone();
        let queue = queue.clone();
        let super_admin = super_admin.clone();
        tokio::spawn(async move {
            if let Err(e) = cxc_payout::worker::run(pool, super_admin, queue).await {
                error!(worker_id, error = %e, "payout worker exited");
            }
        });
    }
}

fn spawn_sweeper(pool: sqlx::PgPool, queue: PayoutQueue) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            if let Err(e) = cxc_payout::sweeper::sweep_retry_wait(&pool, &queue).await {
                error!(error = %e, "sweep_retry_wait failed");
            }
            if let Err(e) = cxc_payout::sweeper::sweep_stalled_processing(&pool, &queue).await {
                error!(error = %e, "sweep_stalled_processing failed");
            }
        }
    });
}

fn spawn_odds_relay(redis_url: String, channel: String, relay: OddsRelay) {
    tokio::spawn(async move {
        if let Err(e) = cxc_odds::run(&redis_url, &channel, relay).await {
            error!(error = %e, "odds relay subscribe loop exited");
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, draining in-flight requests");
}
