//! Shared runtime state for cxc-daemon.
//!
//! Every field here is constructed once in `main.rs` from a resolved
//! `AppConfig` and cloned (cheaply, via `Arc`/`PgPool`'s internal pool
//! handle) into the Axum router. No handler reads `std::env::var` itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cxc_authz::Authz;
use cxc_config::AppConfig;
use cxc_ledger::SuperAdminCache;
use cxc_odds::OddsRelay;
use cxc_payout::PayoutQueue;
use sqlx::PgPool;

/// Process-local request counters exposed at `GET /metrics`. This is not a
/// real collector backend — just enough to satisfy the contract without a
/// vendor integration (out of scope).
#[derive(Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

impl Metrics {
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render(&self) -> String {
        format!(
            "cxc_requests_total {}\ncxc_errors_total {}\n",
            self.requests_total.load(Ordering::Relaxed),
            self.errors_total.load(Ordering::Relaxed),
        )
    }
}

/// Static build metadata included in health responses.
#[derive(Clone, Debug, serde::Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub authz: Authz,
    pub super_admin: SuperAdminCache,
    pub payout_queue: PayoutQueue,
    pub odds: OddsRelay,
    pub build: BuildInfo,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        authz: Authz,
        payout_queue: PayoutQueue,
        odds: OddsRelay,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            authz,
            super_admin: SuperAdminCache::new(),
            payout_queue,
            odds,
            build: BuildInfo {
                service: "cxc-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            metrics: Arc::new(Metrics::default()),
        }
    }
}

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}
