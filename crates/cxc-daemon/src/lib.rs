//! cxc-daemon: the HTTP surface over the campus points economy.
//!
//! Thin on purpose — every balance-affecting or state-machine operation
//! lives in its own engine crate (`cxc-ledger`, `cxc-offers`, `cxc-bets`,
//! `cxc-admin`, `cxc-payout`); this crate only does request parsing,
//! auth/visibility checks, the `{ok,data}`/`{ok:false,...}` envelope, and
//! wiring the shared [`state::AppState`].

pub mod envelope;
pub mod error;
pub mod idempotency_guard;
pub mod middleware;
pub mod routes;
pub mod state;
