//! Shared entity and value types for the campus points-economy core.
//!
//! This crate carries no logic and no `sqlx` dependency — it is the common
//! vocabulary that `cxc-ledger`, `cxc-offers`, `cxc-bets`, `cxc-payout`,
//! `cxc-admin`, and `cxc-daemon` all speak, the way `mqk-schemas` is the
//! shared vocabulary across the trading-core crates it was grounded on.

pub mod entities;
pub mod money;

pub use entities::*;
pub use money::{fee_on, OddsCenti, Points};
