//! Single-source-of-truth runtime configuration.
//!
//! # Contract
//! - Every setting is resolved **once**, at startup, by [`AppConfig::from_env`].
//! - The resolved [`AppConfig`] is passed into component constructors; no
//!   component scatters its own `std::env::var` calls after startup.
//! - `Debug` redacts every secret-shaped field — error messages and logs
//!   reference env var *names*, never values.

use std::fmt;

use anyhow::{bail, Context, Result};

const ENV_DATABASE_URL: &str = "CXC_DATABASE_URL";
const ENV_REDIS_URL: &str = "CXC_REDIS_URL";
const ENV_JWT_SECRET: &str = "CXC_JWT_SECRET";
const ENV_LOG_LEVEL: &str = "CXC_LOG_LEVEL";
const ENV_TRUST_PROXY: &str = "CXC_TRUST_PROXY";
const ENV_BIND_ADDR: &str = "CXC_BIND_ADDR";
const ENV_ADMIN_BOOTSTRAP_EMAIL: &str = "CXC_ADMIN_BOOTSTRAP_EMAIL";
const ENV_ADMIN_BOOTSTRAP_USER_ID: &str = "CXC_ADMIN_BOOTSTRAP_USER_ID";
const ENV_PAYOUT_MAX_ATTEMPTS: &str = "CXC_PAYOUT_MAX_ATTEMPTS";
const ENV_PAYOUT_WORKER_CONCURRENCY: &str = "CXC_PAYOUT_WORKER_CONCURRENCY";
const ENV_ODDS_CHANNEL: &str = "CXC_ODDS_CHANNEL";
const ENV_PAYOUT_QUEUE_KEY: &str = "CXC_PAYOUT_QUEUE_KEY";

/// JWT secrets matching any of these values (case-insensitive) are rejected
/// at startup — they are placeholder values left behind in example `.env`
/// files, never a real signing key.
const SENTINEL_SECRETS: &[&str] = &["change-me", "changeme", "secret", "password", "insecure"];

/// Who the super-admin bootstrap identifies, resolved from exactly one of
/// `CXC_ADMIN_BOOTSTRAP_EMAIL` / `CXC_ADMIN_BOOTSTRAP_USER_ID`.
#[derive(Clone)]
pub enum AdminBootstrap {
    Email(String),
    UserId(uuid::Uuid),
}

impl fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email(e) => write!(f, "AdminBootstrap::Email({e})"),
            Self::UserId(id) => write!(f, "AdminBootstrap::UserId({id})"),
        }
    }
}

/// All runtime configuration for one process instantiation.
///
/// Built **once** via [`AppConfig::from_env`]. `Debug` redacts `jwt_secret`.
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub log_level: String,
    pub trust_proxy: bool,
    pub bind_addr: String,
    pub admin_bootstrap: AdminBootstrap,
    pub payout_max_attempts: u32,
    pub payout_worker_concurrency: usize,
    pub odds_channel: String,
    pub payout_queue_key: String,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"<REDACTED>")
            .field("redis_url", &"<REDACTED>")
            .field("jwt_secret", &"<REDACTED>")
            .field("log_level", &self.log_level)
            .field("trust_proxy", &self.trust_proxy)
            .field("bind_addr", &self.bind_addr)
            .field("admin_bootstrap", &self.admin_bootstrap)
            .field("payout_max_attempts", &self.payout_max_attempts)
            .field("payout_worker_concurrency", &self.payout_worker_concurrency)
            .field("odds_channel", &self.odds_channel)
            .field("payout_queue_key", &self.payout_queue_key)
            .finish()
    }
}

impl AppConfig {
    /// Resolve configuration from the process environment, failing fast
    /// (rather than at first use) on anything a misconfigured deployment
    /// would otherwise only discover at 3am.
    pub fn from_env() -> Result<Self> {
        let database_url =
            require_env(ENV_DATABASE_URL).context("database connection is mandatory")?;
        let redis_url = require_env(ENV_REDIS_URL).context("redis connection is mandatory")?;

        let jwt_secret = require_env(ENV_JWT_SECRET).context("JWT signing secret is mandatory")?;
        if jwt_secret.trim().is_empty() {
            bail!("{ENV_JWT_SECRET} must not be empty");
        }
        let lowered = jwt_secret.to_ascii_lowercase();
        if SENTINEL_SECRETS.contains(&lowered.as_str()) {
            bail!("{ENV_JWT_SECRET} is a placeholder value; set a real signing secret");
        }

        let admin_bootstrap = resolve_admin_bootstrap()?;

        let log_level = std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string());
        let trust_proxy = std::env::var(ENV_TRUST_PROXY)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let bind_addr =
            std::env::var(ENV_BIND_ADDR).unwrap_or_else(|_| "127.0.0.1:8080".to_string());

        let payout_max_attempts = parse_env_or(ENV_PAYOUT_MAX_ATTEMPTS, 8u32)?;
        let payout_worker_concurrency = parse_env_or(ENV_PAYOUT_WORKER_CONCURRENCY, 4usize)?;

        let odds_channel =
            std::env::var(ENV_ODDS_CHANNEL).unwrap_or_else(|_| "odds.updates".to_string());
        let payout_queue_key =
            std::env::var(ENV_PAYOUT_QUEUE_KEY).unwrap_or_else(|_| "payout:jobs".to_string());

        Ok(Self {
            database_url,
            redis_url,
            jwt_secret,
            log_level,
            trust_proxy,
            bind_addr,
            admin_bootstrap,
            payout_max_attempts,
            payout_worker_concurrency,
            odds_channel,
            payout_queue_key,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing required env var {name}"))
}

fn parse_env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(v) => v
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {name}: {e}")),
        Err(_) => Ok(default),
    }
}

fn resolve_admin_bootstrap() -> Result<AdminBootstrap> {
    if let Ok(email) = std::env::var(ENV_ADMIN_BOOTSTRAP_EMAIL) {
        if !email.trim().is_empty() {
            return Ok(AdminBootstrap::Email(email));
        }
    }
    if let Ok(raw_id) = std::env::var(ENV_ADMIN_BOOTSTRAP_USER_ID) {
        let id = uuid::Uuid::parse_str(&raw_id)
            .with_context(|| format!("{ENV_ADMIN_BOOTSTRAP_USER_ID} is not a valid UUID"))?;
        return Ok(AdminBootstrap::UserId(id));
    }
    bail!(
        "one of {ENV_ADMIN_BOOTSTRAP_EMAIL} or {ENV_ADMIN_BOOTSTRAP_USER_ID} must be set \
         to identify the super-admin bootstrap target"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for var in [
            ENV_DATABASE_URL,
            ENV_REDIS_URL,
            ENV_JWT_SECRET,
            ENV_LOG_LEVEL,
            ENV_TRUST_PROXY,
            ENV_BIND_ADDR,
            ENV_ADMIN_BOOTSTRAP_EMAIL,
            ENV_ADMIN_BOOTSTRAP_USER_ID,
            ENV_PAYOUT_MAX_ATTEMPTS,
            ENV_PAYOUT_WORKER_CONCURRENCY,
            ENV_ODDS_CHANNEL,
            ENV_PAYOUT_QUEUE_KEY,
        ] {
            std::env::remove_var(var);
        }
    }

    // NOTE: these tests mutate process-global env vars, so they run serially
    // within this module by construction (cargo test runs each #[test] fn in
    // its own thread by default, but std::env access here is still only
    // exercised by this crate's own test binary).
    #[test]
    fn rejects_sentinel_jwt_secret() {
        clear_env();
        std::env::set_var(ENV_DATABASE_URL, "postgres://x");
        std::env::set_var(ENV_REDIS_URL, "redis://x");
        std::env::set_var(ENV_JWT_SECRET, "change-me");
        std::env::set_var(ENV_ADMIN_BOOTSTRAP_EMAIL, "root@campus.edu");

        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("placeholder"));
        clear_env();
    }

    #[test]
    fn rejects_missing_admin_bootstrap() {
        clear_env();
        std::env::set_var(ENV_DATABASE_URL, "postgres://x");
        std::env::set_var(ENV_REDIS_URL, "redis://x");
        std::env::set_var(ENV_JWT_SECRET, "a-real-secret-value");

        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("ADMIN_BOOTSTRAP"));
        clear_env();
    }

    #[test]
    fn debug_redacts_secrets() {
        clear_env();
        std::env::set_var(ENV_DATABASE_URL, "postgres://user:pw@host/db");
        std::env::set_var(ENV_REDIS_URL, "redis://host");
        std::env::set_var(ENV_JWT_SECRET, "a-real-secret-value");
        std::env::set_var(ENV_ADMIN_BOOTSTRAP_EMAIL, "root@campus.edu");

        let cfg = AppConfig::from_env().unwrap();
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("a-real-secret-value"));
        assert!(!dbg.contains("user:pw"));
        clear_env();
    }
}
