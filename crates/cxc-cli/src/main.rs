//! Operator CLI for the campus points-economy daemon.
//!
//! Thin on purpose: each subcommand connects, does one thing, and prints a
//! plain `key=value` summary line so it's easy to grep in a shell session.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cxc_config::AppConfig;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "cxc")]
#[command(about = "Campus points-economy operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Payout queue/job recovery commands
    Payout {
        #[command(subcommand)]
        cmd: PayoutCmd,
    },

    /// Load configuration from the environment and print a redacted summary
    ConfigCheck,
}

#[derive(Subcommand)]
enum DbCmd {
    /// Connectivity + schema-presence check
    Status,
    /// Run the idempotent schema bootstrap and RBAC/super-admin seed
    Migrate,
    /// Seed a small set of demo users/groups for local development
    Seed,
}

#[derive(Subcommand)]
enum PayoutCmd {
    /// Move a `dead` payout job back to `queued` and push it onto the queue
    RequeueDead {
        #[arg(long)]
        job_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => run_db_cmd(cmd).await?,
        Commands::Payout { cmd } => run_payout_cmd(cmd).await?,
        Commands::ConfigCheck => run_config_check()?,
    }

    Ok(())
}

async fn run_db_cmd(cmd: DbCmd) -> Result<()> {
    let pool = cxc_db::connect_from_env()
        .await
        .context("connecting to Postgres")?;

    match cmd {
        DbCmd::Status => {
            let status = cxc_db::status(&pool).await?;
            println!("db_ok={} has_users_table={}", status.ok, status.has_users_table);
        }
        DbCmd::Migrate => {
            let config = AppConfig::from_env().context("loading configuration")?;
            cxc_db::bootstrap_all(&pool, &config).await?;
            println!("bootstrap_applied=true");
        }
        DbCmd::Seed => {
            seed_demo_data(&pool).await?;
            println!("seed_applied=true");
        }
    }
    Ok(())
}

async fn seed_demo_data(pool: &sqlx::PgPool) -> Result<()> {
    let demo_users = [
        ("alice@campus.edu", 500_i64),
        ("bob@campus.edu", 500_i64),
        ("carol@campus.edu", 500_i64),
    ];

    for (email, points) in demo_users {
        sqlx::query(
            r#"
            insert into users (email, password_hash, points)
            values ($1, '$argon2id$seed$placeholder', $2)
            on conflict (email) do nothing
            "#,
        )
        .bind(email)
        .bind(points)
        .execute(pool)
        .await
        .with_context(|| format!("seeding demo user {email}"))?;
    }

    sqlx::query("insert into groups (name) values ('Demo Group') on conflict do nothing")
        .execute(pool)
        .await
        .context("seeding demo group")?;

    Ok(())
}

async fn run_payout_cmd(cmd: PayoutCmd) -> Result<()> {
    let config = AppConfig::from_env().context("loading configuration")?;
    let pool = cxc_db::connect_from_env()
        .await
        .context("connecting to Postgres")?;
    let queue = cxc_payout::PayoutQueue::connect(&config.redis_url, config.payout_queue_key.clone())
        .await
        .context("connecting to payout queue")?;

    match cmd {
        PayoutCmd::RequeueDead { job_id } => {
            let requeued = cxc_payout::sweeper::requeue_dead(&pool, &queue, job_id).await?;
            println!("job_id={job_id} requeued={requeued}");
        }
    }
    Ok(())
}

fn run_config_check() -> Result<()> {
    let config = AppConfig::from_env().context("loading configuration")?;
    println!("{config:?}");
    Ok(())
}
