//! # EdThing CLI (`edthing`)
//!
//! The `edthing` binary mirrors participation posts from an Ed Discussion
//! course into a local SQLite database.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `edthing init` | Create the database and tables |
//! | `edthing sync` | Run one ingestion pass |
//! | `edthing continuous` | Sync on a fixed interval until killed |
//! | `edthing cleanup` | Delete stored posts that no longer pass the filter |
//! | `edthing export` | Dump visible posts as JSON |
//! | `edthing stats` | Print counts and recent runs |
//! | `edthing hide post <id>` | Hide (or `--unhide`) a post or a student |
//!
//! Configuration comes from the environment; see [`edthing::config`].
//! Log verbosity follows `RUST_LOG` and defaults to `edthing=info`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use edthing::store::SqliteStore;
use edthing::{cleanup, config, db, export, ingest, migrate, stats};

#[derive(Parser)]
#[command(
    name = "edthing",
    about = "Mirror Ed Discussion participation posts into a local database",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Run one ingestion pass against the configured course.
    ///
    /// Requires `ED_API_TOKEN` and `ED_COURSE_ID`.
    Sync {
        /// Only report posts since this time (RFC 3339 or YYYY-MM-DD).
        #[arg(long, value_parser = parse_since)]
        since: Option<DateTime<Utc>>,

        /// Do not fall back to the last completed run when `--since` is absent.
        #[arg(long)]
        manual: bool,
    },

    /// Sync every `SYNC_INTERVAL_MINUTES` until interrupted.
    Continuous,

    /// Delete stored posts whose title no longer passes the participation filter.
    Cleanup {
        /// List what would be deleted without deleting it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Export visible posts as JSON.
    Export {
        /// Write to this file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Print database counts and recent ingestion runs.
    Stats,

    /// Hide or unhide a post or a student.
    Hide {
        #[command(subcommand)]
        target: HideTarget,

        /// Make the entity visible again.
        #[arg(long, global = true)]
        unhide: bool,
    },
}

#[derive(Subcommand)]
enum HideTarget {
    /// Upstream post id.
    Post { id: i64 },
    /// Upstream user id.
    Student { id: i64 },
}

/// Accepts RFC 3339, `YYYY-MM-DD`, or a naive date-time read as UTC.
fn parse_since(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid timestamp '{}': expected RFC 3339 or YYYY-MM-DD", s))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("edthing=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config()?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync { since, manual } => {
            cfg.upstream()?;
            ingest::run_sync(&cfg, since, manual).await?;
        }
        Commands::Continuous => {
            cfg.upstream()?;
            ingest::run_continuous(&cfg).await?;
        }
        Commands::Cleanup { dry_run } => {
            cleanup::run_cleanup(&cfg, dry_run).await?;
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Hide { target, unhide } => {
            let store = SqliteStore::new(db::connect(&cfg).await?);
            let hidden = !unhide;
            let verb = if hidden { "Hidden" } else { "Unhidden" };
            let result = match target {
                HideTarget::Post { id } => match store.set_post_hidden(id, hidden).await {
                    Ok(true) => {
                        println!("{} post {}", verb, id);
                        Ok(())
                    }
                    Ok(false) => Err(anyhow::anyhow!("No stored post with id {}", id)),
                    Err(e) => Err(e),
                },
                HideTarget::Student { id } => store.set_student_hidden(id, hidden).await.map(|()| {
                    println!("{} student {}", verb, id);
                }),
            };
            store.pool().close().await;
            result?;
        }
    }

    Ok(())
}
