//! Database statistics and health overview.
//!
//! Prints how many posts, students, attachments and links are stored,
//! how many are hidden, and the most recent ingestion runs. Used by
//! `edthing stats` to confirm that syncs are landing.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::{IngestionRun, RunStatus};

/// Number of runs shown in the recent runs table.
const RECENT_RUNS: i64 = 10;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_posts = count(&pool, "SELECT COUNT(*) FROM posts").await?;
    let hidden_posts = count(&pool, "SELECT COUNT(*) FROM posts WHERE is_hidden = 1").await?;
    let total_students = count(&pool, "SELECT COUNT(*) FROM students").await?;
    let hidden_students = count(&pool, "SELECT COUNT(*) FROM students WHERE is_hidden = 1").await?;
    let total_attachments = count(&pool, "SELECT COUNT(*) FROM attachments").await?;
    let total_links = count(&pool, "SELECT COUNT(*) FROM links").await?;

    println!("EdThing Database Stats");
    println!("======================");
    println!();
    println!("  Database:    {}", config.db.url);
    println!();
    println!("  Posts:       {} ({} hidden)", total_posts, hidden_posts);
    println!("  Students:    {} ({} hidden)", total_students, hidden_students);
    println!("  Attachments: {}", total_attachments);
    println!("  Links:       {}", total_links);

    let runs = recent_runs(&pool, RECENT_RUNS).await?;
    if !runs.is_empty() {
        println!();
        println!("  Recent runs:");
        println!(
            "  {:<18} {:<10} {:>9} {:>7} {:>7} {:>6}",
            "STARTED", "STATUS", "PROCESSED", "CREATED", "UPDATED", "ERRORS"
        );
        println!("  {}", "-".repeat(64));

        for run in &runs {
            println!(
                "  {:<18} {:<10} {:>9} {:>7} {:>7} {:>6}",
                format_ts_relative(run.started_at),
                run.status.as_str(),
                run.posts_processed,
                run.posts_created,
                run.posts_updated,
                run.errors.len()
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

async fn count(pool: &SqlitePool, sql: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(sql).fetch_one(pool).await?)
}

/// Most recent runs, newest first. Rows with an unknown status are skipped.
pub async fn recent_runs(pool: &SqlitePool, limit: i64) -> Result<Vec<IngestionRun>> {
    let rows = sqlx::query(
        r#"
        SELECT id, status, started_at, completed_at, posts_processed,
               posts_created, posts_updated, errors
        FROM ingestion_runs
        ORDER BY started_at DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let runs = rows
        .iter()
        .filter_map(|row| {
            let status: String = row.get("status");
            let errors: String = row.get("errors");
            Some(IngestionRun {
                id: row.get("id"),
                status: RunStatus::parse(&status)?,
                started_at: row.get("started_at"),
                completed_at: row.get("completed_at"),
                posts_processed: row.get("posts_processed"),
                posts_created: row.get("posts_created"),
                posts_updated: row.get("posts_updated"),
                errors: serde_json::from_str(&errors).unwrap_or_default(),
            })
        })
        .collect();

    Ok(runs)
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
