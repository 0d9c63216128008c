//! Removal of stored posts that no longer pass the participation filter.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::filter;

/// Delete non-qualifying posts with their attachments and links.
/// Returns `(ed_post_id, title)` of every affected post.
pub async fn purge_non_qualifying(pool: &SqlitePool, dry_run: bool) -> Result<Vec<(i64, String)>> {
    let rows = sqlx::query("SELECT id, ed_post_id, title FROM posts ORDER BY ed_post_id")
        .fetch_all(pool)
        .await?;

    let stale: Vec<(String, i64, String)> = rows
        .iter()
        .map(|row| {
            let id: String = row.get("id");
            let ed_post_id: i64 = row.get("ed_post_id");
            let title: String = row.get("title");
            (id, ed_post_id, title)
        })
        .filter(|(_, _, title)| !filter::title_qualifies(title))
        .collect();

    if !dry_run && !stale.is_empty() {
        let mut tx = pool.begin().await?;
        for (id, _, _) in &stale {
            sqlx::query("DELETE FROM attachments WHERE post_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM links WHERE post_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM posts WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
    }

    Ok(stale
        .into_iter()
        .map(|(_, ed_post_id, title)| (ed_post_id, title))
        .collect())
}

pub async fn run_cleanup(config: &Config, dry_run: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let removed = purge_non_qualifying(&pool, dry_run).await?;

    if removed.is_empty() {
        println!("All posts match the filter");
    } else {
        let verb = if dry_run { "Would delete" } else { "Deleted" };
        println!("{} {} non-matching posts", verb, removed.len());
        for (ed_post_id, title) in &removed {
            println!("  {}  {}", ed_post_id, title);
        }
    }

    pool.close().await;
    Ok(())
}
