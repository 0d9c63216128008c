//! Export stored posts as JSON.
//!
//! Produces one document with every visible post, its author, attachments,
//! and links. Hidden posts and posts by hidden students are left out.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::store::parse_tags;

#[derive(Debug, Serialize)]
pub struct ExportData {
    pub posts: Vec<ExportPost>,
}

#[derive(Debug, Serialize)]
pub struct ExportPost {
    pub ed_post_id: i64,
    pub ed_thread_id: Option<i64>,
    pub title: String,
    pub content: String,
    pub author: Option<ExportAuthor>,
    pub posted_at: Option<String>,
    pub updated_at: Option<String>,
    pub url: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub attachments: Vec<ExportAttachment>,
    pub links: Vec<ExportLink>,
}

#[derive(Debug, Serialize)]
pub struct ExportAuthor {
    pub ed_user_id: i64,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct ExportAttachment {
    pub filename: String,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub download_url: Option<String>,
    pub is_image: bool,
    pub is_pdf: bool,
}

#[derive(Debug, Serialize)]
pub struct ExportLink {
    pub url: String,
    pub title: Option<String>,
    pub link_type: String,
    pub domain: String,
}

/// Collect visible posts, newest first. Posts without a timestamp sort last.
pub async fn collect_posts(pool: &SqlitePool) -> Result<Vec<ExportPost>> {
    let post_rows = sqlx::query(
        r#"
        SELECT p.id, p.ed_post_id, p.ed_thread_id, p.title, p.content, p.posted_at,
               p.updated_at, p.url, p.category, p.tags,
               s.ed_user_id, s.display_name
        FROM posts p
        LEFT JOIN students s ON s.id = p.author_id
        WHERE p.is_hidden = 0 AND COALESCE(s.is_hidden, 0) = 0
        ORDER BY p.posted_at IS NULL, p.posted_at DESC, p.ed_post_id DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut attachments: HashMap<String, Vec<ExportAttachment>> = HashMap::new();
    for row in sqlx::query(
        "SELECT post_id, filename, file_type, file_size, download_url, is_image, is_pdf \
         FROM attachments ORDER BY rowid",
    )
    .fetch_all(pool)
    .await?
    {
        attachments
            .entry(row.get("post_id"))
            .or_default()
            .push(ExportAttachment {
                filename: row.get("filename"),
                file_type: row.get("file_type"),
                file_size: row.get("file_size"),
                download_url: row.get("download_url"),
                is_image: row.get("is_image"),
                is_pdf: row.get("is_pdf"),
            });
    }

    let mut links: HashMap<String, Vec<ExportLink>> = HashMap::new();
    for row in sqlx::query("SELECT post_id, url, title, link_type, domain FROM links ORDER BY rowid")
        .fetch_all(pool)
        .await?
    {
        links.entry(row.get("post_id")).or_default().push(ExportLink {
            url: row.get("url"),
            title: row.get("title"),
            link_type: row.get("link_type"),
            domain: row.get("domain"),
        });
    }

    let posts = post_rows
        .iter()
        .map(|row| {
            let id: String = row.get("id");
            let ed_user_id: Option<i64> = row.get("ed_user_id");
            ExportPost {
                ed_post_id: row.get("ed_post_id"),
                ed_thread_id: row.get("ed_thread_id"),
                title: row.get("title"),
                content: row.get("content"),
                author: ed_user_id.map(|ed_user_id| ExportAuthor {
                    ed_user_id,
                    display_name: row.get("display_name"),
                }),
                posted_at: row.get("posted_at"),
                updated_at: row.get("updated_at"),
                url: row.get("url"),
                category: row.get("category"),
                tags: parse_tags(row),
                attachments: attachments.remove(&id).unwrap_or_default(),
                links: links.remove(&id).unwrap_or_default(),
            }
        })
        .collect();

    Ok(posts)
}

/// Export posts as JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let pool = db::connect(config).await?;
    let posts = collect_posts(&pool).await?;
    let post_count = posts.len();

    let json = serde_json::to_string_pretty(&ExportData { posts })?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)?;
            eprintln!("Exported {} posts to {}", post_count, path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    pool.close().await;
    Ok(())
}
