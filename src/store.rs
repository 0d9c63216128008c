//! Persistence gateway.
//!
//! The [`PostStore`] trait is everything the orchestrator needs from
//! storage: rule lookup, run lifecycle records, the hidden-entity
//! snapshot, and idempotent upserts keyed by upstream IDs.
//! [`SqliteStore`] implements it over the schema in [`crate::migrate`].
//!
//! Post upserts replace the post's attachments and links wholesale inside
//! the same transaction as the post row, so a failed upsert leaves the
//! previous version intact.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{AuthorInfo, Post, SyncStats, UpsertOutcome};
use crate::rules::{ParticipationRules, RULES_KEY};

/// Answers whether an upstream entity is excluded from ingestion.
pub trait Visibility: Send + Sync {
    fn is_post_hidden(&self, ed_post_id: i64) -> bool;
    fn is_student_hidden(&self, ed_user_id: i64) -> bool;
}

/// Point-in-time copy of the moderation exclusion lists.
#[derive(Debug, Clone, Default)]
pub struct HiddenEntities {
    pub posts: HashSet<i64>,
    pub students: HashSet<i64>,
}

impl Visibility for HiddenEntities {
    fn is_post_hidden(&self, ed_post_id: i64) -> bool {
        self.posts.contains(&ed_post_id)
    }

    fn is_student_hidden(&self, ed_user_id: i64) -> bool {
        self.students.contains(&ed_user_id)
    }
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Stored rules, or `None` when no rules row exists.
    async fn load_participation_rules(&self) -> Result<Option<ParticipationRules>>;

    /// Completion time of the most recent completed run.
    async fn last_completed_run_at(&self) -> Result<Option<DateTime<Utc>>>;

    /// Record a new run in the `running` state and return its ID.
    async fn start_run(&self) -> Result<String>;

    /// Mark a run completed with its final counts and error list.
    async fn complete_run(&self, run_id: &str, stats: &SyncStats, errors: &[String]) -> Result<()>;

    async fn hidden_entities(&self) -> Result<HiddenEntities>;

    /// Insert or update a student by upstream user ID; returns the row ID.
    async fn upsert_student(&self, author: &AuthorInfo) -> Result<String>;

    /// Insert or update a post by upstream post ID, replacing its children.
    async fn upsert_post(&self, post: &Post, author_id: Option<&str>) -> Result<UpsertOutcome>;
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Store the participation rules blob in `site_config`.
    pub async fn save_participation_rules(&self, rules: &ParticipationRules) -> Result<()> {
        let value = serde_json::to_string(rules)?;
        sqlx::query(
            r#"
            INSERT INTO site_config (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(RULES_KEY)
        .bind(value)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Set the moderation flag on a stored post. Returns false if no such post.
    pub async fn set_post_hidden(&self, ed_post_id: i64, hidden: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE posts SET is_hidden = ? WHERE ed_post_id = ?")
            .bind(hidden)
            .bind(ed_post_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the moderation flag on a student, creating a placeholder row
    /// when the student has not been seen yet.
    pub async fn set_student_hidden(&self, ed_user_id: i64, hidden: bool) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO students (id, ed_user_id, display_name, email, is_hidden, created_at, updated_at)
            VALUES (?, ?, ?, NULL, ?, ?, ?)
            ON CONFLICT(ed_user_id) DO UPDATE SET
                is_hidden = excluded.is_hidden,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(ed_user_id)
        .bind(crate::normalize::DEFAULT_DISPLAY_NAME)
        .bind(hidden)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PostStore for SqliteStore {
    async fn load_participation_rules(&self) -> Result<Option<ParticipationRules>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM site_config WHERE key = ?")
            .bind(RULES_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match value {
            Some(json) => {
                let rules = serde_json::from_str(&json)
                    .with_context(|| format!("site_config.{} is not valid rules JSON", RULES_KEY))?;
                Ok(Some(rules))
            }
            None => Ok(None),
        }
    }

    async fn last_completed_run_at(&self) -> Result<Option<DateTime<Utc>>> {
        let ts: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT completed_at FROM ingestion_runs
            WHERE status = 'completed' AND completed_at IS NOT NULL
            ORDER BY completed_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(ts.and_then(|t| DateTime::from_timestamp(t, 0)))
    }

    async fn start_run(&self) -> Result<String> {
        let run_id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO ingestion_runs (id, status, started_at) VALUES (?, 'running', ?)")
            .bind(&run_id)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(run_id)
    }

    async fn complete_run(&self, run_id: &str, stats: &SyncStats, errors: &[String]) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingestion_runs
            SET completed_at = ?,
                status = 'completed',
                posts_processed = ?,
                posts_created = ?,
                posts_updated = ?,
                errors = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().timestamp())
        .bind(stats.processed as i64)
        .bind(stats.created as i64)
        .bind(stats.updated as i64)
        .bind(serde_json::to_string(errors)?)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn hidden_entities(&self) -> Result<HiddenEntities> {
        let posts: Vec<i64> = sqlx::query_scalar("SELECT ed_post_id FROM posts WHERE is_hidden = 1")
            .fetch_all(&self.pool)
            .await?;
        let students: Vec<i64> =
            sqlx::query_scalar("SELECT ed_user_id FROM students WHERE is_hidden = 1")
                .fetch_all(&self.pool)
                .await?;
        Ok(HiddenEntities {
            posts: posts.into_iter().collect(),
            students: students.into_iter().collect(),
        })
    }

    async fn upsert_student(&self, author: &AuthorInfo) -> Result<String> {
        let now = Utc::now().timestamp();
        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO students (id, ed_user_id, display_name, email, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(ed_user_id) DO UPDATE SET
                display_name = excluded.display_name,
                email = excluded.email,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(author.ed_user_id)
        .bind(&author.display_name)
        .bind(&author.email)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn upsert_post(&self, post: &Post, author_id: Option<&str>) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing_id: Option<String> =
            sqlx::query_scalar("SELECT id FROM posts WHERE ed_post_id = ?")
                .bind(post.ed_post_id)
                .fetch_optional(&mut *tx)
                .await?;

        let outcome = if existing_id.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        };
        let post_id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let tags: Vec<&String> = post.tags.iter().collect();

        sqlx::query(
            r#"
            INSERT INTO posts (id, ed_post_id, ed_thread_id, title, content, author_id,
                               posted_at, updated_at, url, category, tags, is_hidden, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ed_post_id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                updated_at = excluded.updated_at,
                url = excluded.url,
                category = excluded.category,
                tags = excluded.tags,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(&post_id)
        .bind(post.ed_post_id)
        .bind(post.ed_thread_id)
        .bind(&post.title)
        .bind(&post.content)
        .bind(author_id)
        .bind(post.posted_at.map(format_ts))
        .bind(post.updated_at.map(format_ts))
        .bind(&post.url)
        .bind(&post.category)
        .bind(serde_json::to_string(&tags)?)
        .bind(post.is_hidden)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        // Children are replaced, never merged
        sqlx::query("DELETE FROM attachments WHERE post_id = ?")
            .bind(&post_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM links WHERE post_id = ?")
            .bind(&post_id)
            .execute(&mut *tx)
            .await?;

        for att in &post.attachments {
            sqlx::query(
                r#"
                INSERT INTO attachments (id, post_id, filename, file_type, file_size, ed_attachment_id,
                                         download_url, preview_url, is_image, is_pdf)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&post_id)
            .bind(&att.filename)
            .bind(&att.file_type)
            .bind(att.file_size)
            .bind(&att.ed_attachment_id)
            .bind(&att.download_url)
            .bind(&att.preview_url)
            .bind(att.is_image)
            .bind(att.is_pdf)
            .execute(&mut *tx)
            .await?;
        }

        for link in &post.links {
            sqlx::query(
                "INSERT INTO links (id, post_id, url, title, link_type, domain) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&post_id)
            .bind(&link.url)
            .bind(&link.title)
            .bind(link.link_type.as_str())
            .bind(&link.domain)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Read a stored post's tag list; malformed JSON reads as no tags.
pub fn parse_tags(row: &sqlx::sqlite::SqliteRow) -> Vec<String> {
    let raw: String = row.get("tags");
    serde_json::from_str(&raw).unwrap_or_default()
}
