//! Core data models used throughout the ingestion pipeline.
//!
//! A raw upstream thread is normalized into a [`Post`] that owns its
//! [`Attachment`]s and [`Link`]s. Each orchestrator invocation is
//! recorded as an [`IngestionRun`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// Canonical post record, keyed by the upstream post ID.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub ed_post_id: i64,
    pub ed_thread_id: Option<i64>,
    pub title: String,
    /// Markdown rendered from the upstream document XML.
    pub content: String,
    pub author: Option<AuthorInfo>,
    pub posted_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub url: String,
    pub category: String,
    pub tags: BTreeSet<String>,
    pub is_hidden: bool,
    pub attachments: Vec<Attachment>,
    pub links: Vec<Link>,
}

/// Author sub-record derived from the thread's user object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorInfo {
    pub ed_user_id: i64,
    pub display_name: String,
    pub email: Option<String>,
}

/// File attached to a post. `is_image` and `is_pdf` are fixed at
/// normalization time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub filename: String,
    pub file_type: String,
    pub file_size: Option<i64>,
    pub ed_attachment_id: Option<String>,
    pub download_url: Option<String>,
    pub preview_url: Option<String>,
    pub is_image: bool,
    pub is_pdf: bool,
}

/// A URL found in post content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub url: String,
    pub title: Option<String>,
    pub link_type: LinkType,
    pub domain: String,
}

/// Link classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Github,
    Personal,
    Documentation,
    Other,
}

impl LinkType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Personal => "personal",
            Self::Documentation => "documentation",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "github" => Some(Self::Github),
            "personal" => Some(Self::Personal),
            "documentation" => Some(Self::Documentation),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Lifecycle state of an ingestion run.
///
/// A run that finished with item-level errors is still `Completed`; only
/// the length of its error list tells it apart from a clean run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// One orchestrator invocation as recorded in `ingestion_runs`.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionRun {
    pub id: String,
    pub status: RunStatus,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub posts_processed: i64,
    pub posts_created: i64,
    pub posts_updated: i64,
    pub errors: Vec<String>,
}

/// Aggregate counters for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
}

/// Result of persisting a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}
