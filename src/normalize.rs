//! Raw thread → canonical [`Post`] normalization.
//!
//! Composes the participation filter, the document renderer, and the
//! content analyzers. Threads that fail the filter are rejected before
//! any other work is done.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::analyze::{self, TitleResolver};
use crate::fields;
use crate::filter;
use crate::models::{Attachment, AuthorInfo, Post};
use crate::render;
use crate::rules::ParticipationRules;

pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";
const DISCUSSION_URL_BASE: &str = "https://edstem.org/us/courses";
const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".bmp"];

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("thread has no post id")]
    MissingId,
    #[error("thread id {0} is not an integer")]
    InvalidId(String),
}

/// Turns raw threads into posts using a fixed rule set.
pub struct PostNormalizer {
    rules: ParticipationRules,
    titles: Box<dyn TitleResolver>,
}

impl PostNormalizer {
    pub fn new(rules: ParticipationRules, titles: Box<dyn TitleResolver>) -> Self {
        Self { rules, titles }
    }

    /// Normalize one thread. `Ok(None)` means the thread was rejected by
    /// the participation filter.
    pub async fn normalize(&self, raw: &Value) -> Result<Option<Post>, NormalizeError> {
        if !filter::is_qualifying(raw) {
            return Ok(None);
        }

        let ed_post_id = post_id(raw)?;
        let title = fields::probe_str(raw, &fields::TITLE)
            .unwrap_or_default()
            .to_string();
        let content = render::render(fields::probe_str(raw, &fields::CONTENT).unwrap_or_default());

        let tags = analyze::extract_tags(&title, &content, &self.rules.tag_mappings);
        let mut links = analyze::extract_links(&content);
        analyze::resolve_titles(&mut links, self.titles.as_ref()).await;

        let url = fields::probe_str(raw, &fields::URL)
            .map(str::to_string)
            .unwrap_or_else(|| discussion_url(raw, ed_post_id));

        Ok(Some(Post {
            ed_post_id,
            ed_thread_id: fields::probe_i64(raw, &fields::THREAD_ID),
            title,
            content,
            author: author_info(raw),
            posted_at: fields::probe(raw, &fields::POSTED_AT).and_then(parse_timestamp),
            updated_at: fields::probe(raw, &fields::UPDATED_AT).and_then(parse_timestamp),
            url,
            category: category(raw),
            tags,
            is_hidden: false,
            attachments: attachments(raw),
            links,
        }))
    }
}

/// The upstream post ID, if the thread carries a usable one.
pub fn post_id(raw: &Value) -> Result<i64, NormalizeError> {
    let value = fields::probe(raw, &fields::ID).ok_or(NormalizeError::MissingId)?;
    fields::as_i64(value).ok_or_else(|| NormalizeError::InvalidId(value.to_string()))
}

fn discussion_url(raw: &Value, ed_post_id: i64) -> String {
    let course = fields::probe(raw, &fields::COURSE_ID)
        .and_then(fields::as_string)
        .unwrap_or_default();
    format!("{}/{}/discussion/{}", DISCUSSION_URL_BASE, course, ed_post_id)
}

/// Category from a plain string or from a nested object's `name`.
fn category(raw: &Value) -> String {
    match fields::probe(raw, &fields::CATEGORY) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(o)) => o
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn author_info(raw: &Value) -> Option<AuthorInfo> {
    let author = fields::probe(raw, &fields::AUTHOR)?;
    let ed_user_id = author.get("id").and_then(fields::as_i64)?;
    let display_name = author
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_DISPLAY_NAME)
        .to_string();
    let email = author
        .get("email")
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
        .map(str::to_string);
    Some(AuthorInfo {
        ed_user_id,
        display_name,
        email,
    })
}

fn attachments(raw: &Value) -> Vec<Attachment> {
    fields::probe(raw, &fields::ATTACHMENTS)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter(|v| v.is_object()).map(attachment).collect())
        .unwrap_or_default()
}

/// Build attachment metadata, deriving the image/PDF flags.
pub fn attachment(raw: &Value) -> Attachment {
    let filename = fields::probe_str(raw, &fields::FILENAME)
        .unwrap_or_default()
        .to_string();
    let file_type = fields::probe_str(raw, &fields::FILE_TYPE)
        .unwrap_or_default()
        .to_string();
    let lower_name = filename.to_lowercase();

    let is_image = file_type.starts_with("image/")
        || IMAGE_EXTENSIONS.iter().any(|ext| lower_name.ends_with(ext));
    let is_pdf = file_type == "application/pdf" || lower_name.ends_with(".pdf");

    let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);

    Attachment {
        file_size: fields::probe_i64(raw, &fields::FILE_SIZE),
        ed_attachment_id: raw.get("id").and_then(fields::as_string),
        download_url: text("download_url"),
        preview_url: text("preview_url"),
        filename,
        file_type,
        is_image,
        is_pdf,
    }
}

/// Parse an ISO-8601 timestamp. A trailing `Z` is read as `+00:00`;
/// timestamps without an offset are taken as UTC. Anything else is absent.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?.trim();
    if s.is_empty() {
        return None;
    }
    let normalized = match s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        Some(head) => format!("{}+00:00", head),
        None => s.to_string(),
    };

    let parsed = DateTime::parse_from_rfc3339(&normalized)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        });

    if parsed.is_none() {
        tracing::warn!("Failed to parse datetime {}", s);
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::NoTitleResolver;
    use chrono::TimeZone;
    use serde_json::json;

    fn normalizer() -> PostNormalizer {
        PostNormalizer::new(ParticipationRules::default(), Box::new(NoTitleResolver))
    }

    #[tokio::test]
    async fn non_qualifying_thread_is_rejected() {
        let raw = json!({"id": 1, "title": "HW3 question"});
        assert!(normalizer().normalize(&raw).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejection_happens_before_id_checks() {
        let raw = json!({"title": "HW3 question"});
        assert!(normalizer().normalize(&raw).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn qualifying_thread_without_id_is_an_error() {
        let raw = json!({"title": "Participation D"});
        assert!(matches!(
            normalizer().normalize(&raw).await,
            Err(NormalizeError::MissingId)
        ));
        let raw = json!({"id": "abc", "title": "Participation D"});
        assert!(matches!(
            normalizer().normalize(&raw).await,
            Err(NormalizeError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn full_thread_normalizes() {
        let raw = json!({
            "id": 4242,
            "thread_id": 17,
            "course_id": 84647,
            "subject": "Special Participation D: Muon on CIFAR",
            "body": "<document><paragraph>Code at <link href=\"https://github.com/a/muon\">repo</link></paragraph></document>",
            "createdAt": "2025-03-01T12:00:00Z",
            "category": {"name": "Participation"},
            "user": {"id": 9, "name": "Ada", "email": "ada@example.edu"},
            "files": [
                {"id": 5, "filename": "notes.PDF", "file_type": "text/plain", "size": 100},
                {"filename": "plot.png", "file_type": "image/png"}
            ]
        });

        let post = normalizer().normalize(&raw).await.unwrap().unwrap();
        assert_eq!(post.ed_post_id, 4242);
        assert_eq!(post.ed_thread_id, Some(17));
        assert_eq!(post.title, "Special Participation D: Muon on CIFAR");
        assert_eq!(post.content, "Code at [repo](https://github.com/a/muon)");
        assert_eq!(post.url, "https://edstem.org/us/courses/84647/discussion/4242");
        assert_eq!(post.category, "Participation");
        assert!(post.tags.contains("Muon"));
        assert_eq!(
            post.posted_at,
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(post.updated_at, None);
        assert!(!post.is_hidden);

        let author = post.author.unwrap();
        assert_eq!(author.ed_user_id, 9);
        assert_eq!(author.display_name, "Ada");
        assert_eq!(author.email.as_deref(), Some("ada@example.edu"));

        assert_eq!(post.attachments.len(), 2);
        assert!(post.attachments[0].is_pdf);
        assert!(!post.attachments[0].is_image);
        assert_eq!(post.attachments[0].ed_attachment_id.as_deref(), Some("5"));
        assert_eq!(post.attachments[0].file_size, Some(100));
        assert!(post.attachments[1].is_image);

        assert_eq!(post.links.len(), 1);
        assert_eq!(post.links[0].url, "https://github.com/a/muon");
    }

    #[tokio::test]
    async fn explicit_url_and_string_category_win() {
        let raw = json!({
            "id": 1,
            "title": "participation d",
            "url": "https://example.com/t/1",
            "category": "General",
            "user": {"id": 3}
        });
        let post = normalizer().normalize(&raw).await.unwrap().unwrap();
        assert_eq!(post.url, "https://example.com/t/1");
        assert_eq!(post.category, "General");
        assert_eq!(post.author.unwrap().display_name, DEFAULT_DISPLAY_NAME);
        assert!(post.attachments.is_empty());
        assert_eq!(post.content, "");
    }

    #[test]
    fn pdf_flag_uses_or_semantics() {
        let by_name = attachment(&json!({"filename": "notes.PDF", "file_type": "application/octet-stream"}));
        assert!(by_name.is_pdf);
        let by_type = attachment(&json!({"filename": "download", "file_type": "application/pdf"}));
        assert!(by_type.is_pdf);
        let neither = attachment(&json!({"filename": "notes.txt", "file_type": "text/plain"}));
        assert!(!neither.is_pdf);
    }

    #[test]
    fn timestamps() {
        let utc = Utc.with_ymd_and_hms(2024, 9, 2, 11, 39, 30).unwrap();
        assert_eq!(parse_timestamp(&json!("2024-09-02T11:39:30Z")), Some(utc));
        assert_eq!(
            parse_timestamp(&json!("2024-09-02T21:39:30+10:00")),
            Some(utc)
        );
        assert_eq!(parse_timestamp(&json!("2024-09-02T11:39:30")), Some(utc));
        assert_eq!(parse_timestamp(&json!("not a date")), None);
        assert_eq!(parse_timestamp(&json!("")), None);
        assert_eq!(parse_timestamp(&json!(1725277170)), None);
    }
}
