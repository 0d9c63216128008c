//! Ingestion run orchestration.
//!
//! One call to [`Ingestor::sync_posts`] is one run: a run record is opened,
//! a page of the newest threads is fetched, each thread is filtered,
//! normalized, checked against the hidden-entity snapshot and persisted,
//! and the run record is finalized with the counts and per-item errors.
//!
//! Processing is strictly sequential. A failure on one thread is recorded
//! and the loop moves on; only a failure to log in or fetch the page fails
//! the run, and even then the run record is finalized first.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::analyze::{HttpTitleResolver, TitleResolver};
use crate::config::Config;
use crate::db;
use crate::edstem::{EdClient, ThreadSource};
use crate::fields;
use crate::models::{SyncStats, UpsertOutcome};
use crate::normalize::PostNormalizer;
use crate::rules;
use crate::store::{HiddenEntities, PostStore, SqliteStore, Visibility};

/// Number of leading filter rejections logged per run.
const REJECTION_LOG_SAMPLE: u64 = 5;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The upstream page could not be fetched. The run record has been
    /// finalized with whatever was accumulated.
    #[error("Sync failed: {0:#}")]
    Fetch(anyhow::Error),
    /// The run record could not be opened.
    #[error("could not start ingestion run: {0:#}")]
    Storage(anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub course_id: u64,
    pub page_size: u32,
    /// Pause after each persisted post, as a courtesy to the upstream API.
    pub item_delay: Duration,
}

/// What happened to a single thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Created,
    Updated,
    HiddenPost,
    Rejected,
    HiddenAuthor,
}

pub struct Ingestor<'a> {
    source: &'a dyn ThreadSource,
    store: &'a dyn PostStore,
    normalizer: PostNormalizer,
    options: IngestOptions,
    last_sync: Option<DateTime<Utc>>,
}

impl<'a> Ingestor<'a> {
    /// Load rules and the last completed run time. Login happens per run.
    pub async fn initialize(
        source: &'a dyn ThreadSource,
        store: &'a dyn PostStore,
        titles: Box<dyn TitleResolver>,
        options: IngestOptions,
    ) -> Self {
        let rules = rules::load_rules(store).await;
        let last_sync = match store.last_completed_run_at().await {
            Ok(ts) => ts,
            Err(e) => {
                tracing::error!("Failed to get last ingestion time: {:#}", e);
                None
            }
        };
        tracing::info!(
            "Initialized with last sync: {}",
            last_sync.map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
        );

        Self {
            source,
            store,
            normalizer: PostNormalizer::new(rules, titles),
            options,
            last_sync,
        }
    }

    /// Run one ingestion pass.
    ///
    /// `since` only bounds what is logged; the upstream page is always the
    /// newest `page_size` threads. With `manual`, the last completed run is
    /// not used as a fallback bound.
    pub async fn sync_posts(
        &mut self,
        since: Option<DateTime<Utc>>,
        manual: bool,
    ) -> Result<SyncStats, SyncError> {
        let run_id = self.store.start_run().await.map_err(SyncError::Storage)?;
        let mut stats = SyncStats::default();
        let mut errors = Vec::new();

        let since_time = if manual { since } else { since.or(self.last_sync) };
        tracing::info!(
            "Syncing posts since {}",
            since_time.map_or_else(|| "30 days ago".to_string(), |t| t.to_rfc3339())
        );

        let result = self.fetch_and_process(&mut stats, &mut errors).await;
        if let Err(e) = &result {
            let msg = format!("Sync failed: {:#}", e);
            tracing::error!("{}", msg);
            errors.push(msg);
        }

        if let Err(e) = self.store.complete_run(&run_id, &stats, &errors).await {
            tracing::error!("Failed to complete ingestion run {}: {:#}", run_id, e);
        }

        result.map_err(SyncError::Fetch)?;
        self.last_sync = Some(Utc::now());
        Ok(stats)
    }

    async fn fetch_and_process(&self, stats: &mut SyncStats, errors: &mut Vec<String>) -> Result<()> {
        self.source.login().await?;

        let course_id = self.options.course_id;
        tracing::info!("Fetching threads for course {}", course_id);
        let threads = self
            .source
            .list_threads(course_id, self.options.page_size, 0)
            .await?;
        tracing::info!("Fetched {} threads for course {}", threads.len(), course_id);

        let hidden = match self.store.hidden_entities().await {
            Ok(hidden) => hidden,
            Err(e) => {
                tracing::error!("Failed to load hidden entities: {:#}", e);
                HiddenEntities::default()
            }
        };

        self.process_batch(&threads, &hidden, stats, errors).await;
        Ok(())
    }

    /// Process a batch of raw threads against a visibility snapshot.
    pub async fn process_batch(
        &self,
        threads: &[Value],
        hidden: &dyn Visibility,
        stats: &mut SyncStats,
        errors: &mut Vec<String>,
    ) {
        let mut candidates = 0u64;

        for thread in threads {
            stats.processed += 1;
            match self.process_thread(thread, hidden).await {
                Ok(ItemOutcome::Created) => {
                    stats.created += 1;
                    candidates += 1;
                }
                Ok(ItemOutcome::Updated) => {
                    stats.updated += 1;
                    candidates += 1;
                }
                Ok(ItemOutcome::HiddenAuthor) => candidates += 1,
                Ok(ItemOutcome::Rejected) => {
                    if stats.processed <= REJECTION_LOG_SAMPLE {
                        tracing::info!(
                            "Thread {} skipped by participation filter; title={:?}",
                            thread_label(thread),
                            fields::probe_str(thread, &fields::TITLE).unwrap_or_default()
                        );
                    }
                }
                Ok(ItemOutcome::HiddenPost) => {}
                Err(e) => {
                    let msg = format!("Failed to process thread {}: {:#}", thread_label(thread), e);
                    tracing::error!("{}", msg);
                    errors.push(msg);
                }
            }
        }

        tracing::info!(
            "Sync completed: processed={}, created={}, updated={}, participation_candidates={}, errors={}",
            stats.processed,
            stats.created,
            stats.updated,
            candidates,
            errors.len()
        );
    }

    /// Filter, normalize, and persist one thread.
    pub async fn process_thread(&self, thread: &Value, hidden: &dyn Visibility) -> Result<ItemOutcome> {
        if let Some(id) = fields::probe_i64(thread, &fields::ID) {
            if hidden.is_post_hidden(id) {
                return Ok(ItemOutcome::HiddenPost);
            }
        }

        let Some(post) = self.normalizer.normalize(thread).await? else {
            return Ok(ItemOutcome::Rejected);
        };

        if let Some(author) = &post.author {
            if hidden.is_student_hidden(author.ed_user_id) {
                return Ok(ItemOutcome::HiddenAuthor);
            }
        }

        let author_id = match &post.author {
            Some(author) => Some(self.store.upsert_student(author).await?),
            None => None,
        };

        let outcome = self.store.upsert_post(&post, author_id.as_deref()).await?;

        if !self.options.item_delay.is_zero() {
            tokio::time::sleep(self.options.item_delay).await;
        }

        Ok(match outcome {
            UpsertOutcome::Created => ItemOutcome::Created,
            UpsertOutcome::Updated => ItemOutcome::Updated,
        })
    }
}

fn thread_label(thread: &Value) -> String {
    thread
        .get("id")
        .and_then(fields::as_string)
        .unwrap_or_else(|| "unknown".to_string())
}

fn options_from(config: &Config) -> Result<IngestOptions> {
    Ok(IngestOptions {
        course_id: config.upstream()?.course_id,
        page_size: config.sync.page_size,
        item_delay: config.sync.item_delay(),
    })
}

/// `sync` command: one run against the configured course.
pub async fn run_sync(config: &Config, since: Option<DateTime<Utc>>, manual: bool) -> Result<()> {
    let options = options_from(config)?;
    let client = EdClient::new(config.upstream()?)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let titles = HttpTitleResolver::new(config.sync.link_title_timeout())?;

    let result = async {
        let mut ingestor = Ingestor::initialize(&client, &store, Box::new(titles), options).await;
        let stats = ingestor.sync_posts(since, manual).await?;
        anyhow::Ok(stats)
    }
    .await;

    store.pool().close().await;

    let stats = result?;
    println!("Sync completed: {}", serde_json::to_string(&stats)?);
    Ok(())
}

/// `continuous` command: sync, sleep for the interval, repeat until killed.
pub async fn run_continuous(config: &Config) -> Result<()> {
    let options = options_from(config)?;
    let client = EdClient::new(config.upstream()?)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let titles = HttpTitleResolver::new(config.sync.link_title_timeout())?;

    let mut ingestor = Ingestor::initialize(&client, &store, Box::new(titles), options).await;
    let interval = config.sync.interval();
    tracing::info!(
        "Starting continuous ingestion every {} minutes",
        config.sync.interval_minutes
    );

    loop {
        match ingestor.sync_posts(None, false).await {
            Ok(stats) => tracing::info!("Sync job finished: {}", serde_json::to_string(&stats)?),
            Err(e) => tracing::error!("Sync job failed: {}", e),
        }
        tokio::time::sleep(interval).await;
    }
}
