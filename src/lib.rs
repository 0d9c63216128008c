//! # EdThing
//!
//! Mirrors "participation" posts from an Ed Discussion course into a local
//! SQLite database.
//!
//! Each run fetches the newest page of threads, keeps the ones whose title
//! marks them as participation posts, renders their document XML to
//! Markdown, extracts tags, attachments and links, and upserts everything
//! keyed by the upstream post id. Hidden posts and students are never
//! overwritten or re-created.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │ Ed API       │──▶│ filter → normalize       │──▶│  SQLite  │
//! │ (edstem)     │   │ render / analyze / rules │   │ (store)  │
//! └──────────────┘   └──────────────────────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Environment configuration |
//! | [`models`] | Core data types |
//! | [`fields`] | Alias-probing over raw thread JSON |
//! | [`filter`] | Participation title filter |
//! | [`render`] | Document XML to Markdown |
//! | [`rules`] | Participation tag rules |
//! | [`analyze`] | Tag and link extraction, link title lookup |
//! | [`normalize`] | Raw thread to [`models::Post`] |
//! | [`edstem`] | Upstream thread source |
//! | [`store`] | Persistence and visibility |
//! | [`ingest`] | Run orchestration |
//! | [`cleanup`] | Purge of non-qualifying posts |
//! | [`export`] | JSON export |
//! | [`stats`] | Database overview |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod analyze;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod edstem;
pub mod export;
pub mod fields;
pub mod filter;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod render;
pub mod rules;
pub mod stats;
pub mod store;
