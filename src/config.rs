//! Environment-sourced configuration.
//!
//! Storage settings are always available (with a default database URL).
//! Upstream credentials are only required by commands that talk to the
//! platform, which call [`Config::upstream`] before doing any work.

use anyhow::{bail, Context, Result};
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/edthing.sqlite";
pub const DEFAULT_API_BASE_URL: &str = "https://us.edstem.org/api/";

#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub upstream: Option<UpstreamConfig>,
    pub sync: SyncConfig,
    missing: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub api_token: String,
    pub course_id: u64,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub interval_minutes: u64,
    pub page_size: u32,
    pub item_delay_ms: u64,
    pub link_title_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
            page_size: 100,
            item_delay_ms: 100,
            link_title_timeout_secs: 5,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn link_title_timeout(&self) -> Duration {
        Duration::from_secs(self.link_title_timeout_secs)
    }
}

impl Config {
    /// Upstream settings, or an error naming every missing variable.
    pub fn upstream(&self) -> Result<&UpstreamConfig> {
        match &self.upstream {
            Some(upstream) => Ok(upstream),
            None => bail!(
                "Missing required environment variables: {}",
                self.missing.join(", ")
            ),
        }
    }
}

/// Load configuration from the process environment.
pub fn load_config() -> Result<Config> {
    load_config_from(|key| std::env::var(key).ok())
}

/// Load configuration through an arbitrary variable lookup.
pub fn load_config_from<F>(lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let db = DbConfig {
        url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
    };

    let defaults = SyncConfig::default();
    let sync = SyncConfig {
        interval_minutes: parse_var(&var, "SYNC_INTERVAL_MINUTES", defaults.interval_minutes)?,
        page_size: parse_var(&var, "SYNC_PAGE_SIZE", defaults.page_size)?,
        item_delay_ms: parse_var(&var, "SYNC_ITEM_DELAY_MS", defaults.item_delay_ms)?,
        link_title_timeout_secs: parse_var(
            &var,
            "LINK_TITLE_TIMEOUT_SECS",
            defaults.link_title_timeout_secs,
        )?,
    };

    if sync.interval_minutes == 0 {
        bail!("SYNC_INTERVAL_MINUTES must be > 0");
    }
    if !(1..=100).contains(&sync.page_size) {
        bail!("SYNC_PAGE_SIZE must be in [1, 100]");
    }
    if sync.link_title_timeout_secs == 0 {
        bail!("LINK_TITLE_TIMEOUT_SECS must be > 0");
    }

    let api_token = var("ED_API_TOKEN");
    let course_id = var("ED_COURSE_ID");

    let mut missing = Vec::new();
    if api_token.is_none() {
        missing.push("ED_API_TOKEN");
    }
    if course_id.is_none() {
        missing.push("ED_COURSE_ID");
    }

    let upstream = match (api_token, course_id) {
        (Some(api_token), Some(course_id)) => Some(UpstreamConfig {
            api_token,
            course_id: course_id
                .parse()
                .with_context(|| format!("ED_COURSE_ID must be numeric, got '{}'", course_id))?,
            base_url: var("ED_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
        }),
        _ => None,
    };

    Ok(Config {
        db,
        upstream,
        sync,
        missing,
    })
}

fn parse_var<T, V>(var: &V, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{} must be a number, got '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        load_config_from(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_upstream() {
        let config = load(&[]).unwrap();
        assert_eq!(config.db.url, DEFAULT_DATABASE_URL);
        assert_eq!(config.sync.interval_minutes, 60);
        assert_eq!(config.sync.page_size, 100);
        let err = config.upstream().unwrap_err().to_string();
        assert!(err.contains("ED_API_TOKEN"));
        assert!(err.contains("ED_COURSE_ID"));
    }

    #[test]
    fn only_missing_variables_are_named() {
        let config = load(&[("ED_API_TOKEN", "secret")]).unwrap();
        let err = config.upstream().unwrap_err().to_string();
        assert!(!err.contains("ED_API_TOKEN"));
        assert!(err.contains("ED_COURSE_ID"));
    }

    #[test]
    fn full_upstream_config() {
        let config = load(&[
            ("ED_API_TOKEN", "secret"),
            ("ED_COURSE_ID", "84647"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("SYNC_INTERVAL_MINUTES", "15"),
        ])
        .unwrap();
        let upstream = config.upstream().unwrap();
        assert_eq!(upstream.course_id, 84647);
        assert_eq!(upstream.base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.db.url, "sqlite::memory:");
        assert_eq!(config.sync.interval(), Duration::from_secs(900));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        assert!(load(&[("SYNC_INTERVAL_MINUTES", "soon")]).is_err());
        assert!(load(&[("SYNC_INTERVAL_MINUTES", "0")]).is_err());
        assert!(load(&[("SYNC_PAGE_SIZE", "500")]).is_err());
        assert!(load(&[("ED_API_TOKEN", "t"), ("ED_COURSE_ID", "cs182")]).is_err());
    }

    #[test]
    fn huge_interval_saturates() {
        let minutes = u64::MAX.to_string();
        let config = load(&[("SYNC_INTERVAL_MINUTES", minutes.as_str())]).unwrap();
        assert_eq!(config.sync.interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let config = load(&[("ED_API_TOKEN", "  "), ("ED_COURSE_ID", "1")]).unwrap();
        assert!(config.upstream().is_err());
    }
}
