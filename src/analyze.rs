//! Content analysis over rendered markdown: rubric tags and links.
//!
//! Link titles are resolved over HTTP only for links worth labelling
//! (GitHub repositories and personal sites), which bounds outbound
//! traffic to a handful of requests per post. Resolution failures leave
//! the title empty and never fail the post.

use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;
use std::time::Duration;

use crate::models::{Link, LinkType};

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"\[\]()]+|www\.[^\s<>"\[\]()]+"#).expect("url pattern is valid")
});

static TITLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title pattern is valid"));

const PERSONAL_HOSTS: &[&str] = &[".github.io", "vercel.app", "netlify.app"];
const DOCUMENTATION_MARKERS: &[&str] = &["docs", "documentation", "readme", "wiki"];

/// Characters that end a sentence or close markdown emphasis around a URL.
const TRAILING_NOISE: &[char] = &['.', ',', ';', ':', '!', '?', '\'', '*', '_', '`'];

pub const USER_AGENT: &str = "EdThing-Bot/1.0";

/// Tags whose keywords occur (case-insensitively) in the title or content.
pub fn extract_tags(
    title: &str,
    content: &str,
    tag_mappings: &BTreeMap<String, Vec<String>>,
) -> BTreeSet<String> {
    let text = format!("{} {}", title, content).to_lowercase();
    tag_mappings
        .iter()
        .filter(|(_, keywords)| {
            keywords
                .iter()
                .any(|k| !k.is_empty() && text.contains(&k.to_lowercase()))
        })
        .map(|(tag, _)| tag.clone())
        .collect()
}

/// Find and classify every URL in `content`. Titles are left unresolved.
pub fn extract_links(content: &str) -> Vec<Link> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for m in URL_PATTERN.find_iter(content) {
        let raw = m.as_str().trim_end_matches(TRAILING_NOISE);
        if raw.is_empty() {
            continue;
        }
        let url = if raw.starts_with("http") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };

        let parsed = match reqwest::Url::parse(&url) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Failed to process URL {}: {}", url, e);
                continue;
            }
        };
        let host = parsed.host_str().unwrap_or_default().to_lowercase();
        let domain = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host,
        };

        if !seen.insert(url.clone()) {
            continue;
        }
        let link_type = classify_link(&url, &domain);
        links.push(Link {
            url,
            title: None,
            link_type,
            domain,
        });
    }

    links
}

/// Classify a link by domain and path, first matching rule wins.
pub fn classify_link(url: &str, domain: &str) -> LinkType {
    if domain.contains("github.com") {
        return LinkType::Github;
    }
    if PERSONAL_HOSTS.iter().any(|h| domain.contains(h)) {
        return LinkType::Personal;
    }
    let url = url.to_lowercase();
    if DOCUMENTATION_MARKERS.iter().any(|m| url.contains(m)) {
        return LinkType::Documentation;
    }
    LinkType::Other
}

/// Whether a link's page title is worth fetching.
pub fn should_resolve_title(link: &Link) -> bool {
    match link.link_type {
        LinkType::Github => !link.url.contains("/blob/") && !link.url.contains("/tree/"),
        LinkType::Personal => true,
        LinkType::Documentation | LinkType::Other => false,
    }
}

/// Fill in titles for the links that warrant one.
pub async fn resolve_titles(links: &mut [Link], resolver: &dyn TitleResolver) {
    for link in links.iter_mut() {
        if should_resolve_title(link) {
            link.title = resolver.resolve(&link.url).await;
        }
    }
}

/// Looks up a human-readable title for a URL.
#[async_trait]
pub trait TitleResolver: Send + Sync {
    /// Returns `None` on any failure.
    async fn resolve(&self, url: &str) -> Option<String>;
}

/// Resolver that never fetches anything.
pub struct NoTitleResolver;

#[async_trait]
impl TitleResolver for NoTitleResolver {
    async fn resolve(&self, _url: &str) -> Option<String> {
        None
    }
}

/// Fetches the page and reads its `<title>`, with a bounded timeout.
pub struct HttpTitleResolver {
    client: reqwest::Client,
}

impl HttpTitleResolver {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TitleResolver for HttpTitleResolver {
    async fn resolve(&self, url: &str) -> Option<String> {
        let response = match self.client.get(url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!("Title fetch for {} returned {}", url, r.status());
                return None;
            }
            Err(e) => {
                tracing::debug!("Failed to extract title from {}: {}", url, e);
                return None;
            }
        };
        match response.text().await {
            Ok(body) => extract_title(&body),
            Err(e) => {
                tracing::debug!("Failed to read body of {}: {}", url, e);
                None
            }
        }
    }
}

/// Text of the first `<title>` element, whitespace-collapsed.
pub fn extract_title(html: &str) -> Option<String> {
    let raw = TITLE_PATTERN.captures(html)?.get(1)?.as_str();
    let decoded = quick_xml::escape::unescape(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    let title = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mappings(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(tag, kws)| (tag.to_string(), kws.iter().map(|k| k.to_string()).collect()))
            .collect()
    }

    #[test]
    fn tag_extraction_is_case_insensitive_and_deduplicated() {
        let m = mappings(&[("Muon", &["Muon", "MUON"])]);
        let tags = extract_tags("Muon update", "", &m);
        assert_eq!(tags, BTreeSet::from(["Muon".to_string()]));
    }

    #[test]
    fn tag_extraction_searches_content_too() {
        let m = mappings(&[("Shampoo", &["shampoo"]), ("Muon", &["muon"])]);
        let tags = extract_tags("Participation D", "We tried SHAMPOO here", &m);
        assert_eq!(tags, BTreeSet::from(["Shampoo".to_string()]));
    }

    #[test]
    fn no_mappings_no_tags() {
        assert!(extract_tags("Muon", "Muon", &BTreeMap::new()).is_empty());
    }

    #[test]
    fn links_are_classified() {
        assert_eq!(
            classify_link("https://github.com/a/b", "github.com"),
            LinkType::Github
        );
        assert_eq!(
            classify_link("https://me.github.io/post", "me.github.io"),
            LinkType::Personal
        );
        assert_eq!(
            classify_link("https://app.vercel.app", "app.vercel.app"),
            LinkType::Personal
        );
        assert_eq!(
            classify_link("https://pytorch.org/docs/stable", "pytorch.org"),
            LinkType::Documentation
        );
        assert_eq!(
            classify_link("https://en.wikipedia.org/wiki/Adam", "en.wikipedia.org"),
            LinkType::Documentation
        );
        assert_eq!(
            classify_link("https://arxiv.org/abs/1", "arxiv.org"),
            LinkType::Other
        );
    }

    #[test]
    fn bare_www_is_normalized() {
        let links = extract_links("see www.example.com/page for details");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://www.example.com/page");
        assert_eq!(links[0].domain, "www.example.com");
    }

    #[test]
    fn markdown_links_yield_the_target_once() {
        let links = extract_links(
            "[https://github.com/kellerjordan/Muon](https://github.com/kellerjordan/Muon) and **https://x.netlify.app**.",
        );
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://github.com/kellerjordan/Muon", "https://x.netlify.app"]
        );
        assert_eq!(links[0].link_type, LinkType::Github);
        assert_eq!(links[1].link_type, LinkType::Personal);
        assert!(links.iter().all(|l| l.title.is_none()));
    }

    #[test]
    fn domain_keeps_explicit_port() {
        let links = extract_links("http://localhost:8080/docs");
        assert_eq!(links[0].domain, "localhost:8080");
        assert_eq!(links[0].link_type, LinkType::Documentation);
    }

    #[test]
    fn title_policy() {
        let link = |url: &str, link_type| Link {
            url: url.to_string(),
            title: None,
            link_type,
            domain: String::new(),
        };
        assert!(should_resolve_title(&link("https://github.com/a/b", LinkType::Github)));
        assert!(!should_resolve_title(&link(
            "https://github.com/a/b/blob/main/x.py",
            LinkType::Github
        )));
        assert!(!should_resolve_title(&link(
            "https://github.com/a/b/tree/main",
            LinkType::Github
        )));
        assert!(should_resolve_title(&link("https://me.github.io", LinkType::Personal)));
        assert!(!should_resolve_title(&link("https://docs.rs", LinkType::Documentation)));
    }

    struct FixedResolver;

    #[async_trait]
    impl TitleResolver for FixedResolver {
        async fn resolve(&self, url: &str) -> Option<String> {
            Some(format!("title of {}", url))
        }
    }

    #[tokio::test]
    async fn resolve_titles_only_touches_eligible_links() {
        let mut links = extract_links(
            "https://github.com/a/b https://github.com/a/b/blob/main/x https://arxiv.org/abs/1",
        );
        resolve_titles(&mut links, &FixedResolver).await;
        assert_eq!(
            links[0].title.as_deref(),
            Some("title of https://github.com/a/b")
        );
        assert!(links[1].title.is_none());
        assert!(links[2].title.is_none());
    }

    #[test]
    fn title_is_extracted_and_decoded() {
        let html = "<html><head><TITLE>\n  GitHub - a/b: Muon &amp; friends\n</TITLE></head></html>";
        assert_eq!(
            extract_title(html).as_deref(),
            Some("GitHub - a/b: Muon & friends")
        );
        assert_eq!(extract_title("<html></html>"), None);
        assert_eq!(extract_title("<title>  </title>"), None);
    }
}
