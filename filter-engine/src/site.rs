//! Per-site adapters: which elements are posts, where their text lives, and
//! how stable ids and author handles are derived.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use url::Url;
use webtone_core::CandidatePost;

static STATUS_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/status/(\d+)").expect("status id pattern"));
static AUTHOR_HANDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([A-Za-z0-9_]+)").expect("author handle pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteFamily {
    X,
    YouTube,
    Reddit,
    Other,
}

impl SiteFamily {
    pub fn from_url(page_url: &str) -> Self {
        Url::parse(page_url)
            .ok()
            .and_then(|url| url.host_str().map(Self::from_host))
            .unwrap_or(SiteFamily::Other)
    }

    pub fn from_host(host: &str) -> Self {
        let host = host.to_ascii_lowercase();
        let on = |domain: &str| host == domain || host.ends_with(&format!(".{}", domain));

        if on("x.com") || on("twitter.com") {
            SiteFamily::X
        } else if on("youtube.com") {
            SiteFamily::YouTube
        } else if on("reddit.com") {
            SiteFamily::Reddit
        } else {
            SiteFamily::Other
        }
    }

    /// Selector matching post containers. Unknown sites use the X markup.
    pub fn post_selector(&self) -> &'static str {
        match self {
            SiteFamily::YouTube => "ytd-comment-thread-renderer",
            SiteFamily::Reddit => {
                r#"div[data-testid="post-container"], div[data-testid="comment"]"#
            }
            SiteFamily::X | SiteFamily::Other => r#"article[data-testid="tweet"]"#,
        }
    }

    pub fn text_selector(&self) -> &'static str {
        match self {
            SiteFamily::YouTube => "#content-text",
            SiteFamily::Reddit => "h1, h2, p, span",
            SiteFamily::X | SiteFamily::Other => r#"[data-testid="tweetText"]"#,
        }
    }

    /// Only X exposes ids and handles stable enough to cache and allowlist on.
    pub fn has_stable_ids(&self) -> bool {
        matches!(self, SiteFamily::X)
    }
}

/// The page a batch of candidate posts was observed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    pub site: SiteFamily,
    pub page_url: String,
}

impl PageContext {
    pub fn new(page_url: impl Into<String>) -> Self {
        let page_url = page_url.into();
        Self {
            site: SiteFamily::from_url(&page_url),
            page_url,
        }
    }

    /// Cache key for the post, if the site has one.
    pub fn status_id(&self, post: &CandidatePost) -> Option<String> {
        if !self.site.has_stable_ids() {
            return None;
        }
        let href = post.status_href.as_deref()?;
        STATUS_ID
            .captures(href)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    pub fn author_handle(&self, post: &CandidatePost) -> Option<String> {
        if !self.site.has_stable_ids() {
            return None;
        }
        let href = post.author_href.as_deref()?;
        AUTHOR_HANDLE
            .captures(href)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_lowercase())
    }

    pub fn permalink(&self, post: &CandidatePost) -> String {
        post.status_href
            .as_deref()
            .filter(|href| !href.is_empty())
            .map_or_else(|| self.page_url.clone(), str::to_string)
    }
}

/// Trimmed post text, or `None` when nothing readable was extracted.
pub fn extract_text(post: &CandidatePost) -> Option<&str> {
    post.text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
}
