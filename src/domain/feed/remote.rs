use super::model::{FeedItem, FeedKey, ItemId, PostPayload};
use crate::error::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use html2text::from_read;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const EXCERPT_MAX_CHARS: usize = 280;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s\]\)]+").expect("valid url regex"));
static WHITESPACE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static MARKDOWN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[*_#>\[\]]+").expect("valid markdown regex"));

/// Page request sent to the posts endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct PostsQuery {
    pub number: u32,
    /// Only posts published after this instant.
    pub after: Option<DateTime<Utc>>,
}

/// A post as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePost {
    pub site_id: i64,
    pub post_id: i64,
    pub title: String,
    pub excerpt_html: String,
    pub url: String,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub like_count: i64,
    pub i_like: bool,
}

impl RemotePost {
    pub fn into_item(self, position: i64) -> FeedItem {
        FeedItem {
            id: ItemId {
                site_id: self.site_id,
                post_id: self.post_id,
            },
            position,
            payload: PostPayload {
                title: clean_text(&self.title),
                excerpt: excerpt(&self.excerpt_html),
                url: self.url,
                author: self.author,
                published_at: self.published_at,
                like_count: self.like_count.max(0),
                is_liked: self.i_like,
            },
        }
    }
}

/// Like state of a post as confirmed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeStatus {
    pub i_like: bool,
    pub like_count: i64,
}

/// Remote blogging API used by fetchers and the like use case.
#[async_trait]
pub trait PostsApi: Send + Sync {
    async fn fetch_posts(&self, key: &FeedKey, query: &PostsQuery) -> AppResult<Vec<RemotePost>>;

    async fn set_like(&self, id: ItemId, like: bool) -> AppResult<LikeStatus>;
}

/// Strips HTML, links and markdown leftovers, and collapses whitespace.
pub fn clean_text(html: &str) -> String {
    let plain = from_read(html.as_bytes(), usize::MAX);
    let without_urls = URL_PATTERN.replace_all(&plain, "");
    let without_markup = MARKDOWN_PATTERN.replace_all(&without_urls, "");
    WHITESPACE_PATTERN
        .replace_all(&without_markup, " ")
        .trim()
        .to_string()
}

fn excerpt(html: &str) -> String {
    let text = clean_text(html);
    if text.chars().count() <= EXCERPT_MAX_CHARS {
        return text;
    }
    let truncated: String = text.chars().take(EXCERPT_MAX_CHARS).collect();
    format!("{}…", truncated.trim_end())
}
