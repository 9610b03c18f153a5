use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Identifier of a logical feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeedKey {
    Discover,
    Followed,
    Tag(String),
    Site(i64),
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discover => write!(f, "discover"),
            Self::Followed => write!(f, "followed"),
            Self::Tag(slug) => write!(f, "tag:{}", slug),
            Self::Site(site_id) => write!(f, "site:{}", site_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid feed key: {0}")]
pub struct InvalidFeedKey(pub String);

impl FromStr for FeedKey {
    type Err = InvalidFeedKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "discover" => return Ok(Self::Discover),
            "followed" => return Ok(Self::Followed),
            _ => {}
        }

        match s.split_once(':') {
            Some(("tag", slug)) if !slug.is_empty() => Ok(Self::Tag(slug.to_lowercase())),
            Some(("site", id)) => id
                .parse::<i64>()
                .map(Self::Site)
                .map_err(|_| InvalidFeedKey(s.to_string())),
            _ => Err(InvalidFeedKey(s.to_string())),
        }
    }
}

impl Serialize for FeedKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FeedKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Stable identity of a post across feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId {
    pub site_id: i64,
    pub post_id: i64,
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.site_id, self.post_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostPayload {
    pub title: String,
    pub excerpt: String,
    pub url: String,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub like_count: i64,
    pub is_liked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: ItemId,
    pub position: i64,
    pub payload: PostPayload,
}

impl FeedItem {
    /// Copy of this item with new like counters.
    pub fn with_like(&self, is_liked: bool, like_count: i64) -> Self {
        let mut item = self.clone();
        item.payload.is_liked = is_liked;
        item.payload.like_count = like_count.max(0);
        item
    }
}

/// Where the currently published items came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateOrigin {
    Empty,
    Cache,
    Remote,
}

/// Immutable snapshot of one feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedState {
    pub key: FeedKey,
    items: Vec<FeedItem>,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub origin: StateOrigin,
}

impl FeedState {
    pub fn empty(key: FeedKey) -> Self {
        Self {
            key,
            items: Vec::new(),
            refreshed_at: None,
            origin: StateOrigin::Empty,
        }
    }

    /// Builds a state keeping the given order; later duplicates of an id are dropped.
    pub fn new(
        key: FeedKey,
        items: Vec<FeedItem>,
        refreshed_at: Option<DateTime<Utc>>,
        origin: StateOrigin,
    ) -> Self {
        let mut seen = HashSet::with_capacity(items.len());
        let items = items
            .into_iter()
            .filter(|item| seen.insert(item.id))
            .collect();

        Self {
            key,
            items,
            refreshed_at,
            origin,
        }
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn find(&self, id: ItemId) -> Option<&FeedItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn with_origin(mut self, origin: StateOrigin) -> Self {
        self.origin = origin;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum RefreshOutcome {
    NewItems(usize),
    ChangedItems(usize),
    Unchanged,
    Failed(String),
}

impl RefreshOutcome {
    /// Whether the cache holds something the published state does not.
    pub fn requires_reload(&self) -> bool {
        matches!(self, Self::NewItems(_) | Self::ChangedItems(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Routine refresh, asks only for posts newer than what is cached.
    Background,
    /// Pull-to-refresh, replaces the cached page.
    ForcedUserRefresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationState {
    Inactive,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum LikeOutcome {
    Success,
    Unchanged,
    Failure(String),
}

/// Bookkeeping kept next to cached items and consulted by refresh policies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedMetadata {
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub is_stale: bool,
}
