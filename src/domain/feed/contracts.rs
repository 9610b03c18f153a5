use super::model::{
    FeedItem, FeedKey, FeedMetadata, FeedState, ItemId, LikeOutcome, RefreshMode, RefreshOutcome,
};
use crate::error::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read side of the local feed cache.
///
/// A missing feed is a normal state: implementations return an empty
/// `FeedState` instead of an error.
#[async_trait]
pub trait CacheReader: Send + Sync {
    async fn read(&self, key: &FeedKey) -> FeedState;
}

/// Full local store used by fetchers, policies and the like use case.
#[async_trait]
pub trait FeedStore: CacheReader {
    /// Replaces the cached page for `key` and records a successful refresh.
    async fn replace_items(
        &self,
        key: &FeedKey,
        items: &[FeedItem],
        refreshed_at: DateTime<Utc>,
    ) -> AppResult<()>;

    async fn metadata(&self, key: &FeedKey) -> AppResult<FeedMetadata>;

    /// Records a successful refresh that produced no item changes.
    async fn touch(&self, key: &FeedKey, refreshed_at: DateTime<Utc>) -> AppResult<()>;

    /// Forces the next policy check for `key` to ask for a refresh.
    async fn mark_stale(&self, key: &FeedKey) -> AppResult<()>;

    async fn find_item(&self, id: ItemId) -> AppResult<Option<FeedItem>>;

    /// Updates like counters of `id` in every feed that contains it.
    async fn set_like(&self, id: ItemId, is_liked: bool, like_count: i64) -> AppResult<()>;
}

/// Issues a network fetch for a feed.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, key: &FeedKey, mode: RefreshMode) -> RefreshOutcome;
}

/// Decides whether a routine refresh should run right now.
///
/// Called on every load; implementations must not cache the answer.
#[async_trait]
pub trait RefreshPolicy: Send + Sync {
    async fn should_refresh(&self, key: &FeedKey) -> bool;
}

/// Likes or unlikes a post on behalf of `actor_id`.
#[async_trait]
pub trait LikeAction: Send + Sync {
    async fn perform(&self, item: &FeedItem, wants_like: bool, actor_id: i64) -> LikeOutcome;
}
