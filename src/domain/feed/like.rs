use super::contracts::{FeedStore, LikeAction};
use super::model::{FeedItem, LikeOutcome};
use super::remote::PostsApi;
use async_trait::async_trait;
use std::sync::Arc;

/// Likes a post locally first, then on the server, reverting the local change
/// when the server call fails.
pub struct LikePostUseCase {
    api: Arc<dyn PostsApi>,
    store: Arc<dyn FeedStore>,
}

impl LikePostUseCase {
    pub fn new(api: Arc<dyn PostsApi>, store: Arc<dyn FeedStore>) -> Self {
        Self { api, store }
    }
}

#[async_trait]
impl LikeAction for LikePostUseCase {
    async fn perform(&self, item: &FeedItem, wants_like: bool, actor_id: i64) -> LikeOutcome {
        if actor_id <= 0 {
            return LikeOutcome::Failure("a signed-in user is required to like posts".to_string());
        }

        let current = match self.store.find_item(item.id).await {
            Ok(Some(current)) => current,
            Ok(None) => item.clone(),
            Err(e) => return LikeOutcome::Failure(e.to_string()),
        };
        if current.payload.is_liked == wants_like {
            return LikeOutcome::Unchanged;
        }

        let delta = if wants_like { 1 } else { -1 };
        if let Err(e) = self
            .store
            .set_like(item.id, wants_like, current.payload.like_count + delta)
            .await
        {
            return LikeOutcome::Failure(e.to_string());
        }

        match self.api.set_like(item.id, wants_like).await {
            Ok(status) => {
                if let Err(e) = self
                    .store
                    .set_like(item.id, status.i_like, status.like_count)
                    .await
                {
                    tracing::warn!(item = %item.id, error = %e, "Failed to store server like counters");
                }
                tracing::info!(item = %item.id, actor_id, liked = status.i_like, "Like action completed");
                LikeOutcome::Success
            }
            Err(e) => {
                tracing::warn!(item = %item.id, actor_id, error = %e, "Like action failed, reverting");
                if let Err(revert) = self
                    .store
                    .set_like(item.id, current.payload.is_liked, current.payload.like_count)
                    .await
                {
                    tracing::error!(item = %item.id, error = %revert, "Failed to revert local like");
                }
                LikeOutcome::Failure(e.to_string())
            }
        }
    }
}
