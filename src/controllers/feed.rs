use axum::{
    extract::{Path, State},
    Json,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::domain::digest::{AggregatingStateMerger, MergedState};
use crate::domain::feed::{
    Communication, Event, FeedItem, FeedKey, FeedRepository, FeedResponse, ItemId, LikeOutcome,
    LikeRequest, RefreshOutcome,
};
use crate::error::{AppError, AppResult};

/// Response for the merged digest of every configured feed
#[derive(Debug, Serialize, Deserialize)]
pub struct DigestResponse {
    pub feeds: Vec<FeedKey>,
    pub items: Vec<FeedItem>,
}

/// A feed together with the notifications raised since the last read
#[derive(Debug, Serialize)]
pub struct FeedDetailResponse {
    #[serde(flatten)]
    pub feed: FeedResponse,
    pub communications: Vec<Communication>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub outcome: RefreshOutcome,
    pub feed: FeedResponse,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub outcome: LikeOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<FeedItem>,
}

type CommunicationReceiver = broadcast::Receiver<Arc<Event<Communication>>>;

pub struct FeedController {
    order: Vec<FeedKey>,
    repositories: HashMap<FeedKey, FeedRepository>,
    communications: Mutex<HashMap<FeedKey, CommunicationReceiver>>,
    digest: MergedState<FeedItem>,
    actor_id: i64,
}

impl FeedController {
    /// Takes started repositories; each one stays active for as long as the
    /// controller lives because the digest observes it.
    pub fn new(repositories: Vec<FeedRepository>, actor_id: i64) -> Self {
        let order: Vec<FeedKey> = repositories.iter().map(|r| r.key().clone()).collect();

        let digest = repositories
            .iter()
            .enumerate()
            .fold(AggregatingStateMerger::new(), |merger, (priority, repo)| {
                merger.source(priority, repo.observe().into_partial_state())
            })
            .spawn();

        let communications = repositories
            .iter()
            .map(|r| (r.key().clone(), r.subscribe_communications()))
            .collect();

        let repositories = repositories
            .into_iter()
            .map(|r| (r.key().clone(), r))
            .collect();

        Self {
            order,
            repositories,
            communications: Mutex::new(communications),
            digest,
            actor_id,
        }
    }

    fn repository(&self, raw_key: &str) -> AppResult<&FeedRepository> {
        let key: FeedKey = raw_key.parse()?;
        self.repositories
            .get(&key)
            .ok_or_else(|| AppError::NotFound(format!("Feed {} is not configured", key)))
    }

    /// Consumes every notification this controller has not handed out yet.
    fn drain_communications(&self, key: &FeedKey) -> Vec<Communication> {
        let mut receivers = self.communications.lock();
        let Some(rx) = receivers.get_mut(key) else {
            return Vec::new();
        };

        let mut drained = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    if let Some(communication) = event.take() {
                        drained.push(communication.clone());
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(feed = %key, skipped, "Dropped feed notifications");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        drained
    }

    /// GET /api/feeds - Merged digest of all feeds
    pub async fn list_feeds(
        State(controller): State<Arc<FeedController>>,
    ) -> AppResult<Json<DigestResponse>> {
        Ok(Json(DigestResponse {
            feeds: controller.order.clone(),
            items: controller.digest.current(),
        }))
    }

    /// GET /api/feeds/:key - Current state of one feed
    pub async fn get_feed(
        State(controller): State<Arc<FeedController>>,
        Path(raw_key): Path<String>,
    ) -> AppResult<Json<FeedDetailResponse>> {
        let repository = controller.repository(&raw_key)?;
        let snapshot = repository.snapshot();

        Ok(Json(FeedDetailResponse {
            feed: FeedResponse::from(snapshot.as_ref()),
            communications: controller.drain_communications(repository.key()),
        }))
    }

    /// POST /api/feeds/:key/refresh - Pull-to-refresh
    pub async fn refresh_feed(
        State(controller): State<Arc<FeedController>>,
        Path(raw_key): Path<String>,
    ) -> AppResult<Json<RefreshResponse>> {
        let repository = controller.repository(&raw_key)?;
        let outcome = repository.refresh_posts().await?;
        let snapshot = repository.snapshot();

        Ok(Json(RefreshResponse {
            outcome,
            feed: FeedResponse::from(snapshot.as_ref()),
        }))
    }

    /// POST /api/feeds/:key/likes - Like or unlike a post of the feed
    pub async fn like_post(
        State(controller): State<Arc<FeedController>>,
        Path(raw_key): Path<String>,
        Json(request): Json<LikeRequest>,
    ) -> AppResult<Json<LikeResponse>> {
        let repository = controller.repository(&raw_key)?;
        let id = ItemId {
            site_id: request.site_id,
            post_id: request.post_id,
        };
        let item = repository
            .snapshot()
            .find(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Post {} is not in feed {}", id, repository.key())))?;

        let outcome = repository
            .perform_like_action(item, request.like, controller.actor_id)
            .await?;

        Ok(Json(LikeResponse {
            outcome,
            item: repository.snapshot().find(id).cloned(),
        }))
    }
}
