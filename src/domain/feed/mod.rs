pub mod contracts;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod fetcher;
pub mod like;
pub mod model;
pub mod notifier;
pub mod pending;
pub mod remote;
pub mod repository;

pub use contracts::{CacheReader, FeedStore, LikeAction, RefreshPolicy, RemoteFetcher};
pub use coordinator::FetchCoordinator;
pub use error::{Communication, FeedRepositoryError};
pub use event::Event;
pub use fetcher::{StoreBackedFetcher, DEFAULT_PAGE_SIZE};
pub use like::LikePostUseCase;
pub use model::{
    ActivationState, FeedItem, FeedKey, FeedMetadata, FeedState, ItemId, LikeOutcome,
    PostPayload, RefreshMode, RefreshOutcome, StateOrigin,
};
pub use notifier::{ListenerId, OutcomeBus};
pub use pending::PendingRequests;
pub use remote::{LikeStatus, PostsApi, PostsQuery, RemotePost};
pub use repository::{FeedObserver, FeedRepository, FeedRepositoryDeps, FeedRepositoryFactory};

use serde::{Deserialize, Serialize};

/// Response for a single feed
#[derive(Debug, Serialize, Deserialize)]
pub struct FeedResponse {
    pub key: FeedKey,
    pub origin: StateOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub items: Vec<FeedItem>,
}

/// Request to like or unlike a post
#[derive(Debug, Serialize, Deserialize)]
pub struct LikeRequest {
    pub site_id: i64,
    pub post_id: i64,
    pub like: bool,
}

impl From<&FeedState> for FeedResponse {
    fn from(state: &FeedState) -> Self {
        Self {
            key: state.key.clone(),
            origin: state.origin,
            refreshed_at: state.refreshed_at,
            items: state.items().to_vec(),
        }
    }
}
