use axum::Router;
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;

use crate::controllers::{feed::FeedController, health::HealthState};
use crate::domain::feed::{
    CacheReader, FeedRepository, FeedRepositoryDeps, FeedRepositoryFactory, FeedStore,
    FetchCoordinator, LikePostUseCase, OutcomeBus, PostsApi, StoreBackedFetcher,
};
use crate::domain::refresh::{
    BackgroundRefresher, ConnectivityMonitor, RefresherHandle, StalenessPolicy,
};
use crate::error::AppResult;
use crate::infrastructure::config::{CacheBackend, Config};
use crate::infrastructure::db::{check_connection, create_pool, run_migrations, DbPool};
use crate::infrastructure::http::create_router;
use crate::infrastructure::repositories::{MemoryFeedStore, SqliteFeedStore};
use crate::infrastructure::wpcom::WpComClient;

/// Fully wired service: stores, repositories, refresher and router.
pub struct Application {
    pub router: Router,
    pub feed_controller: Arc<FeedController>,
    pub store: Arc<dyn FeedStore>,
    pub connectivity: Arc<ConnectivityMonitor>,
    repositories: Vec<FeedRepository>,
    refresher: Option<RefresherHandle>,
}

impl Application {
    /// Wires the application against the WordPress.com API from `config`.
    pub async fn build(config: &Config) -> AppResult<Self> {
        let api = Arc::new(WpComClient::new(
            config.wpcom_api_base.clone(),
            config.wpcom_access_token.clone(),
            Duration::from_secs(config.http_timeout_seconds),
        )?);
        Self::build_with_api(config, api).await
    }

    pub async fn build_with_api(config: &Config, api: Arc<dyn PostsApi>) -> AppResult<Self> {
        // 1. Cache store
        let (store, cache, pool): (Arc<dyn FeedStore>, Arc<dyn CacheReader>, Option<Arc<DbPool>>) =
            match config.cache_backend {
                CacheBackend::Sqlite => {
                    let pool = create_pool(&config.database_url).await?;
                    check_connection(&pool).await?;
                    run_migrations(&pool).await?;
                    tracing::info!("Database connection verified and migrations applied");
                    let pool = Arc::new(pool);
                    let store = Arc::new(SqliteFeedStore::new(pool.clone()));
                    (store.clone(), store, Some(pool))
                }
                CacheBackend::Memory => {
                    tracing::info!(
                        capacity = config.memory_cache_capacity,
                        "Using in-memory feed cache"
                    );
                    let store = Arc::new(MemoryFeedStore::new(config.memory_cache_capacity));
                    (store.clone(), store, None)
                }
            };

        // 2. Collaborators shared by every repository
        let connectivity = Arc::new(ConnectivityMonitor::new(
            config.connectivity_failure_threshold,
            Duration::from_secs(config.connectivity_retry_seconds),
        ));
        // Every fetch of a feed, from a repository or the refresher, goes through here.
        let fetcher = Arc::new(FetchCoordinator::new(Arc::new(
            StoreBackedFetcher::new(api.clone(), store.clone(), config.page_size)
                .with_connectivity(connectivity.clone()),
        )));
        let policy = Arc::new(StalenessPolicy::new(
            store.clone(),
            connectivity.clone(),
            ChronoDuration::minutes(config.refresh_max_age_minutes),
        ));
        let like_action = Arc::new(LikePostUseCase::new(api, store.clone()));
        let outcomes = Arc::new(OutcomeBus::new());

        let factory = FeedRepositoryFactory::new(
            FeedRepositoryDeps::new(
                cache,
                fetcher.clone(),
                policy.clone(),
                like_action,
                outcomes.clone(),
            )
            .with_mailbox_capacity(config.mailbox_capacity),
        );

        // 3. One started repository per configured feed
        let repositories: Vec<FeedRepository> = config
            .feeds
            .iter()
            .map(|key| {
                let repo = factory.create(Some(key.clone()));
                repo.start();
                repo
            })
            .collect();
        tracing::info!(feeds = repositories.len(), "Feed repositories started");

        // 4. Periodic refresher, disabled with a zero interval
        let refresher = (config.poll_interval_seconds > 0).then(|| {
            BackgroundRefresher::new(
                config.feeds.clone(),
                policy,
                fetcher,
                outcomes,
                Duration::from_secs(config.poll_interval_seconds),
            )
            .spawn()
        });

        // 5. Controllers and routes
        let feed_controller = Arc::new(FeedController::new(repositories.clone(), config.wpcom_user_id));
        let health_state = Arc::new(HealthState {
            pool,
            feeds: repositories.clone(),
        });
        let router = create_router(feed_controller.clone(), health_state);

        Ok(Self {
            router,
            feed_controller,
            store,
            connectivity,
            repositories,
            refresher,
        })
    }

    /// Stops the refresher and every repository, waiting for them to exit.
    pub async fn shutdown(self) {
        if let Some(refresher) = self.refresher {
            refresher.shutdown().await;
        }
        for repo in &self.repositories {
            repo.stop();
        }
        for repo in &self.repositories {
            repo.stopped().await;
        }
        tracing::info!("All feed repositories stopped");
    }
}
