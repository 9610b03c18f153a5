use anyhow::{bail, Result};
use feedsync::app::Application;
use feedsync::domain::feed::FeedKey;
use feedsync::infrastructure::config::{CacheBackend, Config, Environment, LogFormat};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::time::Duration;
use test_context::AsyncTestContext;
use tokio::net::TcpListener;

pub mod api_client;
pub mod assertions;
pub mod fake_wpcom;
pub mod fixtures;

use api_client::TestClient;
use fake_wpcom::FakeWpCom;
use fixtures::FakePost;

pub const DISCOVER_PATH: &str = "read/tags/discover/posts";
pub const RUST_TAG_PATH: &str = "read/tags/rust/posts";
pub const TEST_USER_ID: i64 = 7;

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feedsync=debug".into()),
        )
        .with_test_writer()
        .try_init();
});

pub struct TestContext {
    pub client: TestClient,
    pub api: FakeWpCom,
    #[allow(dead_code)]
    pub config: Config,
    app: Application,
}

impl AsyncTestContext for TestContext {
    fn setup() -> impl std::future::Future<Output = Self> + Send {
        async { Self::new().await.expect("Failed to set up test context") }
    }

    fn teardown(self) -> impl std::future::Future<Output = ()> + Send {
        async move {
            self.app.shutdown().await;
        }
    }
}

impl TestContext {
    /// Discover serves posts 2 and 1 of site 10, the rust tag serves post 3 of site 20.
    pub async fn new() -> Result<Self> {
        let api = FakeWpCom::start().await;
        api.set_posts(DISCOVER_PATH, vec![FakePost::new(10, 2), FakePost::new(10, 1)]);
        api.set_posts(RUST_TAG_PATH, vec![FakePost::new(20, 3)]);
        Self::with_api(api).await
    }

    pub async fn with_api(api: FakeWpCom) -> Result<Self> {
        Lazy::force(&TRACING);

        let config = Config {
            database_url: "sqlite::memory:".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0, // Will be assigned by the OS
            environment: Environment::Development,
            log_format: LogFormat::Pretty,
            wpcom_api_base: api.base_url.clone(),
            wpcom_access_token: Some("test-access-token".to_string()),
            wpcom_user_id: TEST_USER_ID,
            http_timeout_seconds: 5,
            feeds: vec![FeedKey::Discover, FeedKey::Tag("rust".to_string())],
            page_size: 20,
            refresh_max_age_minutes: 60,
            poll_interval_seconds: 0, // No periodic refresh, tests drive fetches
            mailbox_capacity: 16,
            connectivity_failure_threshold: 3,
            connectivity_retry_seconds: 60,
            cache_backend: CacheBackend::Sqlite,
            memory_cache_capacity: 16,
        };

        let app = Application::build(&config).await?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let router = app.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Ok(Self {
            client: TestClient::new(&base_url),
            api,
            config,
            app,
        })
    }

    /// Polls `path` until `predicate` accepts the JSON body.
    pub async fn eventually(&self, path: &str, predicate: impl Fn(&Value) -> bool) -> Result<Value> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let response = self.client.get(path).await?;
            if let Some(body) = response.body {
                if predicate(&body) {
                    return Ok(body);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                bail!("Timed out waiting on {}", path);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Waits until every configured feed has loaded its first page.
    pub async fn wait_until_loaded(&self) -> Result<Value> {
        self.eventually("/api/feeds", |body| {
            body["items"].as_array().is_some_and(|items| items.len() == 3)
        })
        .await
    }
}
