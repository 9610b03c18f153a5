pub mod request_id;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::controllers::{
    feed::FeedController,
    health::{self, HealthState},
};
use crate::infrastructure::config::Config;

pub use request_id::{request_id_middleware, RequestId, X_REQUEST_ID};

/// Build the application router with all routes configured
pub fn create_router(feed_controller: Arc<FeedController>, health_state: Arc<HealthState>) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::health_ready))
        .with_state(health_state);

    let feed_routes = Router::new()
        .route("/api/feeds", get(FeedController::list_feeds))
        .route("/api/feeds/:key", get(FeedController::get_feed))
        .route("/api/feeds/:key/refresh", post(FeedController::refresh_feed))
        .route("/api/feeds/:key/likes", post(FeedController::like_post))
        .with_state(feed_controller);

    Router::new()
        .merge(health_routes)
        .merge(feed_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Serve `app` until `shutdown` resolves
pub async fn start_http_server(
    config: &Config,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
