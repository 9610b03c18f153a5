use feedsync::app::Application;
use feedsync::infrastructure::config::{Config, LogFormat};
use feedsync::infrastructure::http::start_http_server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(&config);

    tracing::info!(
        "Starting feedsync on {}:{}",
        config.host,
        config.port
    );
    tracing::info!(
        environment = ?config.environment,
        feeds = ?config.feeds.iter().map(ToString::to_string).collect::<Vec<_>>(),
        cache_backend = ?config.cache_backend,
        api = %config.wpcom_api_base,
        signed_in = config.wpcom_user_id > 0,
        "Configuration loaded"
    );
    if config.wpcom_access_token.is_none() {
        tracing::warn!("WPCOM_ACCESS_TOKEN not set, likes and the followed feed will fail");
    }

    let app = Application::build(&config).await?;

    start_http_server(&config, app.router.clone(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
    })
    .await?;

    app.shutdown().await;

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "feedsync=debug,tower_http=debug".into());

    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}
