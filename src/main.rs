mod config;
mod domain;
mod routes;
mod services;
mod worker;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;

use config::Config;
use services::platforms::PlatformRegistry;
use services::platforms::facebook::FacebookAdapter;
use services::platforms::youtube::YouTubeAdapter;
use services::youtube::YouTubeClient;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub youtube: YouTubeClient,
    pub platforms: PlatformRegistry,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let youtube = YouTubeClient::new(&config.google_client_id, &config.google_client_secret);
    let platforms = PlatformRegistry::new(vec![
        Arc::new(YouTubeAdapter::new(youtube.clone())),
        Arc::new(FacebookAdapter),
    ]);

    let state = Arc::new(AppState {
        db: pool.clone(),
        config: config.clone(),
        youtube,
        platforms: platforms.clone(),
    });

    // The publish worker also runs in-process so deployments without an
    // external cron still drain the queue.
    tokio::spawn(worker::start_background_scheduler(
        pool,
        platforms,
        config.publish_interval_secs,
    ));

    let app = routes::build_routes().with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}: {}", addr, e));

    info!("Listening on http://{}", addr);
    info!(
        "[scheduler] Publish scheduler started ({}s interval)",
        config.publish_interval_secs
    );
    axum::serve(listener, app).await.expect("Server failed");
}
