// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use mock_exam::config::Config;
use mock_exam::routes;
use mock_exam::services::{
    clock::SystemClock,
    engine::MockExamEngine,
    free_pool::{FreeQuestionPool, spawn_refresh_job},
};
use mock_exam::state::AppState;
use mock_exam::store::{PgQuestionCatalog, PgSessionStore, QuestionCatalog};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let pool = connect_with_retry(&config).await?;
    tracing::info!("Database connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations applied successfully.");

    let catalog: Arc<dyn QuestionCatalog> = Arc::new(PgQuestionCatalog::new(pool.clone()));
    let engine = MockExamEngine::new(
        Arc::new(PgSessionStore::new(pool.clone())),
        catalog.clone(),
        Arc::new(SystemClock),
        config.timer_retry_backoff,
    );

    // Deadlines of sessions that were running before the restart
    engine.recover_on_startup().await?;

    let free_pool = Arc::new(FreeQuestionPool::new(catalog.clone()));
    let refresh_job = spawn_refresh_job(free_pool.clone(), config.pool_refresh_interval);

    let state = AppState {
        config: config.clone(),
        engine,
        free_pool,
        catalog,
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    refresh_job.cancel();
    Ok(())
}

// Initialize Database Pool with Retry
async fn connect_with_retry(config: &Config) -> Result<PgPool, sqlx::Error> {
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    tracing::error!("Failed to connect to database after 5 retries: {}", e);
                    return Err(e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
