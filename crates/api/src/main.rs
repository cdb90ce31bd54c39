//! Order courier API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use courier_common::config::AppConfig;
use courier_common::db::create_pool;
use courier_common::redis_pool::create_redis_pool;
use courier_notifier::channel::RetryPolicy;
use courier_notifier::orders::OrderNotifications;
use courier_notifier::postgres::PgStore;
use courier_notifier::telegram::TelegramChannel;
use courier_notifier::{Dispatcher, LinkConfig};
use courier_scheduler::{LocalClaims, RedisClaims, ReminderClaims, ReminderRunner, ReminderScheduler};

use courier_api::routes::create_router;
use courier_api::state::AppState;

/// Webhook payloads are small JSON documents.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "courier_api=info,courier_notifier=info,courier_scheduler=info,tower_http=info",
        )
    });
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!("Starting order courier API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database pool created, migrations applied");

    let store = Arc::new(PgStore::new(
        pool,
        config.director_address_field,
        config.master_address_field,
    ));
    let channel = Arc::new(TelegramChannel::new(
        config.telegram_api_url.clone(),
        config.telegram_bot_token.clone(),
        RetryPolicy::default(),
    )?);

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        store.clone(),
        channel,
        LinkConfig {
            director_order_url: config.director_order_url.clone(),
            master_order_url: config.master_order_url.clone(),
        },
        config.reminders.timezone,
    ));
    let notifications = Arc::new(OrderNotifications::new(dispatcher.clone(), store.clone()));

    let claims: Arc<dyn ReminderClaims> = match &config.redis_url {
        Some(url) => {
            let redis = create_redis_pool(url).await?;
            tracing::info!("Redis connection established, reminder claims are shared");
            Arc::new(RedisClaims::new(redis))
        }
        None => {
            tracing::warn!("REDIS_URL not set, reminder claims are local to this process");
            Arc::new(LocalClaims::new())
        }
    };

    let scheduler = Arc::new(ReminderScheduler::new(
        store.clone(),
        store,
        dispatcher.clone(),
        claims,
        config.reminders.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = if config.scheduler_enabled {
        Some(tokio::spawn(
            ReminderRunner::new(scheduler.clone()).run(shutdown_rx),
        ))
    } else {
        tracing::info!("Reminder scheduler disabled");
        None
    };

    let port = config.port;
    let state = AppState::new(dispatcher, notifications, scheduler, config);

    // Build router
    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received shutdown signal");
        })
        .await?;

    shutdown_tx.send(true).ok();
    if let Some(runner) = runner {
        runner.await?;
    }

    tracing::info!("Order courier API server stopped");
    Ok(())
}
