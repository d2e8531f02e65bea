use chatflow_booking::BookingSubFlow;
use chatflow_engine::{ChainExecutor, Collaborators, ExecutorDeps, LocalClock, WebhookProcessor};
use chatflow_integration::{HttpActionLimits, ReqwestTransport, SecureHttpAction, WhapiClient};
use chatflow_server::config::ServerConfig;
use chatflow_server::db::{
    PgBookingStore, PgChannelDirectory, PgConversationStore, PgDailyClaimStore,
    PgExecutionLogStore, PgSentMessageStore, PgSettingsStore, PgWorkflowSource,
};
use chatflow_server::routes::{AppState, router};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let db_pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    let clock = LocalClock::from_offset_minutes(config.engine.utc_offset_minutes)
        .expect("utc offset out of range");
    let messaging = WhapiClient::new(config.messaging.base_url.clone(), config.messaging.timeout())
        .expect("failed to build messaging client");
    let transport = ReqwestTransport::new(config.engine.http_max_response_bytes)
        .expect("failed to build HTTP action transport");

    let conversations = Arc::new(PgConversationStore::new(db_pool.clone()));
    let sent_messages = Arc::new(PgSentMessageStore::new(db_pool.clone()));

    let executor = ChainExecutor::new(
        ExecutorDeps {
            conversations: conversations.clone(),
            sent_messages: sent_messages.clone(),
            messaging: Arc::new(messaging),
            channels: Arc::new(PgChannelDirectory::new(db_pool.clone())),
            settings: Arc::new(PgSettingsStore::new(db_pool.clone())),
        },
        SecureHttpAction::new(
            Arc::new(transport),
            HttpActionLimits {
                timeout: config.engine.http_timeout(),
                max_response_bytes: config.engine.http_max_response_bytes,
            },
        ),
        BookingSubFlow::new(
            Arc::new(PgBookingStore::new(db_pool.clone())),
            config.engine.booking_days_ahead,
        ),
    );

    let processor = WebhookProcessor::new(
        Collaborators {
            workflows: Arc::new(PgWorkflowSource::new(db_pool.clone())),
            conversations,
            sent_messages,
            execution_logs: Arc::new(PgExecutionLogStore::new(db_pool.clone())),
            daily_claims: Arc::new(PgDailyClaimStore::new(db_pool)),
        },
        executor,
        clock,
    );

    let app = router(AppState::new(processor));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
