//! Workshop registration gateway server.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use workshop_gateway::{
    admission::{AdmissionController, SlotCleaner},
    auth::TokenVerifier,
    bus::{QueueEventPublisher, QueueJoinConsumer},
    config::Config,
    enrollment::EnrollmentEngine,
    hub::NotificationHub,
    runtime::Application,
    seats::SeatManager,
    server::{build_router, AppState},
    store::{AdmissionStore, SeatHoldStore},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "workshop_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting workshop registration gateway");

    let config = Arc::new(Config::from_env());
    info!(
        postgres_url = %config.postgres.url,
        redis_addr = %config.redis.addr,
        kafka_brokers = %config.kafka.brokers,
        "configuration loaded"
    );

    // Durable store
    info!("connecting to database");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .connect(&config.postgres.url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("database connected, migrations applied");

    // Shared state store
    info!("connecting to shared state store");
    let redis = workshop_gateway::store::connect(&config.redis.url()).await?;
    let admission_store = AdmissionStore::new(
        redis.clone(),
        config.queue.session_ttl,
        config.queue.default_limit,
        config.queue.promotion_lock_ttl,
    );
    let hold_store = SeatHoldStore::new(redis, config.queue.hold_ttl, config.queue.seat_lock_ttl);
    info!("shared state store connected");

    // Event bus
    info!("connecting to event bus");
    if let Err(e) = workshop_gateway::bus::ensure_queue_topic(&config.kafka.brokers).await {
        // The broker may auto-create it on first publish; the consumer
        // retries subscription regardless.
        tracing::warn!(error = %e, "could not pre-create queue topic");
    }
    let publisher = Arc::new(QueueEventPublisher::new(
        &config.kafka.brokers,
        Duration::from_secs(config.kafka.producer_timeout),
    )?);
    info!("event bus producer ready");

    // Core services
    let hub = Arc::new(NotificationHub::new());
    let admission = Arc::new(AdmissionController::new(
        admission_store.clone(),
        publisher,
        hub.clone(),
        config.queue.eta_minutes_per_position,
    ));
    let enrollment = Arc::new(EnrollmentEngine::new(
        pool.clone(),
        hold_store.clone(),
        hub.clone(),
    ));
    let seats = Arc::new(SeatManager::new(pool.clone(), hold_store, hub.clone()));
    let verifier = Arc::new(TokenVerifier::new(&config.auth.jwt_secret));

    // Background tasks
    let (shutdown_tx, _) = broadcast::channel(1);
    let consumer = QueueJoinConsumer::new(
        config.kafka.brokers.clone(),
        admission_store,
        hub.clone(),
        shutdown_tx.subscribe(),
        Duration::from_secs(config.kafka.consumer_retry_delay),
        config.queue.eta_minutes_per_position,
    );
    let cleaner = SlotCleaner::new(
        admission.clone(),
        seats.clone(),
        Duration::from_secs(config.queue.cleanup_interval),
        shutdown_tx.subscribe(),
    );

    // HTTP surface
    let state = AppState {
        config: config.clone(),
        pool,
        admission,
        hub,
        enrollment,
        seats,
        verifier,
    };
    let router = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "listening");

    Application::new(
        listener,
        router,
        consumer,
        cleaner,
        shutdown_tx,
        Duration::from_secs(config.server.shutdown_timeout),
    )
    .run()
    .await?;

    info!("server exited");
    Ok(())
}
