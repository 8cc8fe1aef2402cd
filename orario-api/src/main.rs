use std::net::SocketAddr;
use std::sync::Arc;

use orario_api::{
    app,
    state::{AppState, AuthConfig},
};
use orario_booking::{BookingEngine, EngineRules};
use orario_core::SystemClock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orario_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = orario_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Orario API on port {}", config.server.port);

    let db = orario_store::DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let redis = orario_store::RedisLockStore::new(&config.redis.url)
        .expect("Failed to connect to Redis");

    let kafka = Arc::new(
        orario_store::EventProducer::new(&config.kafka.brokers)
            .expect("Failed to create Kafka producer"),
    );

    let rules = EngineRules {
        hold_ttl_seconds: config.business_rules.hold_ttl_seconds,
        reap_interval_seconds: config.business_rules.reap_interval_seconds,
        auto_confirm: config.business_rules.auto_confirm,
    };
    let reap_interval = rules.reap_interval_seconds;

    let engine = Arc::new(BookingEngine::new(
        Arc::new(orario_store::PgReservationStore::new(db.pool.clone())),
        Arc::new(redis),
        Arc::new(SystemClock),
        rules,
    ));

    tokio::spawn(orario_api::worker::start_hold_reaper(
        engine.clone(),
        kafka.clone(),
        reap_interval,
    ));

    let app_state = AppState {
        engine,
        events: kafka,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
