//! Parley server binary.
//!
//! Composition root: constructs the store, bus, registry and services
//! once at startup and passes them into the core by reference. No ambient
//! singletons.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use parley::adapters::auth::{IntrospectionValidator, JwtValidator};
use parley::adapters::events::{
    IdempotentHandler, InMemoryEventBus, InMemoryProcessedEventStore, RedisEventBus,
};
use parley::adapters::http::{http_router, AppState};
use parley::adapters::presence::StorePresenceTracker;
use parley::adapters::store::InMemoryDocumentStore;
use parley::adapters::websocket::{
    websocket_router, ConnectionLifecycle, ConnectionRegistry, FanoutHandler, LifecycleConfig,
    WebSocketState,
};
use parley::application::health::HealthService;
use parley::application::notifications::NotificationEngine;
use parley::config::AppConfig;
use parley::ports::{DocumentStore, EventBus, SubscriptionConfig, TokenValidator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config);

    // --- External collaborators ---
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let bus: Arc<dyn EventBus> = if config.redis.is_configured() {
        Arc::new(RedisEventBus::new(&config.redis.url)?)
    } else {
        tracing::warn!("No Redis configured; using the in-process bus (single instance only)");
        Arc::new(InMemoryEventBus::new())
    };

    // --- Core services ---
    let registry = Arc::new(ConnectionRegistry::new());
    let engine = Arc::new(NotificationEngine::new(
        store.clone(),
        bus.clone(),
        config.notifications.topic.clone(),
    ));

    let validator: Arc<dyn TokenValidator> = Arc::new(JwtValidator::new(
        &config.auth.jwt_secret,
        &config.auth.issuer,
    ));
    let authority: Arc<dyn TokenValidator> = match &config.auth.introspection_url {
        Some(url) => Arc::new(IntrospectionValidator::new(
            url.clone(),
            config.auth.client_id.clone(),
            config.auth.client_secret.clone(),
        )),
        // No introspection endpoint: re-validation repeats the local check.
        None => validator.clone(),
    };
    let presence = Arc::new(StorePresenceTracker::new(store.clone()));
    let lifecycle = Arc::new(ConnectionLifecycle::new(
        registry.clone(),
        validator,
        authority,
        presence,
        LifecycleConfig {
            sweep_interval: config.notifications.sweep_interval(),
            revalidate_after: config.notifications.revalidate_after(),
        },
    ));
    let sweeper = lifecycle.spawn_sweeper();

    // --- Bus wiring ---
    // One shared topic; a per-process subscription name so every instance
    // sees every event whether the transport broadcasts or load-balances.
    bus.create_topic(&config.notifications.topic).await?;
    let subscription = instance_subscription(&config.notifications.subscription);
    bus.create_subscription(
        &config.notifications.topic,
        &subscription,
        SubscriptionConfig::default(),
    )
    .await?;

    let processed = Arc::new(InMemoryProcessedEventStore::new());
    let fanout = IdempotentHandler::new(
        FanoutHandler::new(registry.clone(), store.clone()),
        processed,
    );
    bus.subscribe(&subscription, Arc::new(fanout)).await?;
    tracing::info!(subscription = %subscription, "Fanout subscription attached");

    // --- HTTP surface ---
    let health = Arc::new(HealthService::new(
        store.clone(),
        bus.clone(),
        registry.clone(),
    ));
    let ws_state = WebSocketState {
        lifecycle: lifecycle.clone(),
        engine,
        store,
        send_buffer: config.notifications.send_buffer,
    };

    let app = Router::new()
        .merge(websocket_router().with_state(ws_state))
        .merge(http_router(AppState {
            health,
            lifecycle: lifecycle.clone(),
        }))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(cors_layer(&config));

    let addr = config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Parley listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Shutdown ---
    let closed = lifecycle.force_disconnect_all("server shutting down").await;
    tracing::info!(closed, "Connections closed for shutdown");
    sweeper.abort();
    if let Err(e) = bus.close().await {
        tracing::warn!(error = %e, "Bus close failed");
    }

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    if config.is_production() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Per-process subscription name: base + hostname + random suffix.
fn instance_subscription(base: &str) -> String {
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "local".to_string());
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}.{}-{}", base, hostname, &suffix[..8])
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install shutdown handler");
    }
}
