//! HTTP API server and process wiring for the delivery fulfillment system.
//!
//! Exposes the dispatch engine's operations over REST with structured
//! logging (tracing) and Prometheus metrics, and assembles the background
//! machinery: outbox publisher, offer-expiry sweep, and the bus consumer
//! loop feeding the saga's event router.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use dispatch::{DispatchConfig, DispatchEngine, InMemoryDispatchStore};
use domain::{AssignDriverCommand, InMemoryDriverNotifier, InMemoryDriverRegistry, InMemoryOrderStore};
use metrics_exporter_prometheus::PrometheusHandle;
use outbox::{EventEnvelope, InMemoryMessageBus, InMemoryOutboxStore, OutboxPublisher};
use saga::{EventRouter, SagaError, SagaManager, register_saga_handlers};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
use routes::dispatch::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders/{id}/dispatch",
            post(routes::dispatch::start).get(routes::dispatch::status),
        )
        .route(
            "/orders/{id}/offer-response",
            post(routes::dispatch::respond),
        )
        .route(
            "/orders/{id}/cancel-assignment",
            post(routes::dispatch::cancel),
        )
        .route("/dispatch/expire-offers", post(routes::dispatch::expire))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Everything `main` needs to run the process: HTTP state plus the
/// background collaborators.
pub struct AppContext {
    pub state: Arc<AppState>,
    pub router: Arc<EventRouter>,
    pub bus: InMemoryMessageBus,
    pub publisher: Arc<OutboxPublisher<InMemoryOutboxStore, InMemoryMessageBus>>,
}

/// Wires the default single-process deployment: in-memory stores and bus,
/// dispatch engine, saga manager, and the event router with every
/// consumed event type registered.
pub fn create_default_context(config: &Config) -> AppContext {
    let orders = InMemoryOrderStore::new();
    let registry = InMemoryDriverRegistry::new();
    let attempts = InMemoryDispatchStore::new();
    let notifier = InMemoryDriverNotifier::new();
    let outbox_store = InMemoryOutboxStore::new();
    let bus = InMemoryMessageBus::new();

    let engine = Arc::new(
        DispatchEngine::new(
            orders.clone(),
            registry.clone(),
            attempts,
            notifier,
            outbox_store.clone(),
        )
        .with_config(DispatchConfig {
            offer_timeout: config.offer_timeout,
        }),
    );

    let manager = Arc::new(SagaManager::new(orders.clone(), outbox_store.clone()));
    let mut router = EventRouter::new();
    register_saga_handlers(&mut router, manager);

    // The dispatch engine consumes the saga's AssignDriverCommand.
    let dispatch_engine = Arc::clone(&engine);
    router.register(AssignDriverCommand::EVENT_TYPE, move |env: EventEnvelope| {
        let engine = Arc::clone(&dispatch_engine);
        async move {
            let command: AssignDriverCommand =
                env.payload_as().map_err(|source| SagaError::Malformed {
                    event_type: env.event_type.clone(),
                    source,
                })?;
            engine
                .start_dispatch(command.order_id)
                .await
                .map_err(|e| SagaError::Handler(e.to_string()))?;
            Ok(())
        }
    });

    let publisher = Arc::new(OutboxPublisher::with_poll_interval(
        outbox_store.clone(),
        bus.clone(),
        config.outbox_poll_interval,
    ));

    let state = Arc::new(AppState {
        engine,
        orders,
        registry,
        outbox: outbox_store,
    });

    AppContext {
        state,
        router: Arc::new(router),
        bus,
        publisher,
    }
}
