//! Fulfillment server entry point.

use std::sync::Arc;
use std::time::Duration;

use api::Config;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire stores, engine, saga, and publisher
    let context = api::create_default_context(&config);

    // 4. Outbox publisher poll loop
    let publisher = Arc::clone(&context.publisher);
    let publisher_stop = publisher.stop_handle();
    tokio::spawn(async move { publisher.run().await });

    // 5. Stale-offer expiry sweep
    let sweep_engine = Arc::clone(&context.state.engine);
    let sweep_interval = config.expiry_sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            match sweep_engine.expire_pending_offers().await {
                Ok(0) => {}
                Ok(expired) => tracing::info!(expired, "expired stale offers"),
                Err(e) => tracing::error!(error = %e, "offer expiry sweep failed"),
            }
        }
    });

    // 6. Bus consumer loop feeding the event router
    let consumer_bus = context.bus.clone();
    let router = Arc::clone(&context.router);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(50));
        loop {
            ticker.tick().await;
            for message in consumer_bus.drain() {
                router.dispatch(&message.envelope).await;
            }
        }
    });

    // 7. Build and start the HTTP server
    let app = api::create_app(Arc::clone(&context.state), metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting fulfillment server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    publisher_stop.stop();
    tracing::info!("server shut down gracefully");
}
