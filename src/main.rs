use payuni_payment::api::{self, AppState};
use payuni_payment::config::{AppConfig, SettingsHandle};
use payuni_payment::database::InMemoryOrderStore;
use payuni_payment::logging::{init_tracing, mask_merchant_id};
use payuni_payment::middleware::logging::{request_logging_middleware, UuidRequestId};
use payuni_payment::payments::scheduler::TaskHandler;
use payuni_payment::payments::utils::ReqwestTransport;
use payuni_payment::workers::{InMemoryTaskScheduler, ScheduledTaskWorker};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const TASK_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    let gateway = &config.gateway;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = gateway.environment().as_str(),
        merchant = %mask_merchant_id(gateway.active_credentials().merchant_id()),
        auto_cancel = gateway.auto_cancel_enabled,
        "Starting PAYUNi payment service"
    );

    let settings = SettingsHandle::new(config.gateway.clone());
    let store = Arc::new(InMemoryOrderStore::new());
    let scheduler = Arc::new(InMemoryTaskScheduler::new());
    let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(
        config.gateway.http_timeout_secs,
    ))?);

    let state = AppState::new(settings, store, scheduler.clone(), transport);
    info!(methods = ?state.registry.ids(), "Payment methods registered");

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let worker = ScheduledTaskWorker::new(
        scheduler,
        vec![state.expiry.clone() as Arc<dyn TaskHandler>],
        TASK_POLL_INTERVAL,
    );
    let worker_handle = tokio::spawn(worker.run(worker_shutdown_rx));

    let app = api::router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(TraceLayer::new_for_http())
            .layer(axum::middleware::from_fn(request_logging_middleware))
            .layer(PropagateRequestIdLayer::x_request_id()),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(
        address = %addr,
        notify_url = %config.gateway.notify_url,
        return_url = %config.gateway.return_url,
        "Server listening on http://{}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if let Err(e) = tokio::time::timeout(Duration::from_secs(5), worker_handle).await {
        error!(error = %e, "Timed out waiting for scheduled task worker shutdown");
    }

    info!("Server shutdown complete");

    Ok(())
}
