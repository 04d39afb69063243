//! HTTP surface: gateway callbacks, checkout redirect and operator actions

pub mod admin;
pub mod checkout;
pub mod webhooks;

use crate::config::SettingsHandle;
use crate::health::{HealthChecker, HealthState, HealthStatus};
use crate::payments::callback::CallbackReceiver;
use crate::payments::client::TradeClient;
use crate::payments::expiry::ExpiryScheduler;
use crate::payments::locks::OrderLocks;
use crate::payments::order::OrderStore;
use crate::payments::reconciler::Reconciler;
use crate::payments::registry::MethodRegistry;
use crate::payments::request_builder::RequestBuilder;
use crate::payments::utils::HttpTransport;
use crate::workers::InMemoryTaskScheduler;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tracing::{error, info};

/// Shared services behind every route
#[derive(Clone)]
pub struct AppState {
    pub settings: SettingsHandle,
    pub store: Arc<dyn OrderStore>,
    pub registry: Arc<MethodRegistry>,
    pub request_builder: Arc<RequestBuilder>,
    pub callbacks: Arc<CallbackReceiver>,
    pub trade_client: Arc<TradeClient>,
    pub expiry: Arc<ExpiryScheduler>,
    pub health_checker: HealthChecker,
}

impl AppState {
    /// Wires the payment core around the given collaborators.
    pub fn new(
        settings: SettingsHandle,
        store: Arc<dyn OrderStore>,
        scheduler: Arc<InMemoryTaskScheduler>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let registry = Arc::new(MethodRegistry::from_settings(&settings.snapshot()));
        let locks = Arc::new(OrderLocks::new());
        let expiry = Arc::new(ExpiryScheduler::new(
            settings.clone(),
            store.clone(),
            scheduler.clone(),
            registry.clone(),
            locks.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(store.clone(), expiry.clone()));
        let callbacks = Arc::new(CallbackReceiver::new(
            settings.clone(),
            store.clone(),
            reconciler,
        ));
        let request_builder = Arc::new(RequestBuilder::new(
            settings.clone(),
            registry.clone(),
            store.clone(),
        ));
        let trade_client = Arc::new(TradeClient::new(
            settings.clone(),
            store.clone(),
            registry.clone(),
            transport,
            locks,
        ));
        let health_checker = HealthChecker::new(settings.clone(), scheduler);

        Self {
            settings,
            store,
            registry,
            request_builder,
            callbacks,
            trade_client,
            expiry,
            health_checker,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/payuni/notify", post(webhooks::notify))
        .route("/payuni/return", post(webhooks::payment_return))
        .route("/checkout/orders/{id}/pay", get(checkout::pay))
        .route("/admin/orders/{id}/query", post(admin::query_order))
        .route("/admin/orders/{id}/refund", post(admin::refund_order))
        .route(
            "/admin/orders/{id}/schedule-cancel",
            post(admin::schedule_cancel),
        )
        .route("/admin/orders/{id}/status", post(admin::change_status))
        .route(
            "/admin/orders/{id}/payment-details",
            get(admin::payment_details),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    let health_status = state.health_checker.check_health().await;

    if health_status.status == HealthState::Unhealthy {
        error!("Health check failed - service unhealthy");
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(health_status)))
    } else {
        Ok(Json(health_status))
    }
}

async fn liveness() -> &'static str {
    info!("Liveness probe requested");
    "OK"
}
