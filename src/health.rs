//! Health check module
//! Reports whether the gateway configuration is usable and how much deferred work is queued

use crate::config::SettingsHandle;
use crate::workers::InMemoryTaskScheduler;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    settings: SettingsHandle,
    scheduler: Arc<InMemoryTaskScheduler>,
}

impl HealthChecker {
    pub fn new(settings: SettingsHandle, scheduler: Arc<InMemoryTaskScheduler>) -> Self {
        Self {
            settings,
            scheduler,
        }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();
        let mut overall_healthy = true;

        // Active credentials must be usable for every crypto call
        let start = Instant::now();
        let settings = self.settings.snapshot();
        match settings.active_credentials().validate() {
            Ok(()) => {
                health_status.checks.insert(
                    "gateway_credentials".to_string(),
                    ComponentHealth::up(Some(start.elapsed().as_millis())),
                );
            }
            Err(e) => {
                overall_healthy = false;
                error!("Gateway credential check failed: {}", e);
                health_status.checks.insert(
                    "gateway_credentials".to_string(),
                    ComponentHealth::down(Some(e)),
                );
            }
        }

        let start = Instant::now();
        let pending = self.scheduler.len().await;
        let scheduler_health = if settings.auto_cancel_enabled || pending == 0 {
            ComponentHealth::up(Some(start.elapsed().as_millis()))
        } else {
            ComponentHealth::warning(
                Some(start.elapsed().as_millis()),
                Some(format!(
                    "{} task(s) queued while auto-cancellation is disabled",
                    pending
                )),
            )
        };
        health_status
            .checks
            .insert("task_scheduler".to_string(), scheduler_health);

        let any_warning = health_status
            .checks
            .values()
            .any(|check| check.status == ComponentState::Warning);
        health_status.status = if !overall_healthy {
            HealthState::Unhealthy
        } else if any_warning {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        info!(status = ?health_status.status, pending_tasks = pending, "Health check completed");
        health_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support;
    use crate::payments::crypto::Credentials;

    #[tokio::test]
    async fn test_healthy_with_valid_credentials() {
        let checker = HealthChecker::new(
            test_support::handle(),
            Arc::new(InMemoryTaskScheduler::new()),
        );
        let status = checker.check_health().await;
        assert!(status.is_healthy());
        assert_eq!(status.checks.len(), 2);
    }

    #[tokio::test]
    async fn test_unhealthy_with_short_key() {
        let settings = test_support::handle();
        settings.update(|s| s.test = Credentials::new("S01234567", "short", "1234567890123456"));
        let checker = HealthChecker::new(settings, Arc::new(InMemoryTaskScheduler::new()));

        let status = checker.check_health().await;
        assert_eq!(status.status, HealthState::Unhealthy);
        assert_eq!(
            status.checks["gateway_credentials"].status,
            ComponentState::Down
        );
    }
}
