//! Bounded HTTP health checks

use chrono::{DateTime, Utc};
use qmops_core::config::MonitorConfig;
use qmops_core::{HealthStatus, QmopsError, Result, Surface};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of a single GET
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCheck {
    /// Short label such as `backend` or `api /api/health`
    pub label: String,
    pub url: String,
    pub status: HealthStatus,
    pub http_status: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl EndpointCheck {
    /// Line recorded in a snapshot's critical errors, `None` when healthy
    pub fn error_line(&self) -> Option<String> {
        if self.status.is_healthy() {
            return None;
        }
        let detail = match (&self.http_status, &self.error) {
            (Some(code), _) => format!("HTTP {}", code),
            (None, Some(err)) => err.clone(),
            (None, None) => "no response".to_string(),
        };
        Some(format!(
            "{} {}: {} ({})",
            self.label, self.url, self.status, detail
        ))
    }
}

/// HTTP client shared by every check of a monitor
#[derive(Debug, Clone)]
pub struct HealthChecker {
    client: reqwest::Client,
}

impl HealthChecker {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("qmops/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| QmopsError::Http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// GET `url` and classify the outcome
    ///
    /// 2xx within `timeout` is healthy, any other response is degraded, and
    /// a timeout or connection failure is critical. Never returns an error.
    pub async fn check_endpoint(&self, label: &str, url: &str, timeout: Duration) -> EndpointCheck {
        let started = Instant::now();
        let checked_at = Utc::now();
        let result = self.client.get(url).timeout(timeout).send().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (status, http_status, error) = match result {
            Ok(response) => {
                let code = response.status();
                let status = if code.is_success() {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Degraded
                };
                (status, Some(code.as_u16()), None)
            }
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("timed out after {}ms", timeout.as_millis())
                } else if e.is_connect() {
                    format!("connection failed: {}", e)
                } else {
                    format!("request failed: {}", e)
                };
                (HealthStatus::Critical, None, Some(reason))
            }
        };

        if status.is_healthy() {
            debug!("{} {} healthy in {}ms", label, url, latency_ms);
        } else {
            warn!("{} {} is {} after {}ms", label, url, status, latency_ms);
        }

        EndpointCheck {
            label: label.to_string(),
            url: url.to_string(),
            status,
            http_status,
            latency_ms,
            error,
            checked_at,
        }
    }
}

/// All checks of one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleChecks {
    pub backend: EndpointCheck,
    pub frontend: EndpointCheck,
    pub critical: Vec<EndpointCheck>,
}

impl CycleChecks {
    /// Whether the surface a role depends on is healthy this cycle
    ///
    /// The API surface is healthy when every critical path is; with no
    /// critical paths configured it follows the backend.
    pub fn surface_healthy(&self, surface: Surface) -> bool {
        match surface {
            Surface::Backend => self.backend.status.is_healthy(),
            Surface::Frontend => self.frontend.status.is_healthy(),
            Surface::Api if self.critical.is_empty() => self.backend.status.is_healthy(),
            Surface::Api => self.critical.iter().all(|c| c.status.is_healthy()),
        }
    }

    pub fn critical_errors(&self) -> Vec<String> {
        std::iter::once(&self.backend)
            .chain(std::iter::once(&self.frontend))
            .chain(self.critical.iter())
            .filter_map(EndpointCheck::error_line)
            .collect()
    }
}

/// Runs the configured checks one after another
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    checker: HealthChecker,
    config: MonitorConfig,
}

impl HealthMonitor {
    pub fn new(config: MonitorConfig) -> Result<Self> {
        Ok(Self {
            checker: HealthChecker::new()?,
            config,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    /// Backend, frontend, then each critical API path, sequentially
    pub async fn run_checks(&self) -> CycleChecks {
        let timeout = self.timeout();
        let backend = self
            .checker
            .check_endpoint("backend", &self.config.backend_url, timeout)
            .await;
        let frontend = self
            .checker
            .check_endpoint("frontend", &self.config.frontend_url, timeout)
            .await;

        let mut critical = Vec::with_capacity(self.config.critical_paths.len());
        for path in &self.config.critical_paths {
            let url = join_url(&self.config.backend_url, path);
            let label = format!("api {}", path);
            critical.push(self.checker.check_endpoint(&label, &url, timeout).await);
        }

        CycleChecks {
            backend,
            frontend,
            critical,
        }
    }
}

/// Join a path onto a base URL with exactly one slash between them
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
