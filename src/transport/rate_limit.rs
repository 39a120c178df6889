//! Transparent retry on upstream throttling

use crate::{
    clock::{Clock, TokioClock},
    config::RateLimitConfig,
    error::TransportError,
    metrics::MetricsCollector,
    transport::{ApiRequest, RawResponse, Transport},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Transport wrapper that sits out HTTP 429 responses
///
/// On a throttle the calling task sleeps for the configured cool-down and
/// then re-issues the identical request. Only the calling task is
/// suspended; other requests keep flowing. Every other error is returned
/// unchanged on the first attempt.
///
/// Retries are unbounded unless `max_retries` is set, in which case the
/// guard gives up with [`TransportError::RateLimited`].
pub struct RateLimitGuard {
    inner: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RateLimitGuard {
    /// Creates a guard that sleeps on tokio time
    pub fn new(inner: Arc<dyn Transport>, config: RateLimitConfig) -> Self {
        Self::with_clock(inner, config, Arc::new(TokioClock))
    }

    /// Creates a guard that waits on the given clock
    pub fn with_clock(
        inner: Arc<dyn Transport>,
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner,
            clock,
            config,
            metrics: None,
        }
    }

    /// Reports every throttle to `metrics`
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait]
impl Transport for RateLimitGuard {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        let mut throttled: u32 = 0;

        loop {
            match self.inner.send(request).await {
                Err(err) if err.is_rate_limit() => {
                    throttled += 1;

                    if let Some(metrics) = &self.metrics {
                        metrics.record_throttle().await;
                    }

                    if let Some(max) = self.config.max_retries {
                        if throttled > max {
                            tracing::warn!(
                                endpoint = %request.endpoint,
                                attempts = throttled,
                                "Rate limit persisted, giving up"
                            );
                            return Err(TransportError::RateLimited { attempts: throttled });
                        }
                    }

                    tracing::warn!(
                        endpoint = %request.endpoint,
                        attempt = throttled,
                        cooldown_secs = self.config.cooldown.as_secs(),
                        "Rate limit reached, retrying after cool-down"
                    );
                    self.clock.sleep(self.config.cooldown).await;
                }
                other => return other,
            }
        }
    }

    fn transport_name(&self) -> &'static str {
        self.inner.transport_name()
    }
}
