//! Upstream request metrics
//!
//! Tracks latency percentiles, success rate and throttling for the
//! upstream API.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum number of samples to keep for metrics calculation
const MAX_SAMPLES: usize = 100;

/// Metrics snapshot for the upstream API
#[derive(Debug, Clone)]
pub struct ProviderMetrics {
    /// Name of the upstream transport
    pub provider_name: String,
    /// 50th percentile latency in milliseconds
    pub latency_p50_ms: f64,
    /// 99th percentile latency in milliseconds
    pub latency_p99_ms: f64,
    /// Success rate over the rolling window (0.0 to 1.0)
    pub success_rate: f64,
    /// Total number of requests tracked
    pub total_requests: u64,
    /// Number of failed requests
    pub failed_requests: u64,
    /// Number of 429 responses encountered
    pub throttled_requests: u64,
    /// Whether any request in the rolling window was throttled
    pub recently_throttled: bool,
}

impl ProviderMetrics {
    /// Creates metrics with no data
    pub fn empty(provider_name: &str) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            latency_p50_ms: 0.0,
            latency_p99_ms: 0.0,
            success_rate: 1.0,
            total_requests: 0,
            failed_requests: 0,
            throttled_requests: 0,
            recently_throttled: false,
        }
    }
}

/// One completed upstream request
#[derive(Debug, Clone)]
struct LatencySample {
    /// Latency of the final attempt in milliseconds
    duration_ms: f64,
    /// Whether the response decoded successfully
    success: bool,
    /// Whether a throttle preceded this request
    throttled: bool,
}

/// Lifetime counters, not bounded by the sample window
#[derive(Debug, Default)]
struct Counters {
    /// Completed requests
    total: u64,
    /// Completed requests that failed
    failed: u64,
    /// 429 responses seen by the rate-limit guard
    throttled: u64,
    /// Throttles seen since the last completed request
    pending_throttles: u64,
}

/// Collects and computes metrics for the upstream API
pub struct MetricsCollector {
    /// Name reported in snapshots
    provider_name: String,
    /// Rolling window of latency samples
    samples: Arc<RwLock<VecDeque<LatencySample>>>,
    /// Lifetime request and throttle counters
    counters: Arc<RwLock<Counters>>,
}

impl MetricsCollector {
    /// Creates a new metrics collector for an upstream transport
    pub fn new(provider_name: &str) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            samples: Arc::new(RwLock::new(VecDeque::with_capacity(MAX_SAMPLES))),
            counters: Arc::new(RwLock::new(Counters::default())),
        }
    }

    /// Records a completed request with its duration and success status
    ///
    /// Any throttles recorded since the previous completion are attributed
    /// to this request.
    pub async fn record_request(&self, duration: Duration, success: bool) {
        let duration_ms = duration.as_secs_f64() * 1000.0;

        let throttled = {
            let mut counters = self.counters.write().await;
            counters.total += 1;
            if !success {
                counters.failed += 1;
            }
            std::mem::take(&mut counters.pending_throttles) > 0
        };

        let mut samples = self.samples.write().await;
        if samples.len() >= MAX_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(LatencySample {
            duration_ms,
            success,
            throttled,
        });
    }

    /// Records a single 429 response
    pub async fn record_throttle(&self) {
        let mut counters = self.counters.write().await;
        counters.throttled += 1;
        counters.pending_throttles += 1;
    }

    /// Computes current metrics from collected samples
    pub async fn get_metrics(&self) -> ProviderMetrics {
        let samples = self.samples.read().await;
        let counters = self.counters.read().await;

        if samples.is_empty() {
            let mut metrics = ProviderMetrics::empty(&self.provider_name);
            metrics.throttled_requests = counters.throttled;
            metrics.recently_throttled = counters.pending_throttles > 0;
            return metrics;
        }

        let mut latencies: Vec<f64> = samples
            .iter()
            .filter(|s| s.success)
            .map(|s| s.duration_ms)
            .collect();

        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let succeeded = samples.iter().filter(|s| s.success).count();

        ProviderMetrics {
            provider_name: self.provider_name.clone(),
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p99_ms: percentile(&latencies, 99.0),
            success_rate: succeeded as f64 / samples.len() as f64,
            total_requests: counters.total,
            failed_requests: counters.failed,
            throttled_requests: counters.throttled,
            recently_throttled: counters.pending_throttles > 0
                || samples.iter().any(|s| s.throttled),
        }
    }
}

/// Calculate percentile from sorted values
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_collector() {
        let collector = MetricsCollector::new("test");

        collector.record_request(Duration::from_millis(100), true).await;
        collector.record_request(Duration::from_millis(200), true).await;
        collector.record_request(Duration::from_millis(150), false).await;

        let metrics = collector.get_metrics().await;

        assert_eq!(metrics.provider_name, "test");
        assert_eq!(metrics.total_requests, 3);
        assert_eq!(metrics.failed_requests, 1);
        assert!(metrics.success_rate > 0.6 && metrics.success_rate < 0.7);
        assert!(!metrics.recently_throttled);
    }

    #[tokio::test]
    async fn test_throttle_attributed_to_next_request() {
        let collector = MetricsCollector::new("test");

        collector.record_throttle().await;
        assert!(collector.get_metrics().await.recently_throttled);

        collector.record_request(Duration::from_millis(10), true).await;
        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.throttled_requests, 1);
        assert!(metrics.recently_throttled);
        assert_eq!(metrics.success_rate, 1.0);
    }

    #[test]
    fn test_percentile() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        assert_eq!(percentile(&values, 50.0), 6.0);
        assert_eq!(percentile(&values, 99.0), 10.0);
    }
}
