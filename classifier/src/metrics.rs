//! Call counters for the two proxy endpoints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Score,
    Feedback,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Endpoint::Score => "score",
            Endpoint::Feedback => "feedback",
        }
    }
}

/// One finished proxy call. `failure` names the error kind when it failed.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub endpoint: Endpoint,
    pub latency: Duration,
    pub failure: Option<&'static str>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointStats {
    pub calls: u64,
    pub failures: u64,
    pub total_latency: Duration,
    pub failures_by_kind: BTreeMap<String, u64>,
}

impl EndpointStats {
    fn record(&mut self, call: &CallRecord) {
        self.calls += 1;
        self.total_latency += call.latency;
        if let Some(kind) = call.failure {
            self.failures += 1;
            *self.failures_by_kind.entry(kind.to_string()).or_default() += 1;
        }
    }

    pub fn mean_latency(&self) -> Duration {
        match u32::try_from(self.calls) {
            Ok(0) => Duration::ZERO,
            Ok(calls) => self.total_latency / calls,
            Err(_) => Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierMetrics {
    pub score: EndpointStats,
    pub feedback: EndpointStats,
}

impl ClassifierMetrics {
    pub fn endpoint(&self, endpoint: Endpoint) -> &EndpointStats {
        match endpoint {
            Endpoint::Score => &self.score,
            Endpoint::Feedback => &self.feedback,
        }
    }

    pub fn successful_requests(&self) -> u64 {
        self.score.calls + self.feedback.calls - self.failed_requests()
    }

    pub fn failed_requests(&self) -> u64 {
        self.score.failures + self.feedback.failures
    }
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: RwLock<ClassifierMetrics>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, call: CallRecord) {
        let mut metrics = self.metrics.write().await;
        match call.endpoint {
            Endpoint::Score => metrics.score.record(&call),
            Endpoint::Feedback => metrics.feedback.record(&call),
        }
    }

    pub async fn snapshot(&self) -> ClassifierMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn reset(&self) {
        *self.metrics.write().await = ClassifierMetrics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(endpoint: Endpoint, latency_ms: u64, failure: Option<&'static str>) -> CallRecord {
        CallRecord {
            endpoint,
            latency: Duration::from_millis(latency_ms),
            failure,
        }
    }

    #[tokio::test]
    async fn test_counts_split_by_endpoint() {
        let collector = MetricsCollector::new();
        collector.record(call(Endpoint::Score, 150, None)).await;
        collector.record(call(Endpoint::Score, 50, Some("timeout"))).await;
        collector.record(call(Endpoint::Feedback, 20, None)).await;

        let metrics = collector.snapshot().await;
        assert_eq!(metrics.successful_requests(), 2);
        assert_eq!(metrics.failed_requests(), 1);
        assert_eq!(metrics.score.mean_latency(), Duration::from_millis(100));
        assert_eq!(metrics.score.failures_by_kind.get("timeout"), Some(&1));
        assert_eq!(metrics.endpoint(Endpoint::Feedback).calls, 1);
    }

    #[tokio::test]
    async fn test_reset() {
        let collector = MetricsCollector::new();
        collector.record(call(Endpoint::Feedback, 10, Some("http_status"))).await;
        collector.reset().await;

        let metrics = collector.snapshot().await;
        assert_eq!(metrics.failed_requests(), 0);
        assert_eq!(metrics.feedback.mean_latency(), Duration::ZERO);
    }
}
