use crate::metrics::{CallRecord, ClassifierMetrics, Endpoint, MetricsCollector};
use crate::response::parse_score_response;
use crate::{Classifier, FeedbackPayload, ScoreRequest};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use webtone_core::{ClassifierConfig, ClassifierError, CoreError, ScoreVector};

const CLIENT_HEADER: &str = "X-WebTone-Client";
const ERROR_RING_CAPACITY: usize = 50;
const HEALTH_ERROR_COUNT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub at: DateTime<Utc>,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub ok: bool,
    pub worker: String,
    pub last_errors: Vec<ErrorEntry>,
}

/// HTTP client for the scoring proxy and its feedback endpoint.
#[derive(Debug)]
pub struct ProxyClassifier {
    http_client: Client,
    score_url: String,
    feedback_url: String,
    client_id: String,
    pro_key: Option<String>,
    metrics: Arc<MetricsCollector>,
    errors: Arc<Mutex<VecDeque<ErrorEntry>>>,
}

impl ProxyClassifier {
    pub fn new(config: &ClassifierConfig, client_id: impl Into<String>) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            score_url: config.score_url.clone(),
            feedback_url: config.feedback_url.clone(),
            client_id: client_id.into(),
            pro_key: config.pro_key.clone().filter(|k| !k.is_empty()),
            metrics: Arc::new(MetricsCollector::new()),
            errors: Arc::new(Mutex::new(VecDeque::with_capacity(ERROR_RING_CAPACITY))),
        })
    }

    async fn post_json<T: Serialize>(
        &self,
        endpoint: Endpoint,
        url: &str,
        body: &T,
    ) -> Result<Response, CoreError> {
        let start_time = Instant::now();

        let mut request_builder = self
            .http_client
            .post(url)
            .header(CLIENT_HEADER, &self.client_id)
            .json(body);

        if let Some(key) = &self.pro_key {
            request_builder = request_builder.bearer_auth(key);
        }

        debug!("POST {} ({})", endpoint.as_str(), url);
        let result = match request_builder.send().await {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => {
                let status_code = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                Err(CoreError::Classifier(ClassifierError::HttpStatus {
                    endpoint: endpoint.as_str().to_string(),
                    status_code,
                    body,
                }))
            }
            Err(e) if e.is_timeout() => Err(CoreError::Classifier(
                ClassifierError::RequestTimeout {
                    endpoint: endpoint.as_str().to_string(),
                },
            )),
            Err(e) if e.is_connect() => Err(CoreError::Classifier(
                ClassifierError::ServiceUnavailable {
                    endpoint: endpoint.as_str().to_string(),
                },
            )),
            Err(e) => Err(CoreError::Network(e)),
        };

        self.metrics
            .record(CallRecord {
                endpoint,
                latency: start_time.elapsed(),
                failure: result.as_ref().err().map(error_type),
            })
            .await;

        if let Err(e) = &result {
            self.push_error(e).await;
        }
        result
    }

    async fn push_error(&self, error: &CoreError) {
        let mut errors = self.errors.lock().await;
        errors.push_front(ErrorEntry {
            at: Utc::now(),
            error: error.to_string(),
        });
        errors.truncate(ERROR_RING_CAPACITY);
    }

    pub async fn health(&self) -> HealthReport {
        let errors = self.errors.lock().await;
        HealthReport {
            ok: true,
            worker: "alive".to_string(),
            last_errors: errors.iter().take(HEALTH_ERROR_COUNT).cloned().collect(),
        }
    }

    pub async fn get_metrics(&self) -> ClassifierMetrics {
        self.metrics.snapshot().await
    }
}

impl Classifier for ProxyClassifier {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreVector, CoreError> {
        let response = self.post_json(Endpoint::Score, &self.score_url, request).await?;

        let body = response.text().await.map_err(|e| {
            error!("Failed to read score response: {}", e);
            CoreError::Network(e)
        })?;

        match parse_score_response("score", &body) {
            Ok(scores) => {
                debug!("Scores received: {:?}", scores);
                Ok(scores)
            }
            Err(e) => {
                let error = CoreError::Classifier(e);
                self.push_error(&error).await;
                Err(error)
            }
        }
    }

    async fn send_feedback(&self, feedback: &FeedbackPayload) -> Result<(), CoreError> {
        self.post_json(Endpoint::Feedback, &self.feedback_url, feedback)
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!("Feedback call failed: {}", e);
                e
            })
    }
}

fn error_type(error: &CoreError) -> &'static str {
    match error {
        CoreError::Classifier(ClassifierError::HttpStatus { .. }) => "http_status",
        CoreError::Classifier(ClassifierError::RequestTimeout { .. }) => "timeout",
        CoreError::Classifier(ClassifierError::ServiceUnavailable { .. }) => "unavailable",
        CoreError::Classifier(ClassifierError::MalformedResponse { .. }) => "malformed",
        _ => "network_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use webtone_core::Category;

    /// Serves a single canned HTTP response and hands back the raw request.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            while !request_complete(&request) {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });

        (format!("http://{}", addr), handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= header_end + 4 + content_length
    }

    fn config_for(base: &str, pro_key: Option<&str>) -> ClassifierConfig {
        ClassifierConfig {
            score_url: format!("{}/score", base),
            feedback_url: format!("{}/feedback", base),
            timeout_secs: 5,
            pro_key: pro_key.map(str::to_string),
        }
    }

    fn request() -> ScoreRequest {
        ScoreRequest {
            text: "what a day".to_string(),
            threshold: 0.65,
            language: "en".to_string(),
        }
    }

    #[tokio::test]
    async fn test_score_success_sends_headers_and_body() {
        let (base, server) = serve_once("200 OK", r#"{"scores":{"cynical":0.9}}"#).await;
        let client = ProxyClassifier::new(&config_for(&base, Some("pro-123")), "client-1").unwrap();

        let scores = client.score(&request()).await.unwrap();
        assert_eq!(scores.get(Category::Cynical), 0.9);

        let raw = server.await.unwrap().to_lowercase();
        assert!(raw.starts_with("post /score"));
        assert!(raw.contains("x-webtone-client: client-1"));
        assert!(raw.contains("authorization: bearer pro-123"));
        assert!(raw.contains(r#""lang":"en""#));

        let metrics = client.get_metrics().await;
        assert_eq!(metrics.successful_requests(), 1);
    }

    #[tokio::test]
    async fn test_score_legacy_response() {
        let (base, _server) = serve_once("200 OK", r#"{"score":0.42}"#).await;
        let client = ProxyClassifier::new(&config_for(&base, None), "client-1").unwrap();

        let scores = client.score(&request()).await.unwrap();
        assert_eq!(scores.get(Category::Racism), 0.42);
    }

    #[tokio::test]
    async fn test_non_success_status_is_failure() {
        let (base, _server) = serve_once("503 Service Unavailable", r#"{"error":"busy"}"#).await;
        let client = ProxyClassifier::new(&config_for(&base, None), "client-1").unwrap();

        let result = client.score(&request()).await;
        assert!(matches!(
            result,
            Err(CoreError::Classifier(ClassifierError::HttpStatus {
                status_code: 503,
                ..
            }))
        ));

        let health = client.health().await;
        assert_eq!(health.last_errors.len(), 1);
        assert_eq!(client.get_metrics().await.failed_requests(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_failure() {
        let (base, _server) = serve_once("200 OK", r#"{"verdict":"fine"}"#).await;
        let client = ProxyClassifier::new(&config_for(&base, None), "client-1").unwrap();

        let result = client.score(&request()).await;
        assert!(matches!(
            result,
            Err(CoreError::Classifier(ClassifierError::MalformedResponse { .. }))
        ));
    }

    #[tokio::test]
    async fn test_feedback_ignores_response_body() {
        let (base, server) = serve_once("200 OK", "not json at all").await;
        let client = ProxyClassifier::new(&config_for(&base, None), "client-1").unwrap();

        let payload = FeedbackPayload::not_offensive("https://x.com/a/status/1", ScoreVector::new());
        client.send_feedback(&payload).await.unwrap();

        let raw = server.await.unwrap();
        assert!(raw.contains(r#""kind":"not_offensive""#));
    }

    #[test]
    fn test_unreachable_endpoint_is_failure() {
        let config = config_for("http://127.0.0.1:9", None);
        let client = ProxyClassifier::new(&config, "client-1").unwrap();

        let result = tokio_test::block_on(client.score(&request()));
        assert!(result.is_err());
    }
}
