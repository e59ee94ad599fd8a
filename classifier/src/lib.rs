use serde::{Deserialize, Serialize};
use webtone_core::{CoreError, ScoreVector};

pub mod metrics;
pub mod proxy;
pub mod response;

pub use metrics::{CallRecord, ClassifierMetrics, Endpoint, EndpointStats, MetricsCollector};
pub use proxy::{ErrorEntry, HealthReport, ProxyClassifier};
pub use response::parse_score_response;

/// Body of a scoring call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub text: String,
    pub threshold: f64,
    #[serde(rename = "lang")]
    pub language: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    NotOffensive,
}

/// Body of a feedback call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackPayload {
    pub kind: FeedbackKind,
    pub url: String,
    pub scores: ScoreVector,
}

impl FeedbackPayload {
    pub fn not_offensive(url: impl Into<String>, scores: ScoreVector) -> Self {
        Self {
            kind: FeedbackKind::NotOffensive,
            url: url.into(),
            scores,
        }
    }
}

/// The remote classification service. Any error means the post could not be
/// scored this time around.
pub trait Classifier {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreVector, CoreError>;

    /// Fire-and-forget from the caller's point of view; the response body is
    /// never inspected.
    async fn send_feedback(&self, feedback: &FeedbackPayload) -> Result<(), CoreError>;
}
