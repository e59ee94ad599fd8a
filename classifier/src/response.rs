use serde_json::Value;
use webtone_core::{ClassifierError, ScoreVector};

/// Normalizes a scoring response body.
///
/// Accepts `{"scores": {...}}` or the legacy `{"score": n}` form, which is
/// replicated across every category. Anything else is malformed.
pub fn parse_score_response(endpoint: &str, body: &str) -> Result<ScoreVector, ClassifierError> {
    let malformed = |details: &str| ClassifierError::MalformedResponse {
        endpoint: endpoint.to_string(),
        details: details.to_string(),
    };

    let value: Value = serde_json::from_str(body).map_err(|_| malformed("body is not JSON"))?;

    if let Some(scores) = value.get("scores").filter(|s| !s.is_null()) {
        return scores
            .as_object()
            .map(ScoreVector::from_json_map)
            .ok_or_else(|| malformed("scores is not an object"));
    }

    if let Some(score) = value.get("score").and_then(Value::as_f64) {
        return Ok(ScoreVector::uniform(score));
    }

    Err(malformed("neither scores nor score present"))
}
