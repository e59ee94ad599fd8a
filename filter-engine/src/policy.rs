//! Threshold policy and allowlist checks.

use crate::settings::Settings;
use webtone_core::{Category, Hit, ScoreVector};

/// Returns the enabled category whose score exceeds its effective threshold
/// by the highest raw score. Ties keep the earlier category in
/// [`Category::ALL`] order.
pub fn evaluate(scores: &ScoreVector, settings: &Settings) -> Option<Hit> {
    let mut best: Option<Hit> = None;

    for category in Category::ALL {
        if !settings.is_category_enabled(category) {
            continue;
        }

        let score = scores.get(category);
        if score <= settings.effective_threshold(category) {
            continue;
        }

        if best.map_or(true, |hit| score > hit.score) {
            best = Some(Hit { category, score });
        }
    }

    best
}

/// True when the author or text is exempt from filtering.
pub fn is_allowlisted(handle: Option<&str>, text: &str, settings: &Settings) -> bool {
    if let Some(handle) = handle.map(str::trim).filter(|h| !h.is_empty()) {
        let handle = handle.to_lowercase();
        if settings
            .allow_handles
            .iter()
            .any(|allowed| !allowed.is_empty() && *allowed == handle)
        {
            return true;
        }
    }

    let text = text.to_lowercase();
    settings
        .allow_keywords
        .iter()
        .any(|keyword| !keyword.is_empty() && text.contains(keyword.as_str()))
}
