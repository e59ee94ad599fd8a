use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Content-risk label scored independently by the classifier.
///
/// The set is closed: names outside it are ignored wherever they appear in
/// persisted settings or classifier responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Cynical,
    Sarcastic,
    Threatening,
    Politics,
    Racism,
}

impl Category {
    /// Fixed iteration order used by policy evaluation.
    pub const ALL: [Category; 5] = [
        Category::Cynical,
        Category::Sarcastic,
        Category::Threatening,
        Category::Politics,
        Category::Racism,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cynical => "cynical",
            Category::Sarcastic => "sarcastic",
            Category::Threatening => "threatening",
            Category::Politics => "politics",
            Category::Racism => "racism",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-category scores for one piece of content. Missing categories read as 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Value>", into = "BTreeMap<String, f64>")]
pub struct ScoreVector {
    scores: BTreeMap<Category, f64>,
}

impl ScoreVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Legacy single-score responses are spread across every category.
    pub fn uniform(score: f64) -> Self {
        let mut vector = Self::new();
        for category in Category::ALL {
            vector.set(category, score);
        }
        vector
    }

    pub fn with(mut self, category: Category, score: f64) -> Self {
        self.set(category, score);
        self
    }

    pub fn set(&mut self, category: Category, score: f64) {
        if score.is_finite() {
            self.scores.insert(category, score);
        }
    }

    pub fn get(&self, category: Category) -> f64 {
        self.scores.get(&category).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        self.scores.iter().map(|(c, s)| (*c, *s))
    }

    /// Builds a vector from a loosely typed JSON object, skipping unknown
    /// categories and non-numeric values.
    pub fn from_json_map(map: &serde_json::Map<String, Value>) -> Self {
        Self::from_entries(map.iter().map(|(k, v)| (k.as_str(), v)))
    }

    fn from_entries<'a>(entries: impl Iterator<Item = (&'a str, &'a Value)>) -> Self {
        let mut vector = Self::new();
        for (name, value) in entries {
            if let (Some(category), Some(score)) = (Category::parse(name), value.as_f64()) {
                vector.set(category, score);
            }
        }
        vector
    }
}

impl From<BTreeMap<String, Value>> for ScoreVector {
    fn from(raw: BTreeMap<String, Value>) -> Self {
        Self::from_entries(raw.iter().map(|(k, v)| (k.as_str(), v)))
    }
}

impl From<ScoreVector> for BTreeMap<String, f64> {
    fn from(vector: ScoreVector) -> Self {
        vector
            .scores
            .into_iter()
            .map(|(c, s)| (c.as_str().to_string(), s))
            .collect()
    }
}

/// Opaque handle the host assigns to a rendered post element.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A post element as observed in the page, with the raw pieces the host
/// extracted from it. Site adapters turn the hrefs into ids and handles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidatePost {
    pub element: ElementId,
    #[serde(default)]
    pub text: Option<String>,
    /// First `/status/` link inside the post, if any.
    #[serde(default)]
    pub status_href: Option<String>,
    /// First root-relative profile link inside the post, if any.
    #[serde(default)]
    pub author_href: Option<String>,
}

/// The category that triggered suppression and its raw score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub category: Category,
    pub score: f64,
}

/// Telemetry entry for one filtered post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    pub scores: ScoreVector,
    #[serde(rename = "filterType")]
    pub filter_type: Category,
    pub url: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}
