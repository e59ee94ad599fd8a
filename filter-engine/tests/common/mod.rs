#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use classifier::{Classifier, FeedbackPayload, ScoreRequest};
use filter_engine::{Effect, FilterEngine, ManualClock, PageContext};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use storage::MemoryStorage;
use tokio::sync::mpsc::UnboundedReceiver;
use webtone_core::{
    CandidatePost, ClassifierError, CoreError, ElementId, EngineConfig, ScoreVector,
};

pub const X_HOME: &str = "https://x.com/home";
pub const REDDIT_HOME: &str = "https://www.reddit.com/r/rust";

/// Classifier double that answers from a text -> scores script and counts
/// every call. Unscripted text scores zero; texts in `failing` error out.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    scripted: Mutex<HashMap<String, ScoreVector>>,
    failing: Mutex<Vec<String>>,
    requests: Mutex<Vec<ScoreRequest>>,
    feedback: Mutex<Vec<FeedbackPayload>>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn script(&self, text: &str, scores: ScoreVector) {
        self.scripted
            .lock()
            .unwrap()
            .insert(text.to_string(), scores);
    }

    pub fn fail_on(&self, text: &str) {
        self.failing.lock().unwrap().push(text.to_string());
    }

    pub fn recover(&self, text: &str) {
        self.failing.lock().unwrap().retain(|t| t != text);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ScoreRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn feedback(&self) -> Vec<FeedbackPayload> {
        self.feedback.lock().unwrap().clone()
    }
}

impl Classifier for ScriptedClassifier {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreVector, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        // Suspend like a real network call would.
        tokio::task::yield_now().await;

        if self.failing.lock().unwrap().contains(&request.text) {
            return Err(ClassifierError::ServiceUnavailable {
                endpoint: "score".to_string(),
            }
            .into());
        }
        Ok(self
            .scripted
            .lock()
            .unwrap()
            .get(&request.text)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_feedback(&self, feedback: &FeedbackPayload) -> Result<(), CoreError> {
        self.feedback.lock().unwrap().push(feedback.clone());
        Ok(())
    }
}

pub struct Harness {
    pub engine: Arc<FilterEngine<MemoryStorage, ScriptedClassifier>>,
    pub effects: UnboundedReceiver<Effect>,
    pub storage: MemoryStorage,
    pub classifier: Arc<ScriptedClassifier>,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new(page_url: &str) -> Self {
        Self::with_storage(page_url, MemoryStorage::new())
    }

    pub fn with_storage(page_url: &str, storage: MemoryStorage) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("filter_engine=debug")
            .with_test_writer()
            .try_init();

        let clock = ManualClock::at(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        let classifier = Arc::new(ScriptedClassifier::default());
        let config = EngineConfig {
            feedback_ack_ms: 10,
            ..EngineConfig::default()
        };

        let (engine, effects) = FilterEngine::new(
            Arc::new(storage.clone()),
            classifier.clone(),
            Arc::new(clock.clone()),
            PageContext::new(page_url),
            &config,
        );

        Self {
            engine: Arc::new(engine),
            effects,
            storage,
            classifier,
            clock,
        }
    }

    /// Everything emitted since the last drain.
    pub fn drain(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        while let Ok(effect) = self.effects.try_recv() {
            effects.push(effect);
        }
        effects
    }
}

pub fn tweet(n: u64, text: &str) -> CandidatePost {
    CandidatePost {
        element: ElementId(n),
        text: Some(text.to_string()),
        status_href: Some(format!("https://x.com/someone/status/{}", 1000 + n)),
        author_href: Some("/someone".to_string()),
    }
}

pub fn tweet_by(n: u64, author: &str, text: &str) -> CandidatePost {
    CandidatePost {
        author_href: Some(format!("/{}", author)),
        ..tweet(n, text)
    }
}
