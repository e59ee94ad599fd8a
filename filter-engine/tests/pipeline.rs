mod common;

use chrono::Duration;
use common::{tweet, tweet_by, Harness, REDDIT_HOME, X_HOME};
use filter_engine::settings::keys;
use filter_engine::{Effect, InboundSignal, PipelineOutcome, UiState};
use serde_json::json;
use std::collections::BTreeMap;
use storage::{MemoryStorage, StorageService};
use webtone_core::{Category, ElementId, Hit, ScoreVector};

fn cynical(score: f64) -> ScoreVector {
    ScoreVector::new()
        .with(Category::Cynical, score)
        .with(Category::Politics, 0.5)
}

fn hit(score: f64) -> Hit {
    Hit {
        category: Category::Cynical,
        score,
    }
}

#[tokio::test]
async fn test_filtered_post_is_hidden_and_logged() {
    let mut h = Harness::new(X_HOME);
    h.classifier.script("what a scam", cynical(0.8));

    h.engine.observe(vec![tweet(1, "what a scam")]).await;
    let outcome = h.engine.process_post(ElementId(1)).await;

    assert_eq!(outcome, PipelineOutcome::Filtered { hit: hit(0.8) });
    assert_eq!(
        h.drain(),
        vec![
            Effect::Hidden {
                element: ElementId(1),
                hit: hit(0.8)
            },
            Effect::BadgeText {
                text: "1".to_string()
            },
        ]
    );

    let records = h.engine.filter_log().records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id.as_deref(), Some("1001"));
    assert_eq!(records[0].filter_type, Category::Cynical);
    assert_eq!(records[0].url, "https://x.com/someone/status/1001");
    assert_eq!(h.engine.daily_counter().today().await.unwrap(), 1);

    let request = &h.classifier.requests()[0];
    assert_eq!(request.threshold, 0.65);
    assert_eq!(request.language, "en");
}

#[tokio::test]
async fn test_blur_mode_applies_overlay() {
    let storage = MemoryStorage::new();
    storage.set_one(keys::BLUR_MODE, json!(true)).await.unwrap();
    let mut h = Harness::with_storage(X_HOME, storage);
    h.classifier.script("ugh", cynical(0.91));

    h.engine.observe(vec![tweet(1, "ugh")]).await;
    h.engine.process_post(ElementId(1)).await;

    assert_eq!(
        h.drain()[0],
        Effect::Blurred {
            element: ElementId(1),
            hit: hit(0.91),
            label: "Why hidden: cynical · 91%".to_string(),
        }
    );
    assert_eq!(h.engine.ui_state(ElementId(1)).await, Some(UiState::Blurred));
}

#[tokio::test]
async fn test_clean_post_runs_once() {
    let mut h = Harness::new(X_HOME);
    h.classifier.script("nice weather", cynical(0.2));

    h.engine.observe(vec![tweet(1, "nice weather")]).await;
    assert_eq!(h.engine.process_post(ElementId(1)).await, PipelineOutcome::Clean);
    assert_eq!(
        h.engine.process_post(ElementId(1)).await,
        PipelineOutcome::AlreadyProcessed
    );
    assert!(h.engine.scan().await.is_empty());

    assert_eq!(h.classifier.calls(), 1);
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn test_posts_without_text_are_left_alone() {
    let h = Harness::new(X_HOME);
    h.engine.observe(vec![tweet(1, "   ")]).await;

    assert_eq!(h.engine.process_post(ElementId(1)).await, PipelineOutcome::NoText);
    assert_eq!(h.engine.process_post(ElementId(9)).await, PipelineOutcome::Untracked);
    assert_eq!(h.classifier.calls(), 0);
}

#[tokio::test]
async fn test_concurrent_runs_classify_once() {
    let h = Harness::new(X_HOME);
    h.classifier.script("hmm", cynical(0.9));
    h.engine.observe(vec![tweet(1, "hmm")]).await;

    let (first, second) = tokio::join!(
        h.engine.process_post(ElementId(1)),
        h.engine.process_post(ElementId(1))
    );

    assert_eq!(first, PipelineOutcome::Filtered { hit: hit(0.9) });
    assert_eq!(second, PipelineOutcome::InFlight);
    assert_eq!(h.classifier.calls(), 1);
}

#[tokio::test]
async fn test_allowlisted_posts_never_reach_classifier() {
    let storage = MemoryStorage::new();
    storage
        .set_one(keys::ALLOW_HANDLES, json!(["Friend"]))
        .await
        .unwrap();
    storage
        .set_one(keys::ALLOW_KEYWORDS, json!(["  Kittens "]))
        .await
        .unwrap();
    let h = Harness::with_storage(X_HOME, storage);
    h.classifier.script("rude", cynical(0.99));
    h.classifier.script("rude about KITTENS", cynical(0.99));

    h.engine
        .observe(vec![
            tweet_by(1, "friend", "rude"),
            tweet(2, "rude about KITTENS"),
        ])
        .await;

    assert_eq!(h.engine.process_post(ElementId(1)).await, PipelineOutcome::Allowlisted);
    assert_eq!(h.engine.process_post(ElementId(2)).await, PipelineOutcome::Allowlisted);
    assert_eq!(
        h.engine.process_post(ElementId(1)).await,
        PipelineOutcome::AlreadyProcessed
    );
    assert_eq!(h.classifier.calls(), 0);
}

#[tokio::test]
async fn test_handles_are_ignored_off_x() {
    let storage = MemoryStorage::new();
    storage
        .set_one(keys::ALLOW_HANDLES, json!(["friend"]))
        .await
        .unwrap();
    let h = Harness::with_storage(REDDIT_HOME, storage);
    h.classifier.script("rude", cynical(0.99));

    h.engine.observe(vec![tweet_by(1, "friend", "rude")]).await;
    assert_eq!(
        h.engine.process_post(ElementId(1)).await,
        PipelineOutcome::Filtered { hit: hit(0.99) }
    );
}

#[tokio::test]
async fn test_disabled_posts_retry_after_enable() {
    let storage = MemoryStorage::new();
    storage.set_one(keys::IS_ENABLED, json!(false)).await.unwrap();
    let h = Harness::with_storage(X_HOME, storage);
    h.classifier.script("bad take", cynical(0.8));

    h.engine.observe(vec![tweet(1, "bad take")]).await;
    assert_eq!(h.engine.process_post(ElementId(1)).await, PipelineOutcome::Disabled);
    assert_eq!(h.engine.process_post(ElementId(1)).await, PipelineOutcome::Disabled);
    assert_eq!(h.classifier.calls(), 0);

    let signal = h.engine.controller().set_enabled(true).await.unwrap();
    let outcomes = h.engine.handle_signal(signal).await;
    assert_eq!(outcomes, vec![PipelineOutcome::Filtered { hit: hit(0.8) }]);
}

#[tokio::test]
async fn test_snoozed_posts_retry_after_snooze_ends() {
    let h = Harness::new(X_HOME);
    h.classifier.script("meh", cynical(0.8));
    h.engine.observe(vec![tweet(1, "meh")]).await;

    let signal = h.engine.controller().snooze_for(None).await.unwrap();
    assert_eq!(
        h.engine.handle_signal(signal).await,
        vec![PipelineOutcome::Snoozed]
    );

    h.clock.advance(Duration::minutes(11));
    assert_eq!(
        h.engine.scan().await,
        vec![PipelineOutcome::Filtered { hit: hit(0.8) }]
    );
}

#[tokio::test]
async fn test_classifier_failure_is_retried_on_next_scan() {
    let h = Harness::new(X_HOME);
    h.classifier.script("flaky", cynical(0.7));
    h.classifier.fail_on("flaky");
    h.engine.observe(vec![tweet(1, "flaky")]).await;

    assert_eq!(
        h.engine.process_post(ElementId(1)).await,
        PipelineOutcome::ClassifierFailed
    );
    assert_eq!(h.engine.ui_state(ElementId(1)).await, Some(UiState::Unfiltered));

    h.classifier.recover("flaky");
    assert_eq!(
        h.engine.scan().await,
        vec![PipelineOutcome::Filtered { hit: hit(0.7) }]
    );
    assert_eq!(h.classifier.calls(), 2);
}

#[tokio::test]
async fn test_cache_shared_by_status_id_on_x() {
    let h = Harness::new(X_HOME);
    h.classifier.script("same tweet", cynical(0.3));

    let mut copy = tweet(2, "same tweet");
    copy.status_href = tweet(1, "").status_href;
    h.engine.observe(vec![tweet(1, "same tweet"), copy]).await;

    h.engine.process_post(ElementId(1)).await;
    h.engine.process_post(ElementId(2)).await;
    assert_eq!(h.classifier.calls(), 1);
}

#[tokio::test]
async fn test_no_cache_off_x() {
    let h = Harness::new(REDDIT_HOME);
    h.classifier.script("same post", cynical(0.3));

    let mut copy = tweet(2, "same post");
    copy.status_href = tweet(1, "").status_href;
    h.engine.observe(vec![tweet(1, "same post"), copy]).await;

    h.engine.process_post(ElementId(1)).await;
    h.engine.process_post(ElementId(2)).await;
    assert_eq!(h.classifier.calls(), 2);
}

#[tokio::test]
async fn test_cache_hit_survives_settings_change() {
    let h = Harness::new(X_HOME);
    h.classifier.script("edgy", cynical(0.6));
    h.engine.observe(vec![tweet(1, "edgy")]).await;

    assert_eq!(h.engine.process_post(ElementId(1)).await, PipelineOutcome::Clean);

    let signal = h
        .engine
        .controller()
        .set_category_thresholds(&BTreeMap::from([(Category::Cynical, 0.5)]))
        .await
        .unwrap();
    assert_eq!(
        h.engine.handle_signal(signal).await,
        vec![PipelineOutcome::Filtered { hit: hit(0.6) }]
    );
    assert_eq!(h.classifier.calls(), 1);
}

#[tokio::test]
async fn test_settings_change_clears_effects_and_reruns() {
    let mut h = Harness::new(X_HOME);
    h.classifier.script("politics again", cynical(0.8));
    h.engine.observe(vec![tweet(1, "politics again")]).await;
    h.engine.process_post(ElementId(1)).await;
    h.drain();

    let mut filters = BTreeMap::new();
    filters.insert(Category::Cynical, false);
    filters.insert(Category::Politics, true);
    let signal = h
        .engine
        .controller()
        .set_filter_settings(&filters)
        .await
        .unwrap();

    assert_eq!(h.engine.handle_signal(signal).await, vec![PipelineOutcome::Clean]);
    assert_eq!(
        h.drain(),
        vec![Effect::Cleared {
            element: ElementId(1)
        }]
    );
    assert_eq!(h.engine.ui_state(ElementId(1)).await, Some(UiState::Unfiltered));
}

#[tokio::test]
async fn test_reveal_and_reblur() {
    let storage = MemoryStorage::new();
    storage.set_one(keys::BLUR_MODE, json!(true)).await.unwrap();
    let mut h = Harness::with_storage(X_HOME, storage);
    h.classifier.script("spicy", cynical(0.9));
    h.engine.observe(vec![tweet(1, "spicy")]).await;
    h.engine.process_post(ElementId(1)).await;
    h.drain();

    assert!(h.engine.reveal(ElementId(1)).await);
    assert!(!h.engine.visibility_changed(ElementId(1), true).await);
    assert!(h.engine.visibility_changed(ElementId(1), false).await);

    assert_eq!(
        h.drain(),
        vec![
            Effect::Revealed {
                element: ElementId(1),
                scroll_into_view: false
            },
            Effect::Reblurred {
                element: ElementId(1)
            },
        ]
    );
}

#[tokio::test]
async fn test_reveal_last_falls_back_after_detach() {
    let mut h = Harness::new(X_HOME);
    h.classifier.script("one", cynical(0.9));
    h.classifier.script("two", cynical(0.9));
    h.engine.observe(vec![tweet(1, "one"), tweet(2, "two")]).await;
    h.engine.process_post(ElementId(1)).await;
    h.engine.process_post(ElementId(2)).await;
    h.drain();

    assert!(h.engine.detach(ElementId(2)).await);
    h.engine.handle_signal(InboundSignal::RevealLastRequested).await;

    assert_eq!(
        h.drain(),
        vec![Effect::Revealed {
            element: ElementId(1),
            scroll_into_view: true
        }]
    );
    assert_eq!(
        h.engine.ui_state(ElementId(1)).await,
        Some(UiState::Revealed {
            reblur_on_exit: false
        })
    );
}

#[tokio::test]
async fn test_not_offensive_feedback() {
    let mut h = Harness::new(X_HOME);
    h.classifier.script("oops", cynical(0.9));
    h.engine.observe(vec![tweet(1, "oops"), tweet(2, "fine")]).await;
    h.engine.scan().await;
    h.drain();

    assert!(!h.engine.send_not_offensive(ElementId(2)).await);
    assert!(h.engine.send_not_offensive(ElementId(1)).await);

    let feedback = h.classifier.feedback();
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].url, "https://x.com/someone/status/1001");
    assert_eq!(feedback[0].scores, cynical(0.9));

    assert_eq!(
        h.drain(),
        vec![
            Effect::FeedbackAcknowledged {
                element: ElementId(1)
            },
            Effect::FeedbackAckCleared {
                element: ElementId(1)
            },
        ]
    );
    assert!(h.engine.ui_state(ElementId(1)).await.unwrap().is_filtered());
}

#[tokio::test]
async fn test_debug_mode_signal() {
    let h = Harness::new(X_HOME);
    assert!(!h.engine.debug_enabled());

    let signal = h.engine.controller().set_debug_mode(true).await.unwrap();
    assert!(h.engine.handle_signal(signal).await.is_empty());
    assert!(h.engine.debug_enabled());
}
