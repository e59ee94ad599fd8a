//! The per-post decision pipeline and the UI effects it produces.

use crate::cache::ClassificationCache;
use crate::clock::Clock;
use crate::control::{InboundSignal, SettingsController};
use crate::language::detect_language;
use crate::policy::{evaluate, is_allowlisted};
use crate::quiet_hours::{in_quiet_hours, notice_message, QuietHoursGate};
use crate::reveal::{Claim, PostRegistry, UiState};
use crate::settings::{Settings, SettingsService};
use crate::site::{extract_text, PageContext};
use crate::telemetry::{badge_text, DailyCounter, FilterLog};
use classifier::{Classifier, FeedbackPayload, ScoreRequest};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storage::StorageService;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tracing::{debug, info};
use webtone_core::{
    CandidatePost, ElementId, EngineConfig, ErrorExt, FilterRecord, Hit, ScoreVector,
};

/// Instruction for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    Hidden {
        element: ElementId,
        hit: Hit,
    },
    /// Blur with an overlay offering "show anyway" and "not offensive".
    Blurred {
        element: ElementId,
        hit: Hit,
        label: String,
    },
    Revealed {
        element: ElementId,
        scroll_into_view: bool,
    },
    Reblurred {
        element: ElementId,
    },
    /// Remove every filter effect from the element.
    Cleared {
        element: ElementId,
    },
    FeedbackAcknowledged {
        element: ElementId,
    },
    FeedbackAckCleared {
        element: ElementId,
    },
    QuietHoursNotice {
        start_hour: u32,
        end_hour: u32,
        message: String,
    },
    BadgeText {
        text: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Untracked,
    NoText,
    AlreadyProcessed,
    InFlight,
    Disabled,
    Snoozed,
    Allowlisted,
    ClassifierFailed,
    Clean,
    Filtered { hit: Hit },
    /// Finished after settings changed or the element went away.
    Discarded,
}

impl PipelineOutcome {
    /// Outcomes that leave the post eligible for the next scan.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineOutcome::NoText
                | PipelineOutcome::Disabled
                | PipelineOutcome::Snoozed
                | PipelineOutcome::ClassifierFailed
        )
    }
}

pub fn overlay_label(hit: &Hit) -> String {
    format!(
        "Why hidden: {} · {}%",
        hit.category,
        (hit.score * 100.0).trunc() as i64
    )
}

pub struct FilterEngine<S, C> {
    classifier: Arc<C>,
    clock: Arc<dyn Clock>,
    page: PageContext,
    settings: SettingsService<S>,
    cache: ClassificationCache<S>,
    filter_log: FilterLog<S>,
    daily_counter: DailyCounter<S>,
    controller: SettingsController<S>,
    registry: Mutex<PostRegistry>,
    quiet_hours_gate: QuietHoursGate,
    debug_mode: AtomicBool,
    feedback_ack: Duration,
    effects: UnboundedSender<Effect>,
}

impl<S: StorageService, C: Classifier> FilterEngine<S, C> {
    pub fn new(
        storage: Arc<S>,
        classifier: Arc<C>,
        clock: Arc<dyn Clock>,
        page: PageContext,
        config: &EngineConfig,
    ) -> (Self, UnboundedReceiver<Effect>) {
        let (effects, receiver) = mpsc::unbounded_channel();

        let engine = Self {
            classifier,
            page,
            settings: SettingsService::new(storage.clone(), clock.clone(), config.settings_ttl()),
            cache: ClassificationCache::new(storage.clone(), clock.clone(), config.cache_ttl()),
            filter_log: FilterLog::new(storage.clone(), config.filter_log_capacity),
            daily_counter: DailyCounter::new(storage.clone(), clock.clone()),
            controller: SettingsController::new(storage, clock.clone(), config.snooze()),
            clock,
            registry: Mutex::new(PostRegistry::new()),
            quiet_hours_gate: QuietHoursGate::new(),
            debug_mode: AtomicBool::new(false),
            feedback_ack: config.feedback_ack(),
            effects,
        };

        (engine, receiver)
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    pub fn settings(&self) -> &SettingsService<S> {
        &self.settings
    }

    pub fn controller(&self) -> &SettingsController<S> {
        &self.controller
    }

    pub fn filter_log(&self) -> &FilterLog<S> {
        &self.filter_log
    }

    pub fn daily_counter(&self) -> &DailyCounter<S> {
        &self.daily_counter
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug_mode.load(Ordering::Relaxed)
    }

    /// Loads settings and restores the badge. Call once per page.
    pub async fn start(&self) {
        let settings = self.settings.load().await;
        self.sync_debug_mode(&settings);

        match self.daily_counter.prune_to_today().await {
            Ok(count) => self.emit(Effect::BadgeText {
                text: badge_text(count),
            }),
            Err(e) => {
                e.log_warn();
            }
        }
        info!(
            "Filter engine started on {} ({:?})",
            self.page.page_url, self.page.site
        );
    }

    /// Registers posts that appeared or changed. Returns their elements.
    pub async fn observe(&self, posts: Vec<CandidatePost>) -> Vec<ElementId> {
        let mut registry = self.registry.lock().await;
        posts
            .into_iter()
            .map(|post| {
                let element = post.element;
                registry.observe(post);
                element
            })
            .collect()
    }

    /// Runs the pipeline for every post not yet processed in this generation.
    pub async fn scan(&self) -> Vec<PipelineOutcome> {
        let pending = self.registry.lock().await.pending();
        join_all(pending.into_iter().map(|element| self.process_post(element))).await
    }

    pub async fn process_post(&self, element: ElementId) -> PipelineOutcome {
        let claim = self.registry.lock().await.try_claim(element);
        let outcome = match claim {
            Claim::Claimed {
                candidate,
                generation,
            } => self.run_pipeline(&candidate, generation).await,
            Claim::Untracked => PipelineOutcome::Untracked,
            Claim::AlreadyProcessed => PipelineOutcome::AlreadyProcessed,
            Claim::InFlight => PipelineOutcome::InFlight,
        };

        if self.debug_enabled() {
            debug!("Post {} decision: {:?}", element, outcome);
        }
        outcome
    }

    async fn run_pipeline(&self, candidate: &CandidatePost, generation: u64) -> PipelineOutcome {
        let element = candidate.element;

        let Some(text) = extract_text(candidate) else {
            self.release(element, generation).await;
            return PipelineOutcome::NoText;
        };

        let settings = self.settings.cached_or_load().await;
        self.sync_debug_mode(&settings);

        if !settings.enabled {
            self.release(element, generation).await;
            return PipelineOutcome::Disabled;
        }
        if settings.is_snoozed(self.clock.now()) {
            self.release(element, generation).await;
            return PipelineOutcome::Snoozed;
        }

        let handle = self.page.author_handle(candidate);
        if is_allowlisted(handle.as_deref(), text, &settings) {
            return self
                .finish_unfiltered(element, generation, PipelineOutcome::Allowlisted)
                .await;
        }

        let post_id = self.page.status_id(candidate);
        let Some(scores) = self.scores_for(post_id.as_deref(), text, &settings).await else {
            self.release(element, generation).await;
            return PipelineOutcome::ClassifierFailed;
        };

        let Some(hit) = evaluate(&scores, &settings) else {
            return self
                .finish_unfiltered(element, generation, PipelineOutcome::Clean)
                .await;
        };

        let applied = self.registry.lock().await.apply_filter(
            element,
            generation,
            hit,
            scores.clone(),
            settings.blur_mode,
        );
        match applied {
            Some(UiState::Blurred) => self.emit(Effect::Blurred {
                element,
                hit,
                label: overlay_label(&hit),
            }),
            Some(_) => self.emit(Effect::Hidden { element, hit }),
            None => return PipelineOutcome::Discarded,
        }

        self.record_filtered(candidate, post_id, text, scores, hit)
            .await;
        PipelineOutcome::Filtered { hit }
    }

    async fn scores_for(
        &self,
        post_id: Option<&str>,
        text: &str,
        settings: &Settings,
    ) -> Option<ScoreVector> {
        if let Some(scores) = self.cache.get(post_id).await {
            return Some(scores);
        }

        let request = ScoreRequest {
            text: text.to_string(),
            threshold: settings.global_sensitivity,
            language: detect_language(text).to_string(),
        };

        match self.classifier.score(&request).await {
            Ok(scores) => {
                if let Err(e) = self.cache.put(post_id, &scores).await {
                    e.log_warn();
                }
                Some(scores)
            }
            Err(e) => {
                debug!("Scoring skipped ({}): {}", e.error_code(), e);
                None
            }
        }
    }

    async fn finish_unfiltered(
        &self,
        element: ElementId,
        generation: u64,
        outcome: PipelineOutcome,
    ) -> PipelineOutcome {
        if self
            .registry
            .lock()
            .await
            .mark_processed(element, generation)
        {
            outcome
        } else {
            PipelineOutcome::Discarded
        }
    }

    async fn record_filtered(
        &self,
        candidate: &CandidatePost,
        post_id: Option<String>,
        text: &str,
        scores: ScoreVector,
        hit: Hit,
    ) {
        let record = FilterRecord {
            id: post_id,
            text: text.to_string(),
            scores,
            filter_type: hit.category,
            url: self.page.permalink(candidate),
            timestamp: self.clock.now(),
        };
        if let Err(e) = self.filter_log.append(record).await {
            e.log_warn();
        }

        match self.daily_counter.increment().await {
            Ok(count) => self.emit(Effect::BadgeText {
                text: badge_text(count),
            }),
            Err(e) => {
                e.log_warn();
            }
        }
    }

    async fn release(&self, element: ElementId, generation: u64) {
        self.registry.lock().await.release(element, generation);
    }

    /// "Show anyway" on a filtered post.
    pub async fn reveal(&self, element: ElementId) -> bool {
        let revealed = self.registry.lock().await.reveal(element).is_some();
        if revealed {
            self.emit(Effect::Revealed {
                element,
                scroll_into_view: false,
            });
        }
        revealed
    }

    pub async fn reveal_last(&self) -> Option<ElementId> {
        let (element, _) = self.registry.lock().await.reveal_last()?;
        self.emit(Effect::Revealed {
            element,
            scroll_into_view: true,
        });
        Some(element)
    }

    pub async fn visibility_changed(&self, element: ElementId, visible: bool) -> bool {
        let reblurred = self
            .registry
            .lock()
            .await
            .visibility_changed(element, visible);
        if reblurred {
            self.emit(Effect::Reblurred { element });
        }
        reblurred
    }

    pub async fn detach(&self, element: ElementId) -> bool {
        self.registry.lock().await.detach(element)
    }

    pub async fn ui_state(&self, element: ElementId) -> Option<UiState> {
        self.registry.lock().await.get(element).map(|s| s.ui)
    }

    /// Sends "not offensive" feedback for a filtered post. The acknowledgment
    /// is cleared after the configured delay whether or not the call worked.
    pub async fn send_not_offensive(&self, element: ElementId) -> bool {
        let payload = {
            let registry = self.registry.lock().await;
            let Some(state) = registry.get(element).filter(|s| s.ui.is_filtered()) else {
                return false;
            };
            FeedbackPayload::not_offensive(
                self.page.permalink(&state.candidate),
                state.scores.clone().unwrap_or_default(),
            )
        };

        self.emit(Effect::FeedbackAcknowledged { element });
        let (result, _) = tokio::join!(
            self.classifier.send_feedback(&payload),
            tokio::time::sleep(self.feedback_ack)
        );
        if let Err(e) = result {
            debug!("Feedback for {} not delivered: {}", element, e);
        }
        self.emit(Effect::FeedbackAckCleared { element });
        true
    }

    /// Shows the quiet-hours notice if the window is active and it has not
    /// been shown on this page yet.
    pub async fn check_quiet_hours(&self) -> bool {
        let settings = self.settings.cached_or_load().await;
        let quiet_hours = &settings.quiet_hours;

        if !in_quiet_hours(quiet_hours, self.clock.local_hour()) {
            return false;
        }
        if !self.quiet_hours_gate.try_fire() {
            return false;
        }

        self.emit(Effect::QuietHoursNotice {
            start_hour: quiet_hours.start_hour,
            end_hour: quiet_hours.end_hour,
            message: notice_message(quiet_hours),
        });
        true
    }

    /// The notice's override: ends any snooze and re-evaluates every post.
    pub async fn override_quiet_hours(&self) -> Vec<PipelineOutcome> {
        if let Err(e) = self.controller.clear_snooze().await {
            e.log_warn();
        }
        self.reload_and_rescan().await
    }

    pub async fn handle_signal(&self, signal: InboundSignal) -> Vec<PipelineOutcome> {
        debug!("Signal received: {:?}", signal);
        match signal {
            InboundSignal::RevealLastRequested => {
                self.reveal_last().await;
                Vec::new()
            }
            InboundSignal::DebugModeChanged { enabled } => {
                self.debug_mode.store(enabled, Ordering::Relaxed);
                self.settings.invalidate().await;
                Vec::new()
            }
            _ => self.reload_and_rescan().await,
        }
    }

    async fn reload_and_rescan(&self) -> Vec<PipelineOutcome> {
        self.settings.invalidate().await;
        let settings = self.settings.load().await;
        self.sync_debug_mode(&settings);

        let cleared = self.registry.lock().await.bump_generation();
        for element in cleared {
            self.emit(Effect::Cleared { element });
        }
        self.scan().await
    }

    fn sync_debug_mode(&self, settings: &Settings) {
        self.debug_mode.store(settings.debug_mode, Ordering::Relaxed);
    }

    fn emit(&self, effect: Effect) {
        if self.effects.send(effect).is_err() {
            debug!("Effect receiver closed");
        }
    }
}
