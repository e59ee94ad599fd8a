//! Client-side decision engine for WebTone.
//!
//! Candidate posts flow through [`FilterEngine::process_post`]: text
//! extraction, allowlist, classification cache, remote scoring, threshold
//! policy, then the hide/blur effect and telemetry. [`Dispatcher`] feeds the
//! engine from an event channel.

pub mod cache;
pub mod clock;
pub mod control;
pub mod dispatcher;
pub mod engine;
pub mod language;
pub mod policy;
pub mod quiet_hours;
pub mod reveal;
pub mod settings;
pub mod site;
pub mod telemetry;

pub use cache::{CacheEntry, ClassificationCache, CACHE_KEY};
pub use clock::{Clock, ManualClock, SystemClock};
pub use control::{InboundSignal, SettingsController};
pub use dispatcher::{event_channel, Dispatcher, EngineEvent};
pub use engine::{overlay_label, Effect, FilterEngine, PipelineOutcome};
pub use language::detect_language;
pub use policy::{evaluate, is_allowlisted};
pub use quiet_hours::{in_quiet_hours, in_window, QuietHoursGate};
pub use reveal::{Claim, PostRegistry, PostState, UiState};
pub use settings::{QuietHours, Settings, SettingsService};
pub use site::{extract_text, PageContext, SiteFamily};
pub use telemetry::{
    badge_text, day_key, summarize, DailyCounter, FilterLog, FilterSummary, DAILY_COUNTER_KEY,
    FILTER_LOG_KEY,
};
