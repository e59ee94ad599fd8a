//! Per-post UI state and processed marks.
//!
//! The registry tracks every attached post element: whether it has been
//! processed in the current settings generation, whether a pipeline run is in
//! flight for it, and its hide/blur/reveal state. Bumping the generation clears
//! every processed mark at once.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use webtone_core::{CandidatePost, ElementId, Hit, ScoreVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UiState {
    Unfiltered,
    Hidden,
    Blurred,
    /// Shown after being filtered. Posts revealed from the blurred state
    /// re-blur when they leave the viewport; posts revealed from hidden stay
    /// visible.
    Revealed { reblur_on_exit: bool },
}

impl UiState {
    pub fn is_filtered(&self) -> bool {
        !matches!(self, UiState::Unfiltered)
    }

    pub fn is_concealed(&self) -> bool {
        matches!(self, UiState::Hidden | UiState::Blurred)
    }
}

#[derive(Debug, Clone)]
pub struct PostState {
    pub candidate: CandidatePost,
    pub ui: UiState,
    pub hit: Option<Hit>,
    pub scores: Option<ScoreVector>,
    processed_generation: Option<u64>,
    in_flight_generation: Option<u64>,
    filtered_seq: u64,
}

impl PostState {
    fn new(candidate: CandidatePost) -> Self {
        Self {
            candidate,
            ui: UiState::Unfiltered,
            hit: None,
            scores: None,
            processed_generation: None,
            in_flight_generation: None,
            filtered_seq: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    Untracked,
    AlreadyProcessed,
    InFlight,
    Claimed {
        candidate: CandidatePost,
        generation: u64,
    },
}

#[derive(Debug, Default)]
pub struct PostRegistry {
    posts: HashMap<ElementId, PostState>,
    generation: u64,
    last_filtered: Option<ElementId>,
    next_seq: u64,
}

impl PostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, element: ElementId) -> Option<&PostState> {
        self.posts.get(&element)
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Registers or refreshes an attached element. Returns true for elements
    /// not seen before.
    pub fn observe(&mut self, candidate: CandidatePost) -> bool {
        match self.posts.get_mut(&candidate.element) {
            Some(state) => {
                state.candidate = candidate;
                false
            }
            None => {
                self.posts
                    .insert(candidate.element, PostState::new(candidate));
                true
            }
        }
    }

    pub fn try_claim(&mut self, element: ElementId) -> Claim {
        let generation = self.generation;
        let Some(state) = self.posts.get_mut(&element) else {
            return Claim::Untracked;
        };

        if state.processed_generation == Some(generation) {
            return Claim::AlreadyProcessed;
        }
        if state.in_flight_generation == Some(generation) {
            return Claim::InFlight;
        }

        state.in_flight_generation = Some(generation);
        Claim::Claimed {
            candidate: state.candidate.clone(),
            generation,
        }
    }

    /// Ends a run without marking the post, leaving it eligible for the next
    /// scan.
    pub fn release(&mut self, element: ElementId, generation: u64) {
        if let Some(state) = self.posts.get_mut(&element) {
            if state.in_flight_generation == Some(generation) {
                state.in_flight_generation = None;
            }
        }
    }

    /// Marks the post processed for `generation`. Returns false when the run
    /// is stale (generation moved on or the element detached).
    pub fn mark_processed(&mut self, element: ElementId, generation: u64) -> bool {
        let current = self.generation;
        let Some(state) = self.posts.get_mut(&element) else {
            return false;
        };
        if state.in_flight_generation == Some(generation) {
            state.in_flight_generation = None;
        }
        if generation != current {
            return false;
        }
        state.processed_generation = Some(generation);
        true
    }

    /// Applies a filter decision and makes the post the last filtered one.
    /// Returns the new state, or `None` for stale runs.
    pub fn apply_filter(
        &mut self,
        element: ElementId,
        generation: u64,
        hit: Hit,
        scores: ScoreVector,
        blur: bool,
    ) -> Option<UiState> {
        if !self.mark_processed(element, generation) {
            return None;
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        let state = self.posts.get_mut(&element)?;
        state.ui = if blur { UiState::Blurred } else { UiState::Hidden };
        state.hit = Some(hit);
        state.scores = Some(scores);
        state.filtered_seq = seq;
        self.last_filtered = Some(element);
        Some(state.ui)
    }

    /// "Show anyway". Only filtered, still concealed posts change state.
    pub fn reveal(&mut self, element: ElementId) -> Option<UiState> {
        let state = self.posts.get_mut(&element)?;
        state.ui = match state.ui {
            UiState::Blurred => UiState::Revealed {
                reblur_on_exit: true,
            },
            UiState::Hidden => UiState::Revealed {
                reblur_on_exit: false,
            },
            _ => return None,
        };
        Some(state.ui)
    }

    /// Returns true when the post re-blurred on leaving the viewport.
    pub fn visibility_changed(&mut self, element: ElementId, visible: bool) -> bool {
        let Some(state) = self.posts.get_mut(&element) else {
            return false;
        };
        if !visible
            && state.ui
                == (UiState::Revealed {
                    reblur_on_exit: true,
                })
        {
            state.ui = UiState::Blurred;
            return true;
        }
        false
    }

    /// Reveals the most recently filtered post. When that post is gone or no
    /// longer filtered, falls back to the latest concealed post still
    /// attached.
    pub fn reveal_last(&mut self) -> Option<(ElementId, UiState)> {
        let pointer = self
            .last_filtered
            .filter(|id| self.posts.get(id).is_some_and(|s| s.ui.is_filtered()));

        let target = pointer.or_else(|| {
            self.posts
                .iter()
                .filter(|(_, s)| s.ui.is_concealed())
                .max_by_key(|(_, s)| s.filtered_seq)
                .map(|(id, _)| *id)
        })?;

        let state = self.posts.get_mut(&target)?;
        state.ui = match state.ui {
            UiState::Blurred => UiState::Revealed {
                reblur_on_exit: true,
            },
            UiState::Hidden => UiState::Revealed {
                reblur_on_exit: false,
            },
            revealed => revealed,
        };
        Some((target, state.ui))
    }

    /// Forgets a removed element. Any in-flight run for it becomes stale.
    pub fn detach(&mut self, element: ElementId) -> bool {
        if self.last_filtered == Some(element) {
            self.last_filtered = None;
        }
        self.posts.remove(&element).is_some()
    }

    /// Clears every processed mark and resets filtered posts so the next scan
    /// re-evaluates them. Returns the elements whose effects must be removed.
    pub fn bump_generation(&mut self) -> Vec<ElementId> {
        self.generation += 1;
        self.last_filtered = None;

        let mut cleared: Vec<ElementId> = self
            .posts
            .iter_mut()
            .filter(|(_, s)| s.ui.is_filtered())
            .map(|(id, s)| {
                s.ui = UiState::Unfiltered;
                s.hit = None;
                s.scores = None;
                *id
            })
            .collect();
        cleared.sort();
        cleared
    }

    /// Elements that still need a run in the current generation.
    pub fn pending(&self) -> Vec<ElementId> {
        let generation = self.generation;
        let mut pending: Vec<ElementId> = self
            .posts
            .iter()
            .filter(|(_, s)| s.processed_generation != Some(generation))
            .map(|(id, _)| *id)
            .collect();
        pending.sort();
        pending
    }
}
