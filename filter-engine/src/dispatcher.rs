//! Single-threaded event loop driving pipeline runs cooperatively.
//!
//! Events arrive on an unbounded channel in place of DOM mutation callbacks.
//! Each event becomes a future in one [`FuturesUnordered`] set, so many posts
//! can be waiting on storage or the classifier at once while the steps of any
//! one post stay strictly sequential.

use crate::control::InboundSignal;
use crate::engine::FilterEngine;
use classifier::Classifier;
use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::StorageService;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};
use webtone_core::{CandidatePost, ElementId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Posts appeared in (or were re-rendered into) the page.
    PostsAdded { posts: Vec<CandidatePost> },
    PostRemoved { element: ElementId },
    VisibilityChanged { element: ElementId, visible: bool },
    RevealRequested { element: ElementId },
    NotOffensive { element: ElementId },
    QuietHoursOverride,
    Signal { signal: InboundSignal },
    Scan,
}

pub fn event_channel() -> (UnboundedSender<EngineEvent>, UnboundedReceiver<EngineEvent>) {
    mpsc::unbounded_channel()
}

pub struct Dispatcher<S, C> {
    engine: Arc<FilterEngine<S, C>>,
    events: UnboundedReceiver<EngineEvent>,
    in_flight: FuturesUnordered<LocalBoxFuture<'static, ()>>,
}

impl<S, C> Dispatcher<S, C>
where
    S: StorageService + 'static,
    C: Classifier + 'static,
{
    pub fn new(engine: Arc<FilterEngine<S, C>>, events: UnboundedReceiver<EngineEvent>) -> Self {
        Self {
            engine,
            events,
            in_flight: FuturesUnordered::new(),
        }
    }

    /// Runs until the event channel closes, then drains outstanding work.
    pub async fn run(mut self) {
        self.engine.start().await;
        self.spawn_quiet_hours_check();

        loop {
            let event = tokio::select! {
                event = self.events.recv() => event,
                Some(()) = self.in_flight.next(), if !self.in_flight.is_empty() => continue,
            };

            match event {
                Some(event) => self.dispatch(event).await,
                None => break,
            }
        }

        debug!("Event channel closed, draining {} tasks", self.in_flight.len());
        while self.in_flight.next().await.is_some() {}
        info!("Dispatcher stopped");
    }

    async fn dispatch(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::PostsAdded { posts } => {
                self.spawn_quiet_hours_check();
                for element in self.engine.observe(posts).await {
                    self.spawn(move |engine| async move {
                        engine.process_post(element).await;
                    });
                }
            }
            EngineEvent::PostRemoved { element } => {
                self.engine.detach(element).await;
            }
            EngineEvent::VisibilityChanged { element, visible } => {
                self.engine.visibility_changed(element, visible).await;
            }
            EngineEvent::RevealRequested { element } => {
                self.engine.reveal(element).await;
            }
            EngineEvent::NotOffensive { element } => {
                self.spawn(move |engine| async move {
                    engine.send_not_offensive(element).await;
                });
            }
            EngineEvent::QuietHoursOverride => {
                self.spawn(|engine| async move {
                    engine.override_quiet_hours().await;
                });
            }
            EngineEvent::Signal { signal } => {
                self.spawn(move |engine| async move {
                    engine.handle_signal(signal).await;
                });
            }
            EngineEvent::Scan => {
                self.spawn_quiet_hours_check();
                self.spawn(|engine| async move {
                    engine.scan().await;
                });
            }
        }
    }

    /// Quiet hours can begin while the page is open, so every scan trigger
    /// re-checks; the gate keeps it to one notice.
    fn spawn_quiet_hours_check(&mut self) {
        self.spawn(|engine| async move {
            engine.check_quiet_hours().await;
        });
    }

    fn spawn<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(Arc<FilterEngine<S, C>>) -> Fut,
        Fut: std::future::Future<Output = ()> + 'static,
    {
        self.in_flight.push(task(self.engine.clone()).boxed_local());
    }
}
