//! Playback Controller
//!
//! The Idle/Playing state machine. It asks the scheduler for work whenever
//! playback may start, credits waiting time when a track ends, and decides
//! who may cut a track short.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::clock::{elapsed_whole_secs, Clock};
use crate::room::{NowPlaying, ParticipantId, ParticipantQueues, PlaybackState, SessionRegistry};
use crate::scheduler::FairnessScheduler;
use crate::store::{HistoryStore, StoreError};

/// A track that just ended and what replaced it
#[derive(Debug, Clone, PartialEq)]
pub struct Ended {
    pub finished: NowPlaying,
    pub elapsed_secs: u64,
    /// `None` means playback went idle
    pub next: Option<NowPlaying>,
}

/// Answer to a skip request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipDecision {
    Granted,
    Denied,
    NothingPlaying,
}

pub struct PlaybackController {
    state: PlaybackState,
    scheduler: FairnessScheduler,
    clock: Arc<dyn Clock>,
}

impl PlaybackController {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: PlaybackState::Idle,
            scheduler: FairnessScheduler::new(),
            clock,
        }
    }

    pub fn with_scheduler(mut self, scheduler: FairnessScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn current_item(&self) -> Option<&NowPlaying> {
        self.state.current_item()
    }

    /// Start the next item if nothing is playing and a host can render it.
    ///
    /// Returns the item that started, if any.
    pub fn start_if_idle(
        &mut self,
        registry: &SessionRegistry,
        queues: &mut ParticipantQueues,
        history: &HistoryStore,
        host_attached: bool,
    ) -> Result<Option<NowPlaying>, StoreError> {
        if self.state.is_playing() {
            return Ok(None);
        }
        if !host_attached {
            debug!("No host attached, staying idle");
            return Ok(None);
        }

        let next = self.scheduler.select_next(registry, queues, history)?;
        if let Some(item) = &next {
            self.play(item.clone());
        }
        Ok(next)
    }

    /// End the current track (completion, authorized skip or stall) and
    /// move on to the next one.
    ///
    /// On a store failure the wait credit is taken back and the finished
    /// track stays current, so nothing observable changes.
    pub fn end_current(
        &mut self,
        registry: &mut SessionRegistry,
        queues: &mut ParticipantQueues,
        history: &HistoryStore,
        host_attached: bool,
    ) -> Result<Option<Ended>, StoreError> {
        let PlaybackState::Playing { item: finished, started_at } = std::mem::take(&mut self.state) else {
            return Ok(None);
        };

        let elapsed_secs = elapsed_whole_secs(started_at, self.clock.now());
        let credit = FairnessScheduler::credit_wait(registry, &finished, elapsed_secs);
        info!("Finished {} after {}s", finished.content_id(), elapsed_secs);

        let next = if host_attached {
            match self.scheduler.select_next(registry, queues, history) {
                Ok(next) => next,
                Err(e) => {
                    registry.revert_credit(&credit);
                    self.state = PlaybackState::Playing {
                        item: finished,
                        started_at,
                    };
                    return Err(e);
                }
            }
        } else {
            debug!("No host attached, going idle");
            None
        };

        if let Some(item) = &next {
            self.play(item.clone());
        }

        Ok(Some(Ended {
            finished,
            elapsed_secs,
            next,
        }))
    }

    /// Anyone may skip a history pick; only the owner may skip their own item
    pub fn authorize_skip(&self, requester: Option<&ParticipantId>) -> SkipDecision {
        match self.state.current_item() {
            None => SkipDecision::NothingPlaying,
            Some(item) if item.is_history() => SkipDecision::Granted,
            Some(item) if requester.is_some() && item.owner() == requester => SkipDecision::Granted,
            Some(_) => SkipDecision::Denied,
        }
    }

    /// Whether the current track has been playing for at least `timeout`
    pub fn is_stalled(&self, timeout: Duration) -> bool {
        self.state
            .started_at()
            .is_some_and(|started_at| elapsed_whole_secs(started_at, self.clock.now()) >= timeout.as_secs())
    }

    fn play(&mut self, item: NowPlaying) {
        self.state = PlaybackState::Playing {
            item,
            started_at: self.clock.now(),
        };
    }
}
