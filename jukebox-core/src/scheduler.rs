//! Fairness Scheduler
//!
//! Picks whose item plays next. Participants who have waited longest go
//! first, ties go to whoever registered first, and each participant's own
//! items play in submission order. With every queue empty a random entry
//! from play history is replayed instead.
//!
//! Waiting is credited at the end of each track: everyone except the owner
//! of the finished item gains its elapsed seconds. The owner's counter is
//! neither reset nor increased, so others overtake them once their credit
//! exceeds the owner's existing total.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::room::{
    HistoryPick, ItemId, NowPlaying, Participant, ParticipantQueues, SessionRegistry, WaitCredit,
};
use crate::store::{HistoryStore, StoreError};

pub struct FairnessScheduler {
    rng: StdRng,
}

impl Default for FairnessScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FairnessScheduler {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Scheduler with reproducible history picks
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Participants with pending items, in the order they would be served
    pub fn rank<'a>(registry: &'a SessionRegistry, queues: &ParticipantQueues) -> Vec<&'a Participant> {
        let mut candidates: Vec<&Participant> = registry
            .participants_in_registration_order()
            .into_iter()
            .filter(|p| queues.has_pending(&p.identity))
            .collect();

        candidates.sort_by(|a, b| {
            b.wait_seconds
                .cmp(&a.wait_seconds)
                .then_with(|| a.registration_order().cmp(&b.registration_order()))
        });
        candidates
    }

    /// Choose and dequeue the next item, falling back to history.
    ///
    /// The pick is written to history before anything is dequeued, so a
    /// store failure leaves the queues exactly as they were.
    pub fn select_next(
        &mut self,
        registry: &SessionRegistry,
        queues: &mut ParticipantQueues,
        history: &HistoryStore,
    ) -> Result<Option<NowPlaying>, StoreError> {
        log_wait_table(registry, queues);

        let next = Self::rank(registry, queues)
            .first()
            .and_then(|p| queues.head(&p.identity))
            .cloned();

        if let Some(item) = next {
            history.record(&item.content_id, item.history_name())?;
            queues.pop_front(&item.owner);
            info!("Selected {} from {}", item.content_id, item.owner);
            return Ok(Some(NowPlaying::Queued(item)));
        }

        let entries = history.entries()?;
        let Some(entry) = entries.choose(&mut self.rng) else {
            debug!("Nothing queued and history is empty");
            return Ok(None);
        };

        history.record(&entry.content_id, &entry.display_name)?;
        info!("Selected {} from history", entry.content_id);
        Ok(Some(NowPlaying::History(HistoryPick {
            item_id: ItemId::generate(),
            content_id: entry.content_id.clone(),
            display_name: entry.display_name.clone(),
        })))
    }

    /// Credit everyone but the owner of `finished` with the time it played.
    ///
    /// History picks have no owner and credit nobody.
    pub fn credit_wait(registry: &mut SessionRegistry, finished: &NowPlaying, elapsed_secs: u64) -> WaitCredit {
        match finished.owner() {
            Some(owner) => {
                let credit = registry.credit_all_except(owner, elapsed_secs);
                debug!(
                    "Credited {}s to {} participant(s) after {}",
                    elapsed_secs,
                    credit.recipients.len(),
                    finished.content_id()
                );
                credit
            }
            None => WaitCredit::default(),
        }
    }
}

fn log_wait_table(registry: &SessionRegistry, queues: &ParticipantQueues) {
    for p in registry.participants_in_registration_order() {
        debug!(
            "wait {:>6}s  pending {:>3}  {} ({})",
            p.wait_seconds,
            queues.pending_count(&p.identity),
            p.display_name,
            p.identity
        );
    }
}
