//! Participant Queues
//!
//! One FIFO of pending items per participant. Every lookup is scoped to a
//! single owner's queue, so one participant can never touch another's items.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use super::protocol::{ItemId, ParticipantId, QueueItem};

#[derive(Debug, Default)]
pub struct ParticipantQueues {
    queues: HashMap<ParticipantId, VecDeque<QueueItem>>,
}

impl ParticipantQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item to the owner's queue, creating the queue if needed
    pub fn submit(
        &mut self,
        owner: &ParticipantId,
        content_id: String,
        owner_name: String,
        title: Option<String>,
    ) -> ItemId {
        let item_id = ItemId::generate();
        let item = QueueItem {
            item_id: item_id.clone(),
            content_id,
            owner: owner.clone(),
            owner_name,
            title,
        };

        debug!("Queued {} ({}) for {}", item.item_id, item.content_id, owner);
        self.queues.entry(owner.clone()).or_default().push_back(item);
        item_id
    }

    /// Remove an item from the owner's own queue.
    ///
    /// Returns false, leaving every queue untouched, if the owner has no
    /// item with this id.
    pub fn withdraw(&mut self, owner: &ParticipantId, item_id: &ItemId) -> bool {
        let Some(queue) = self.queues.get_mut(owner) else {
            return false;
        };

        match queue.iter().position(|item| &item.item_id == item_id) {
            Some(index) => {
                queue.remove(index);
                true
            }
            None => false,
        }
    }

    /// Whether the owner has anything queued
    pub fn has_pending(&self, owner: &ParticipantId) -> bool {
        self.queues.get(owner).is_some_and(|queue| !queue.is_empty())
    }

    pub fn pending_count(&self, owner: &ParticipantId) -> usize {
        self.queues.get(owner).map_or(0, VecDeque::len)
    }

    /// Oldest item in the owner's queue
    pub fn head(&self, owner: &ParticipantId) -> Option<&QueueItem> {
        self.queues.get(owner).and_then(|queue| queue.front())
    }

    /// Dequeue the oldest item in the owner's queue
    pub fn pop_front(&mut self, owner: &ParticipantId) -> Option<QueueItem> {
        self.queues.get_mut(owner).and_then(|queue| queue.pop_front())
    }

    /// Drop the owner's queue entirely
    pub fn remove_owner(&mut self, owner: &ParticipantId) -> Vec<QueueItem> {
        self.queues
            .remove(owner)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// The owner's pending items, oldest first
    pub fn items(&self, owner: &ParticipantId) -> Vec<QueueItem> {
        self.queues
            .get(owner)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn total_pending(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }
}
