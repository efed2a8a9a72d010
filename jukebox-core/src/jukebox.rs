//! Jukebox
//!
//! The single object holding all shared state. Every inbound event is
//! handled to completion before the next one, so callers must funnel events
//! from all connections through one owner (the server runs it on one task).

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::JukeboxConfig;
use crate::content_id::extract_content_id;
use crate::controller::{PlaybackController, SkipDecision};
use crate::error::JukeboxError;
use crate::room::{
    ClientEvent, ConnectionId, ItemId, NowPlaying, ParticipantId, ParticipantQueues, PlaybackState,
    QueueView, ServerEvent, SessionRegistry, StateSnapshot,
};
use crate::scheduler::FairnessScheduler;
use crate::store::{BookmarkStore, HistoryStore, KeyValueStore, Records};

/// Outbound side of the transport
pub trait EventSink: Send + Sync {
    /// Deliver to a single connection
    fn send(&self, connection: ConnectionId, event: ServerEvent);
    /// Deliver to every connection
    fn broadcast(&self, event: ServerEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn send(&self, connection: ConnectionId, event: ServerEvent) {
        (**self).send(connection, event)
    }

    fn broadcast(&self, event: ServerEvent) {
        (**self).broadcast(event)
    }
}

/// Running totals, mainly for the dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JukeboxStats {
    pub tracks_started: u64,
    pub history_fallbacks: u64,
    pub skips: u64,
    pub denials: u64,
    pub store_failures: u64,
}

pub struct Jukebox<S: EventSink> {
    config: JukeboxConfig,
    registry: SessionRegistry,
    queues: ParticipantQueues,
    controller: PlaybackController,
    history: HistoryStore,
    bookmarks: BookmarkStore,
    sink: S,
    stats: JukeboxStats,
}

impl<S: EventSink> Jukebox<S> {
    pub fn new(config: JukeboxConfig, store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, sink: S) -> Self {
        let records = Records::new(store);
        Self {
            config,
            registry: SessionRegistry::new(),
            queues: ParticipantQueues::new(),
            controller: PlaybackController::new(clock),
            history: HistoryStore::new(records.clone()),
            bookmarks: BookmarkStore::new(records),
            sink,
            stats: JukeboxStats::default(),
        }
    }

    pub fn with_scheduler(mut self, scheduler: FairnessScheduler) -> Self {
        self.controller = self.controller.with_scheduler(scheduler);
        self
    }

    pub fn config(&self) -> &JukeboxConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn queues(&self) -> &ParticipantQueues {
        &self.queues
    }

    pub fn playback(&self) -> &PlaybackState {
        self.controller.state()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn stats(&self) -> &JukeboxStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Current full state as broadcast to clients
    pub fn snapshot(&self) -> StateSnapshot {
        let state = self.controller.state();
        StateSnapshot {
            current_item: state.current_item().cloned(),
            started_at: state.started_at(),
            queues: self
                .registry
                .participants_in_registration_order()
                .into_iter()
                .map(|p| QueueView {
                    identity: p.identity.clone(),
                    display_name: p.display_name.clone(),
                    wait_seconds: p.wait_seconds,
                    items: self.queues.items(&p.identity),
                })
                .collect(),
        }
    }

    /// Handle one event from a connection
    pub fn handle(&mut self, connection: ConnectionId, event: ClientEvent) {
        let operation = event.name();
        debug!("{} -> {}", connection, operation);

        if let Err(e) = self.dispatch(connection, event) {
            match e {
                JukeboxError::Store(err) => {
                    self.stats.store_failures += 1;
                    warn!("{} from {} failed: {}", operation, connection, err);
                    self.sink.send(
                        connection,
                        ServerEvent::OperationFailed {
                            operation: operation.to_string(),
                            reason: err.to_string(),
                        },
                    );
                }
                rejected => {
                    warn!("{} from {} rejected: {}", operation, connection, rejected);
                    self.sink.send(
                        connection,
                        ServerEvent::Rejected {
                            reason: rejected.to_string(),
                        },
                    );
                }
            }
        }
    }

    fn dispatch(&mut self, connection: ConnectionId, event: ClientEvent) -> Result<(), JukeboxError> {
        if event.requires_host() && !self.registry.is_host(connection) {
            return Err(JukeboxError::NotHost);
        }

        match event {
            ClientEvent::RegisterIdentity { identity, display_name } => {
                self.register_identity(connection, identity, display_name)
            }
            ClientEvent::RegisterHost => self.register_host(connection),
            ClientEvent::SubmitItem {
                url,
                display_name,
                title,
            } => self.submit(connection, &url, display_name, title),
            ClientEvent::SkipCurrent => self.skip(connection),
            ClientEvent::WithdrawItem { item_id } => {
                self.withdraw(connection, item_id);
                Ok(())
            }
            ClientEvent::TrackFinished => self.track_finished(),
            ClientEvent::SaveBookmark { content_id, name } => {
                let owner = self.require_identity(connection)?;
                let bookmarks = self.bookmarks.save(&owner, &content_id, &name)?;
                self.sink.send(connection, ServerEvent::BookmarkList { bookmarks });
                Ok(())
            }
            ClientEvent::DeleteBookmark { content_id } => {
                let owner = self.require_identity(connection)?;
                let bookmarks = self.bookmarks.delete(&owner, &content_id)?;
                self.sink.send(connection, ServerEvent::BookmarkList { bookmarks });
                Ok(())
            }
            ClientEvent::RenameBookmark { content_id, new_name } => {
                let owner = self.require_identity(connection)?;
                let bookmarks = self.bookmarks.rename(&owner, &content_id, &new_name)?;
                self.sink.send(connection, ServerEvent::BookmarkList { bookmarks });
                Ok(())
            }
        }
    }

    fn register_identity(
        &mut self,
        connection: ConnectionId,
        identity: ParticipantId,
        display_name: String,
    ) -> Result<(), JukeboxError> {
        // Load before binding so a store failure changes nothing
        let bookmarks = self.bookmarks.list(&identity)?;
        if let Some(previous) = self.registry.register(connection, identity, display_name) {
            if self.registry.release(&previous, self.config.disconnect_policy) {
                let dropped = self.queues.remove_owner(&previous);
                info!("Dropped {} queued item(s) of {}", dropped.len(), previous);
            }
        }

        self.publish_state();
        self.sink.send(connection, ServerEvent::BookmarkList { bookmarks });
        Ok(())
    }

    fn register_host(&mut self, connection: ConnectionId) -> Result<(), JukeboxError> {
        let previous = self.registry.register_host(connection);

        if let Some(item) = self.controller.current_item() {
            // A replacement host picks up whatever is playing
            let content_id = item.content_id().to_string();
            self.sink.send(connection, ServerEvent::PlayContent { content_id });
        } else if self.queues.total_pending() > 0 {
            if let Err(e) = self.start_if_idle() {
                self.registry.restore_host(previous);
                return Err(e);
            }
            self.publish_state();
            return Ok(());
        }

        self.sink
            .send(connection, ServerEvent::StateUpdate(self.snapshot()));
        Ok(())
    }

    fn submit(
        &mut self,
        connection: ConnectionId,
        url: &str,
        display_name: Option<String>,
        title: Option<String>,
    ) -> Result<(), JukeboxError> {
        let owner = self.require_identity(connection)?;
        let owner_name = match display_name {
            Some(name) => name,
            None => self
                .registry
                .participant(&owner)
                .map(|p| p.display_name.clone())
                .unwrap_or_else(|| owner.to_string()),
        };

        let content_id = extract_content_id(url);
        let item_id = self.queues.submit(&owner, content_id, owner_name, title);

        if let Err(e) = self.start_if_idle() {
            self.queues.withdraw(&owner, &item_id);
            return Err(e);
        }

        self.publish_state();
        Ok(())
    }

    fn skip(&mut self, connection: ConnectionId) -> Result<(), JukeboxError> {
        let requester = self.registry.resolve(connection);

        match self.controller.authorize_skip(requester) {
            SkipDecision::Granted => {
                info!("Skip granted to {}", connection);
                self.end_current()?;
                self.stats.skips += 1;
                self.publish_state();
            }
            decision => {
                info!("Skip denied to {} ({:?})", connection, decision);
                self.stats.denials += 1;
                self.sink.send(connection, ServerEvent::SkipDenied);
            }
        }
        Ok(())
    }

    fn withdraw(&mut self, connection: ConnectionId, item_id: ItemId) {
        let removed = match self.registry.resolve(connection) {
            Some(owner) => self.queues.withdraw(owner, &item_id),
            None => false,
        };

        if removed {
            info!("Withdrawn {} by {}", item_id, connection);
            self.publish_state();
        } else {
            info!("Withdraw of {} denied to {}", item_id, connection);
            self.stats.denials += 1;
            self.sink.send(connection, ServerEvent::RemoveDenied { item_id });
        }
    }

    fn track_finished(&mut self) -> Result<(), JukeboxError> {
        if !self.controller.is_playing() {
            debug!("track-finished while idle, ignoring");
            return Ok(());
        }
        self.end_current()?;
        self.publish_state();
        Ok(())
    }

    /// Drop a connection
    pub fn disconnect(&mut self, connection: ConnectionId) {
        let gone = self.registry.unregister(connection, self.config.disconnect_policy);

        if let (true, Some(identity)) = (gone.purged, &gone.identity) {
            let dropped = self.queues.remove_owner(identity);
            info!("Dropped {} queued item(s) of {}", dropped.len(), identity);
            self.publish_state();
        }
    }

    /// Periodic housekeeping: force-advance a stalled track
    pub fn tick(&mut self) {
        let Some(timeout) = self.config.stall_timeout else {
            return;
        };
        if !self.controller.is_stalled(timeout) {
            return;
        }

        warn!("Host has not reported completion within {:?}, advancing", timeout);
        match self.end_current() {
            Ok(()) => self.publish_state(),
            Err(e) => {
                self.stats.store_failures += 1;
                warn!("Stall advance failed: {}", e);
            }
        }
    }

    fn require_identity(&self, connection: ConnectionId) -> Result<ParticipantId, JukeboxError> {
        self.registry
            .resolve(connection)
            .cloned()
            .ok_or(JukeboxError::NotRegistered)
    }

    fn start_if_idle(&mut self) -> Result<(), JukeboxError> {
        let host_attached = self.registry.has_host();
        if let Some(item) = self
            .controller
            .start_if_idle(&self.registry, &mut self.queues, &self.history, host_attached)?
        {
            self.announce(&item);
        }
        Ok(())
    }

    fn end_current(&mut self) -> Result<(), JukeboxError> {
        let host_attached = self.registry.has_host();
        let ended = self.controller.end_current(
            &mut self.registry,
            &mut self.queues,
            &self.history,
            host_attached,
        )?;

        if let Some(next) = ended.and_then(|ended| ended.next) {
            self.announce(&next);
        }
        Ok(())
    }

    /// Tell the host to render a freshly started item
    fn announce(&mut self, item: &NowPlaying) {
        self.stats.tracks_started += 1;
        if item.is_history() {
            self.stats.history_fallbacks += 1;
        }

        if let Some(host) = self.registry.host() {
            self.sink.send(
                host,
                ServerEvent::PlayContent {
                    content_id: item.content_id().to_string(),
                },
            );
        }
    }

    fn publish_state(&self) {
        self.sink.broadcast(ServerEvent::StateUpdate(self.snapshot()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::DisconnectPolicy;
    use crate::store::{HistoryItem, MemoryStore};
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Where a recorded event went
    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        To(ConnectionId, ServerEvent),
        All(ServerEvent),
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingSink {
        fn take(&self) -> Vec<Sent> {
            std::mem::take(&mut *self.sent.lock())
        }
    }

    impl EventSink for RecordingSink {
        fn send(&self, connection: ConnectionId, event: ServerEvent) {
            self.sent.lock().push(Sent::To(connection, event));
        }

        fn broadcast(&self, event: ServerEvent) {
            self.sent.lock().push(Sent::All(event));
        }
    }

    const HOST: ConnectionId = ConnectionId(100);
    const A: ConnectionId = ConnectionId(1);
    const B: ConnectionId = ConnectionId(2);
    const C: ConnectionId = ConnectionId(3);

    struct Harness {
        jukebox: Jukebox<RecordingSink>,
        clock: Arc<ManualClock>,
        store: Arc<MemoryStore>,
    }

    impl Harness {
        fn new(config: JukeboxConfig) -> Self {
            let clock = Arc::new(ManualClock::default());
            let store = Arc::new(MemoryStore::new());
            let jukebox = Jukebox::new(config, store.clone(), clock.clone(), RecordingSink::default())
                .with_scheduler(FairnessScheduler::with_seed(3));
            Self { jukebox, clock, store }
        }

        fn register(&mut self, connection: ConnectionId, identity: &str) {
            self.jukebox.handle(
                connection,
                ClientEvent::RegisterIdentity {
                    identity: ParticipantId::new(identity),
                    display_name: identity.to_uppercase(),
                },
            );
        }

        fn host(&mut self) {
            self.jukebox.handle(HOST, ClientEvent::RegisterHost);
        }

        fn submit(&mut self, connection: ConnectionId, url: &str) {
            self.jukebox.handle(
                connection,
                ClientEvent::SubmitItem {
                    url: url.to_string(),
                    display_name: None,
                    title: None,
                },
            );
        }

        fn finish(&mut self) {
            self.jukebox.handle(HOST, ClientEvent::TrackFinished);
        }

        fn now_playing(&self) -> Option<String> {
            self.jukebox
                .playback()
                .current_item()
                .map(|item| item.content_id().to_string())
        }

        fn wait(&self, identity: &str) -> u64 {
            self.jukebox
                .registry()
                .participant(&ParticipantId::new(identity))
                .unwrap()
                .wait_seconds
        }

        fn host_plays(&self) -> Vec<String> {
            self.jukebox
                .sink()
                .sent
                .lock()
                .iter()
                .filter_map(|sent| match sent {
                    Sent::To(HOST, ServerEvent::PlayContent { content_id }) => Some(content_id.clone()),
                    _ => None,
                })
                .collect()
        }

        fn assert_consistent(&self) {
            let state = self.jukebox.playback();
            assert_eq!(state.is_playing(), state.current_item().is_some());
            assert_eq!(state.is_playing(), state.started_at().is_some());
        }
    }

    fn harness() -> Harness {
        Harness::new(JukeboxConfig::default())
    }

    #[test]
    fn test_end_to_end_scenario() {
        let mut h = harness();
        h.register(A, "a");
        h.register(B, "b");
        h.host();

        h.submit(A, "https://www.youtube.com/watch?v=v1");
        h.submit(B, "v2");
        assert_eq!(h.now_playing().as_deref(), Some("v1"));
        assert_eq!(h.host_plays(), vec!["v1"]);

        h.clock.advance_secs(10);
        h.finish();
        assert_eq!(h.wait("b"), 10);
        assert_eq!(h.wait("a"), 0);
        assert_eq!(h.now_playing().as_deref(), Some("v2"));
        assert_eq!(h.host_plays(), vec!["v1", "v2"]);

        let history: Vec<_> = h
            .jukebox
            .history()
            .entries()
            .unwrap()
            .into_iter()
            .map(|HistoryItem { content_id, .. }| content_id)
            .collect();
        assert_eq!(history, vec!["v1", "v2"]);
        h.assert_consistent();
    }

    #[test]
    fn test_three_way_fairness() {
        let mut h = harness();
        h.register(A, "a");
        h.register(B, "b");
        h.register(C, "c");
        h.submit(A, "va");
        h.submit(B, "vb");
        h.submit(C, "vc");

        // Nothing plays until a host shows up; then pending work starts
        assert!(h.now_playing().is_none());
        h.host();
        assert_eq!(h.now_playing().as_deref(), Some("va"));

        h.clock.advance_secs(25);
        h.finish();
        assert_eq!((h.wait("a"), h.wait("b"), h.wait("c")), (0, 25, 25));
        assert_eq!(h.now_playing().as_deref(), Some("vb"));
    }

    #[test]
    fn test_submit_without_host_only_queues() {
        let mut h = harness();
        h.register(A, "a");
        h.jukebox.sink().take();

        h.submit(A, "v1");
        assert!(h.now_playing().is_none());
        assert_eq!(h.jukebox.queues().total_pending(), 1);

        let sent = h.jukebox.sink().take();
        assert!(matches!(sent.as_slice(), [Sent::All(ServerEvent::StateUpdate(_))]));
    }

    #[test]
    fn test_unregistered_submit_is_rejected() {
        let mut h = harness();
        h.host();
        h.jukebox.sink().take();

        h.submit(A, "v1");
        assert_eq!(h.jukebox.queues().total_pending(), 0);
        assert!(matches!(
            h.jukebox.sink().take().as_slice(),
            [Sent::To(A, ServerEvent::Rejected { .. })]
        ));
    }

    #[test]
    fn test_non_owner_skip_is_denied() {
        let mut h = harness();
        h.register(A, "a");
        h.register(B, "b");
        h.host();
        h.submit(A, "v1");
        h.submit(B, "v2");
        h.jukebox.sink().take();

        h.jukebox.handle(B, ClientEvent::SkipCurrent);
        assert_eq!(h.now_playing().as_deref(), Some("v1"));
        assert_eq!(h.jukebox.sink().take(), vec![Sent::To(B, ServerEvent::SkipDenied)]);
        assert_eq!(h.jukebox.stats().denials, 1);

        // The owner may skip; credit covers the time up to the skip
        h.clock.advance_secs(4);
        h.jukebox.handle(A, ClientEvent::SkipCurrent);
        assert_eq!(h.now_playing().as_deref(), Some("v2"));
        assert_eq!(h.wait("b"), 4);
        assert_eq!(h.jukebox.stats().skips, 1);
    }

    #[test]
    fn test_skip_with_nothing_playing_is_denied() {
        let mut h = harness();
        h.register(A, "a");
        h.jukebox.sink().take();

        h.jukebox.handle(A, ClientEvent::SkipCurrent);
        assert_eq!(h.jukebox.sink().take(), vec![Sent::To(A, ServerEvent::SkipDenied)]);
    }

    #[test]
    fn test_anyone_may_skip_history_pick() {
        let mut h = harness();
        h.register(A, "a");
        h.register(B, "b");
        h.host();
        h.submit(A, "v1");
        h.finish();

        // Queues are empty, v1 replays from history
        let current = h.jukebox.playback().current_item().cloned().unwrap();
        assert!(current.is_history());
        assert_eq!(current.content_id(), "v1");

        h.clock.advance_secs(50);
        h.jukebox.handle(B, ClientEvent::SkipCurrent);
        assert_eq!(h.jukebox.stats().skips, 1);
        // History picks credit nobody
        assert_eq!((h.wait("a"), h.wait("b")), (0, 0));
    }

    #[test]
    fn test_withdraw_only_own_items() {
        let mut h = harness();
        h.register(A, "a");
        h.register(B, "b");
        h.submit(B, "v1");
        let item_id = h.jukebox.queues().items(&ParticipantId::new("b"))[0].item_id.clone();
        h.jukebox.sink().take();

        h.jukebox.handle(
            A,
            ClientEvent::WithdrawItem {
                item_id: item_id.clone(),
            },
        );
        assert_eq!(
            h.jukebox.sink().take(),
            vec![Sent::To(
                A,
                ServerEvent::RemoveDenied {
                    item_id: item_id.clone()
                }
            )]
        );
        assert_eq!(h.jukebox.queues().pending_count(&ParticipantId::new("b")), 1);

        h.jukebox.handle(B, ClientEvent::WithdrawItem { item_id });
        assert_eq!(h.jukebox.queues().total_pending(), 0);
        assert!(matches!(
            h.jukebox.sink().take().as_slice(),
            [Sent::All(ServerEvent::StateUpdate(_))]
        ));
    }

    #[test]
    fn test_withdrawn_item_never_plays() {
        let mut h = harness();
        h.register(A, "a");
        h.submit(A, "v1");
        h.submit(A, "v2");
        let first = h.jukebox.queues().items(&ParticipantId::new("a"))[0].item_id.clone();
        h.jukebox.handle(A, ClientEvent::WithdrawItem { item_id: first });

        h.host();
        assert_eq!(h.now_playing().as_deref(), Some("v2"));
    }

    #[test]
    fn test_track_finished_only_from_host() {
        let mut h = harness();
        h.register(A, "a");
        h.host();
        h.submit(A, "v1");
        h.jukebox.sink().take();

        h.jukebox.handle(A, ClientEvent::TrackFinished);
        assert_eq!(h.now_playing().as_deref(), Some("v1"));
        assert!(matches!(
            h.jukebox.sink().take().as_slice(),
            [Sent::To(A, ServerEvent::Rejected { .. })]
        ));
    }

    #[test]
    fn test_finish_while_idle_is_ignored() {
        let mut h = harness();
        h.host();
        h.jukebox.history().record("old", "Old").unwrap();

        h.finish();
        assert!(h.now_playing().is_none());
    }

    #[test]
    fn test_host_reattach_then_history_fallback() {
        let mut h = harness();
        h.register(A, "a");
        h.host();
        h.submit(A, "v1");
        h.jukebox.disconnect(HOST);

        // Host gone: completion cannot be reported, playback stays
        assert_eq!(h.now_playing().as_deref(), Some("v1"));

        h.host();
        h.finish();
        // v1 is in history now, so it comes back as a fallback
        assert!(h.jukebox.playback().current_item().unwrap().is_history());
        h.assert_consistent();
    }

    #[test]
    fn test_replacement_host_resumes_current_item() {
        let mut h = harness();
        h.register(A, "a");
        h.host();
        h.submit(A, "v1");
        h.jukebox.sink().take();

        let new_host = ConnectionId(200);
        h.jukebox.handle(new_host, ClientEvent::RegisterHost);
        assert!(h.jukebox.registry().is_host(new_host));
        assert_eq!(
            h.jukebox.sink().take(),
            vec![
                Sent::To(
                    new_host,
                    ServerEvent::PlayContent {
                        content_id: "v1".to_string()
                    }
                ),
                Sent::To(new_host, ServerEvent::StateUpdate(h.jukebox.snapshot())),
            ]
        );
    }

    #[test]
    fn test_store_failure_on_submit_changes_nothing() {
        let mut h = harness();
        h.register(A, "a");
        h.host();
        h.store.set_offline(true);
        h.jukebox.sink().take();

        h.submit(A, "v1");
        assert_eq!(h.jukebox.queues().total_pending(), 0);
        assert!(h.now_playing().is_none());
        assert_eq!(h.jukebox.stats().store_failures, 1);
        assert!(matches!(
            h.jukebox.sink().take().as_slice(),
            [Sent::To(A, ServerEvent::OperationFailed { .. })]
        ));
    }

    #[test]
    fn test_store_failure_on_finish_changes_nothing() {
        let mut h = harness();
        h.register(A, "a");
        h.register(B, "b");
        h.host();
        h.submit(A, "v1");
        h.submit(B, "v2");
        let before = h.jukebox.snapshot();

        h.clock.advance_secs(8);
        h.store.set_offline(true);
        h.finish();
        assert_eq!(h.jukebox.snapshot(), before);

        h.store.set_offline(false);
        h.finish();
        assert_eq!(h.now_playing().as_deref(), Some("v2"));
        assert_eq!(h.wait("b"), 8);
    }

    #[test]
    fn test_store_failure_on_host_attach_restores_binding() {
        let mut h = harness();
        h.register(A, "a");
        h.submit(A, "v1");
        h.store.set_offline(true);

        h.host();
        assert!(!h.jukebox.registry().has_host());
        assert_eq!(h.jukebox.queues().total_pending(), 1);
    }

    #[test]
    fn test_register_sends_state_and_bookmarks() {
        let mut h = harness();
        h.register(A, "a");
        h.jukebox.handle(
            A,
            ClientEvent::SaveBookmark {
                content_id: "v1".to_string(),
                name: "One".to_string(),
            },
        );
        h.jukebox.sink().take();

        // Same identity on a second device sees the bookmark
        h.register(B, "a");
        let sent = h.jukebox.sink().take();
        assert!(matches!(sent[0], Sent::All(ServerEvent::StateUpdate(_))));
        match &sent[1] {
            Sent::To(B, ServerEvent::BookmarkList { bookmarks }) => {
                assert_eq!(bookmarks.len(), 1);
                assert_eq!(bookmarks[0].content_id, "v1");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bookmark_edits_reply_to_caller_only() {
        let mut h = harness();
        h.register(A, "a");
        h.jukebox.handle(
            A,
            ClientEvent::SaveBookmark {
                content_id: "v1".to_string(),
                name: "One".to_string(),
            },
        );
        h.jukebox.handle(
            A,
            ClientEvent::RenameBookmark {
                content_id: "v1".to_string(),
                new_name: "Uno".to_string(),
            },
        );
        h.jukebox.sink().take();

        h.jukebox.handle(
            A,
            ClientEvent::DeleteBookmark {
                content_id: "v1".to_string(),
            },
        );
        assert_eq!(
            h.jukebox.sink().take(),
            vec![Sent::To(A, ServerEvent::BookmarkList { bookmarks: vec![] })]
        );

        // Unregistered connections cannot touch bookmarks
        h.jukebox.handle(
            C,
            ClientEvent::SaveBookmark {
                content_id: "v9".to_string(),
                name: "Nine".to_string(),
            },
        );
        assert!(matches!(
            h.jukebox.sink().take().as_slice(),
            [Sent::To(C, ServerEvent::Rejected { .. })]
        ));
    }

    #[test]
    fn test_retain_policy_keeps_queue_and_wait() {
        let mut h = harness();
        h.register(A, "a");
        h.register(B, "b");
        h.host();
        h.submit(A, "v1");
        h.submit(B, "v2");
        h.submit(B, "v3");
        h.clock.advance_secs(20);
        h.finish();

        h.jukebox.disconnect(B);
        assert_eq!(h.wait("b"), 20);
        assert_eq!(h.jukebox.queues().pending_count(&ParticipantId::new("b")), 1);

        // Reconnecting under the same identity resumes the queue
        h.register(ConnectionId(9), "b");
        h.jukebox.handle(ConnectionId(9), ClientEvent::SkipCurrent);
        assert_eq!(h.now_playing().as_deref(), Some("v3"));
    }

    #[test]
    fn test_purge_policy_drops_queue() {
        let mut h = Harness::new(JukeboxConfig::default().with_disconnect_policy(DisconnectPolicy::Purge));
        h.register(A, "a");
        h.register(B, "b");
        h.submit(B, "v1");

        h.jukebox.disconnect(B);
        assert!(h
            .jukebox
            .registry()
            .participant(&ParticipantId::new("b"))
            .is_none());
        assert_eq!(h.jukebox.queues().total_pending(), 0);
        assert_eq!(h.jukebox.snapshot().queues.len(), 1);
    }

    #[test]
    fn test_purge_policy_drops_identity_left_by_rebinding() {
        let mut h = Harness::new(JukeboxConfig::default().with_disconnect_policy(DisconnectPolicy::Purge));
        h.register(A, "a");
        h.submit(A, "v1");

        h.register(A, "b");
        assert!(h
            .jukebox
            .registry()
            .participant(&ParticipantId::new("a"))
            .is_none());
        assert_eq!(h.jukebox.queues().total_pending(), 0);

        h.jukebox.disconnect(A);
        assert_eq!(h.jukebox.registry().participant_count(), 0);
        assert!(h.jukebox.snapshot().queues.is_empty());
    }

    #[test]
    fn test_retain_policy_keeps_identity_left_by_rebinding() {
        let mut h = Harness::new(JukeboxConfig::default());
        h.register(A, "a");
        h.submit(A, "v1");

        h.register(A, "b");
        assert!(h
            .jukebox
            .registry()
            .participant(&ParticipantId::new("a"))
            .is_some());
        assert_eq!(h.jukebox.queues().total_pending(), 1);
    }

    #[test]
    fn test_stall_guard_advances() {
        let config = JukeboxConfig::default().with_stall_timeout(Some(Duration::from_secs(60)));
        let mut h = Harness::new(config);
        h.register(A, "a");
        h.register(B, "b");
        h.host();
        h.submit(A, "v1");
        h.submit(B, "v2");

        h.clock.advance_secs(59);
        h.jukebox.tick();
        assert_eq!(h.now_playing().as_deref(), Some("v1"));

        h.clock.advance_secs(1);
        h.jukebox.tick();
        assert_eq!(h.now_playing().as_deref(), Some("v2"));
        assert_eq!(h.wait("b"), 60);
    }

    #[test]
    fn test_tick_without_timeout_never_advances() {
        let mut h = harness();
        h.register(A, "a");
        h.host();
        h.submit(A, "v1");

        h.clock.advance_secs(100_000);
        h.jukebox.tick();
        assert_eq!(h.now_playing().as_deref(), Some("v1"));
    }

    #[test]
    fn test_snapshot_lists_participants_in_registration_order() {
        let mut h = harness();
        h.register(B, "b");
        h.register(A, "a");
        h.submit(A, "https://youtu.be/short");

        let snapshot = h.jukebox.snapshot();
        let names: Vec<_> = snapshot.queues.iter().map(|q| q.display_name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(snapshot.queues[1].items[0].content_id, "short");
        assert_eq!(snapshot.queues[1].items[0].owner_name, "A");
    }
}
