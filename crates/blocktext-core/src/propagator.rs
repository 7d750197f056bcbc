//! Change propagator: coalesces store notifications into debounced writes.
//!
//! Each forwarded notification replaces the pending delta and restarts the
//! quiescence window. When the window elapses the latest delta goes to the
//! persistence bridge. The timer and the bridge call run as `spawn_local`
//! tasks, so a propagator must be attached inside a `tokio::task::LocalSet`.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use smol_str::SmolStr;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::bridge::{BlockIdentity, BlockUpdate, PersistenceBridge};
use crate::config::{SyncConfig, TeardownPolicy};
use crate::delta::Delta;
use crate::observe::Subscription;
use crate::replica::TextReplica;
use crate::status::SyncStatus;
use crate::store::ReplicatedTextStore;
use crate::types::{BlockId, ChangeEvent};

struct Shared<B> {
    bridge: Rc<B>,
    identity: RefCell<BlockIdentity>,
    content_key: SmolStr,
    window: Duration,
    /// Latest delta not yet handed to the bridge.
    pending: RefCell<Option<Delta>>,
    /// Debounce timer; taken by the task once it wakes.
    timer: RefCell<Option<JoinHandle<()>>>,
    in_flight: Cell<bool>,
    /// Woken when the in-flight call settles.
    settled: Notify,
    /// Bumped on every `Seed`/`External` change.
    authoritative: Cell<u64>,
    live: Cell<bool>,
    status: watch::Sender<SyncStatus>,
}

/// Debounced forwarder from one store to the persistence bridge.
pub struct ChangePropagator<B> {
    shared: Rc<Shared<B>>,
    subscription: Option<Subscription>,
    teardown: TeardownPolicy,
}

impl<B: PersistenceBridge + 'static> ChangePropagator<B> {
    /// Subscribe to `store` and forward its changes for `identity`.
    pub fn attach<R: TextReplica>(
        store: &ReplicatedTextStore<R>,
        bridge: Rc<B>,
        identity: BlockIdentity,
        config: &SyncConfig,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        let shared = Rc::new(Shared {
            bridge,
            identity: RefCell::new(identity),
            content_key: config.content_key.clone(),
            window: config.debounce(),
            pending: RefCell::new(None),
            timer: RefCell::new(None),
            in_flight: Cell::new(false),
            settled: Notify::new(),
            authoritative: Cell::new(0),
            live: Cell::new(true),
            status,
        });

        let weak = Rc::downgrade(&shared);
        let subscription = store.subscribe(move |event| {
            if let Some(shared) = weak.upgrade() {
                Shared::on_change(&shared, event);
            }
        });

        Self {
            shared,
            subscription: Some(subscription),
            teardown: config.teardown,
        }
    }

    /// Watch the outgoing sync status.
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.shared.status.subscribe()
    }

    pub fn current_status(&self) -> SyncStatus {
        self.shared.status.borrow().clone()
    }

    /// Block identity as last persisted (or seeded).
    pub fn identity(&self) -> BlockIdentity {
        self.shared.identity.borrow().clone()
    }

    /// Whether a send is waiting for its window to elapse.
    pub fn has_pending(&self) -> bool {
        self.shared.pending.borrow().is_some()
    }

    pub fn is_closed(&self) -> bool {
        !self.shared.live.get()
    }

    /// Detach and settle any pending update according to the teardown
    /// policy. Idempotent.
    ///
    /// A flush waits for an in-flight call to settle first, so updates
    /// still reach the bridge one at a time and in order.
    pub async fn close(&mut self) {
        let Some(pending) = self.shutdown() else {
            return;
        };
        match self.teardown {
            TeardownPolicy::Flush => {
                while self.shared.in_flight.get() {
                    trace!("waiting for in-flight update before flushing");
                    self.shared.settled.notified().await;
                }
                debug!(block_id = %self.block_id(), "flushing pending update on close");
                self.shared.send(pending).await;
            }
            TeardownPolicy::Drop => self.discard(),
        }
    }

    fn block_id(&self) -> BlockId {
        self.shared.identity.borrow().id.clone()
    }

    fn discard(&self) {
        info!(block_id = %self.block_id(), "session closed mid-window, pending update dropped");
        self.shared.status.send_replace(SyncStatus::Idle);
    }

    /// Stop listening and cancel the timer. Returns the pending delta, if
    /// any, the first time it is called.
    fn shutdown(&mut self) -> Option<Delta> {
        if self.subscription.take().is_none() {
            return None;
        }
        self.shared.live.set(false);
        if let Some(timer) = self.shared.timer.borrow_mut().take() {
            timer.abort();
        }
        self.shared.pending.borrow_mut().take()
    }
}

impl<B> Drop for ChangePropagator<B> {
    fn drop(&mut self) {
        // An explicit close already settled things.
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        drop(subscription);
        self.shared.live.set(false);
        if let Some(timer) = self.shared.timer.borrow_mut().take() {
            timer.abort();
        }
        if self.shared.pending.borrow_mut().take().is_some() {
            let block_id = self.shared.identity.borrow().id.clone();
            if self.teardown == TeardownPolicy::Flush {
                warn!(%block_id, "propagator dropped without close, pending update not flushed");
            } else {
                info!(%block_id, "session closed mid-window, pending update dropped");
            }
        }
    }
}

impl<B: PersistenceBridge + 'static> Shared<B> {
    fn on_change(this: &Rc<Self>, event: &ChangeEvent) {
        if !this.live.get() {
            trace!(origin = %event.origin, "propagator closed, ignoring change");
            return;
        }

        if event.origin.is_authoritative() {
            // Content came from the store itself; nothing to send back.
            this.authoritative.set(this.authoritative.get() + 1);
            this.identity
                .borrow_mut()
                .splice_content(&this.content_key, &event.delta);
            if let Some(timer) = this.timer.borrow_mut().take() {
                timer.abort();
            }
            if this.pending.borrow_mut().take().is_some() {
                debug!(origin = %event.origin, "pending update superseded");
                this.status.send_if_modified(|status| {
                    let was_pending = *status == SyncStatus::Pending;
                    if was_pending {
                        *status = SyncStatus::Idle;
                    }
                    was_pending
                });
            }
            return;
        }

        trace!(origin = %event.origin, len = event.delta.len_chars(), "scheduling update");
        *this.pending.borrow_mut() = Some(event.delta.clone());
        if !this.in_flight.get() {
            this.status.send_replace(SyncStatus::Pending);
        }
        Self::restart_timer(this);
    }

    fn restart_timer(this: &Rc<Self>) {
        if let Some(timer) = this.timer.borrow_mut().take() {
            timer.abort();
        }
        let weak: Weak<Self> = Rc::downgrade(this);
        let window = this.window;
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(window).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            // Past this point a new notification must not abort us.
            shared.timer.borrow_mut().take();
            shared.drain().await;
        });
        *this.timer.borrow_mut() = Some(handle);
    }

    /// Send pending deltas one at a time until none is left or a newer
    /// window takes over.
    async fn drain(&self) {
        if self.in_flight.get() {
            trace!("send in flight, queued delta will follow it");
            return;
        }
        self.in_flight.set(true);
        while self.live.get() {
            let Some(delta) = self.pending.borrow_mut().take() else {
                break;
            };
            self.send(delta).await;
            if self.timer.borrow().is_some() {
                break;
            }
        }
        self.in_flight.set(false);
        self.settled.notify_waiters();
    }

    async fn send(&self, delta: Delta) {
        let update = BlockUpdate::new(&self.identity.borrow(), &self.content_key, delta);
        let block_id = update.block.id.clone();
        self.status.send_replace(SyncStatus::Sending);
        debug!(%block_id, len = update.delta.len_chars(), "sending block update");

        let delta = update.delta.clone();
        let epoch = self.authoritative.get();
        match self.bridge.update_block(update).await {
            Ok(()) => {
                // The store's own content arrived meanwhile and is newer.
                if self.authoritative.get() == epoch {
                    self.identity
                        .borrow_mut()
                        .splice_content(&self.content_key, &delta);
                }
                let next = if self.pending.borrow().is_some() {
                    SyncStatus::Pending
                } else {
                    SyncStatus::Synced
                };
                self.status.send_replace(next);
                trace!(%block_id, "block update accepted");
            }
            Err(e) => {
                warn!(%block_id, error = %e, "block update rejected, local content kept");
                self.status
                    .send_replace(SyncStatus::Failed(SmolStr::new(e.message())));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::task::LocalSet;

    use super::*;
    use crate::delta::attributes;
    use crate::replica::MemoryReplica;
    use crate::testing::{RecordingBridge, advance};
    use crate::types::EditOp;

    type Store = ReplicatedTextStore<MemoryReplica>;

    fn setup(config: &SyncConfig) -> (Store, Rc<RecordingBridge>, ChangePropagator<RecordingBridge>) {
        let mut store = ReplicatedTextStore::new(BlockId::new("b1"), MemoryReplica::new());
        store.seed(&Delta::new()).unwrap();
        let bridge = Rc::new(RecordingBridge::new());
        let propagator = ChangePropagator::attach(
            &store,
            Rc::clone(&bridge),
            BlockIdentity::new("b1", "text"),
            config,
        );
        (store, bridge, propagator)
    }

    fn type_char(store: &mut Store, c: &str) {
        let end = store.len_chars();
        store.mutate(&[EditOp::insert(end, c)]).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_latest_delta() {
        LocalSet::new()
            .run_until(async {
                let (mut store, bridge, propagator) = setup(&SyncConfig::default());
                for c in ["a", "b", "c"] {
                    type_char(&mut store, c);
                }
                assert_eq!(propagator.current_status(), SyncStatus::Pending);

                advance(299).await;
                assert_eq!(bridge.call_count(), 0);
                advance(2).await;
                assert_eq!(bridge.deltas(), vec![Delta::new().insert("abc")]);
                assert_eq!(propagator.current_status(), SyncStatus::Synced);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_on_each_change() {
        LocalSet::new()
            .run_until(async {
                let (mut store, bridge, _propagator) = setup(&SyncConfig::default());

                // t=0, 50, 100, 350: every gap is inside the window.
                type_char(&mut store, "a");
                advance(50).await;
                type_char(&mut store, "b");
                advance(50).await;
                type_char(&mut store, "c");
                advance(250).await;
                type_char(&mut store, "d");

                advance(299).await;
                assert_eq!(bridge.call_count(), 0);
                advance(2).await;
                let calls = bridge.calls();
                assert_eq!(calls.len(), 1);
                assert!((650..=651).contains(&calls[0].at_ms));
                assert_eq!(calls[0].update.delta, Delta::new().insert("abcd"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_gap_yields_two_updates() {
        LocalSet::new()
            .run_until(async {
                let (mut store, bridge, _propagator) = setup(&SyncConfig::default());

                // t=0, 50, 100, 450
                type_char(&mut store, "a");
                advance(50).await;
                type_char(&mut store, "b");
                advance(50).await;
                type_char(&mut store, "c");
                advance(350).await;
                type_char(&mut store, "d");
                advance(400).await;

                let calls = bridge.calls();
                assert_eq!(calls.len(), 2);
                assert!((400..=401).contains(&calls[0].at_ms));
                assert_eq!(calls[0].update.delta, Delta::new().insert("abc"));
                assert!((750..=751).contains(&calls[1].at_ms));
                assert_eq!(calls[1].update.delta, Delta::new().insert("abcd"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_changes_are_not_sent() {
        LocalSet::new()
            .run_until(async {
                let (mut store, bridge, propagator) = setup(&SyncConfig::default());
                type_char(&mut store, "a");
                advance(100).await;

                // The store's own content supersedes the pending local edit.
                let external = Delta::new().insert_with("server", attributes([("bold", true)]));
                store.apply_external_delta(&external).unwrap();
                advance(1000).await;

                assert_eq!(bridge.call_count(), 0);
                assert!(!propagator.has_pending());
                assert_eq!(propagator.current_status(), SyncStatus::Idle);
                assert_eq!(propagator.identity().content("delta"), Some(external));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_carries_spliced_identity() {
        LocalSet::new()
            .run_until(async {
                let (mut store, bridge, propagator) = setup(&SyncConfig::default());
                type_char(&mut store, "x");
                advance(400).await;

                let calls = bridge.calls();
                assert_eq!(calls[0].update.block.content("delta"), Some(Delta::new().insert("x")));
                assert_eq!(propagator.identity().content("delta"), Some(Delta::new().insert("x")));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_reported_and_next_edit_retries() {
        LocalSet::new()
            .run_until(async {
                let (mut store, bridge, propagator) = setup(&SyncConfig::default());
                let mut status = propagator.status();
                bridge.set_failing(true);

                type_char(&mut store, "a");
                advance(400).await;
                assert!(status.has_changed().unwrap());
                assert_eq!(
                    *status.borrow_and_update(),
                    SyncStatus::Failed("store offline".into())
                );
                assert_eq!(store.delta(), Delta::new().insert("a"));

                bridge.set_failing(false);
                type_char(&mut store, "b");
                advance(400).await;
                assert_eq!(
                    bridge.deltas(),
                    vec![Delta::new().insert("a"), Delta::new().insert("ab")]
                );
                assert_eq!(propagator.current_status(), SyncStatus::Synced);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_bridge_keeps_one_call_outstanding() {
        LocalSet::new()
            .run_until(async {
                let mut store = ReplicatedTextStore::new(BlockId::new("b1"), MemoryReplica::new());
                let bridge = Rc::new(RecordingBridge::new().with_latency(Duration::from_millis(1000)));
                let _propagator = ChangePropagator::attach(
                    &store,
                    Rc::clone(&bridge),
                    BlockIdentity::new("b1", "text"),
                    &SyncConfig::default(),
                );

                type_char(&mut store, "a");
                advance(350).await;
                // First call is in flight until t=1300; this window ends at 650.
                type_char(&mut store, "b");
                advance(500).await;
                assert_eq!(bridge.call_count(), 1);

                advance(1000).await;
                let calls = bridge.calls();
                assert_eq!(calls.len(), 2);
                assert!(calls[1].at_ms >= 1300);
                assert_eq!(calls[1].update.delta, Delta::new().insert("ab"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_change_during_send_keeps_identity() {
        LocalSet::new()
            .run_until(async {
                let mut store = ReplicatedTextStore::new(BlockId::new("b1"), MemoryReplica::new());
                let bridge = Rc::new(RecordingBridge::new().with_latency(Duration::from_millis(1000)));
                let propagator = ChangePropagator::attach(
                    &store,
                    Rc::clone(&bridge),
                    BlockIdentity::new("b1", "text"),
                    &SyncConfig::default(),
                );

                type_char(&mut store, "a");
                advance(350).await;
                let server = Delta::new().insert("server");
                store.apply_external_delta(&server).unwrap();
                advance(1000).await;

                assert_eq!(bridge.deltas(), vec![Delta::new().insert("a")]);
                assert_eq!(propagator.identity().content("delta"), Some(server));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_waits_for_in_flight_call() {
        LocalSet::new()
            .run_until(async {
                let mut store = ReplicatedTextStore::new(BlockId::new("b1"), MemoryReplica::new());
                let bridge = Rc::new(RecordingBridge::new().with_latency(Duration::from_millis(1000)));
                let config = SyncConfig::default().with_teardown(TeardownPolicy::Flush);
                let mut propagator = ChangePropagator::attach(
                    &store,
                    Rc::clone(&bridge),
                    BlockIdentity::new("b1", "text"),
                    &config,
                );

                type_char(&mut store, "a");
                advance(350).await;
                type_char(&mut store, "b");
                propagator.close().await;

                let calls = bridge.calls();
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0].update.delta, Delta::new().insert("a"));
                assert!((300..=301).contains(&calls[0].at_ms));
                assert_eq!(calls[1].update.delta, Delta::new().insert("ab"));
                assert!(calls[1].at_ms >= 1300);
                assert_eq!(propagator.current_status(), SyncStatus::Synced);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_mid_window_sends_nothing() {
        LocalSet::new()
            .run_until(async {
                let (mut store, bridge, propagator) = setup(&SyncConfig::default());
                type_char(&mut store, "a");
                advance(100).await;
                drop(propagator);

                assert_eq!(store.observer_count(), 0);
                advance(1000).await;
                assert_eq!(bridge.call_count(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_with_flush_sends_immediately() {
        LocalSet::new()
            .run_until(async {
                let config = SyncConfig::default().with_teardown(TeardownPolicy::Flush);
                let (mut store, bridge, mut propagator) = setup(&config);
                type_char(&mut store, "a");
                advance(100).await;

                propagator.close().await;
                assert_eq!(bridge.deltas(), vec![Delta::new().insert("a")]);

                // Closed: later changes and the old window are both ignored.
                propagator.close().await;
                type_char(&mut store, "b");
                advance(1000).await;
                assert_eq!(bridge.call_count(), 1);
                assert!(propagator.is_closed());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_with_drop_discards() {
        LocalSet::new()
            .run_until(async {
                let (mut store, bridge, mut propagator) = setup(&SyncConfig::default());
                type_char(&mut store, "a");
                propagator.close().await;
                advance(1000).await;

                assert_eq!(bridge.call_count(), 0);
                assert_eq!(propagator.current_status(), SyncStatus::Idle);
            })
            .await;
    }
}
