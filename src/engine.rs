//! # Sync Engine - Leaderless Tab Synchronization
//!
//! The `engine` module provides [`SyncEngine`], a long-running service that keeps the open tabs
//! of one browser instance (a *peer*) converged with every other peer that shares the same
//! replicated key/value area.
//!
//! ## Overview
//!
//! There is no server and no leader. Each peer publishes its complete tab list as a snapshot
//! under one shared key and merges snapshots written by others:
//! - **Tracking**: tab events feed a per-tab navigation state machine that works out the url
//!   other peers should see for each tab (see [`crate::redirect`])
//! - **Publishing**: once tabs settle, the local list is diffed against the stored snapshot and
//!   a debounced write replaces it when they differ
//! - **Merging**: snapshots written by other peers create the tabs missing here and close the
//!   tabs the other peer closed, guarded by provenance and per-peer sync times
//! - **Serialization**: publishing and merging go through one queue, one operation at a time
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tabsync_core::{config::SyncConfig, engine::SyncEngine, sim::{MemoryHost, MemoryStore}};
//! use tabsync_core::event::StorageArea;
//!
//! # async fn run() -> Result<(), tabsync_core::SyncError> {
//! let (host, events) = MemoryHost::new();
//! let local = MemoryStore::new(StorageArea::Local);
//! let shared = MemoryStore::new(StorageArea::Shared);
//! shared.subscribe(host.event_sender());
//!
//! let engine = SyncEngine::start(host.clone(), local, shared, SyncConfig::default()).await?;
//! tokio::spawn({
//!     let engine = engine.clone();
//!     async move { engine.run(events).await }
//! });
//! engine.command(tabsync_core::commands::Command::EnableAutoSync).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! All engine state sits behind one `parking_lot` mutex that is never held across an `.await`,
//! so the code between two host or store calls runs atomically. Timers are tokio tasks:
//! - **Queue steps** run [`SyncOp`]s after the step delay, each inside its own task so a panic
//!   releases the lock like any other failure
//! - **Snapshot writes** and **settle checks** are debounced through [`DelayedSlot`]
//! - **Maintenance** purges the recently-closed and recycle caches periodically
//!
//! ## Error Handling
//!
//! Nothing is fatal. Transient conditions (no window, no tab list) abort the current operation
//! with [`SyncError::NotReady`]; the next tab or storage event retries. Undecodable snapshots
//! read as absent. Host and store failures are logged and reported to the waiter of the
//! operation, if any.

use parking_lot::Mutex;
use serde_json::Value;
use std::{
    collections::BTreeSet,
    sync::{Arc, Weak},
};
use tokio::{
    sync::{mpsc::UnboundedReceiver, oneshot, watch},
    time::{interval_at, sleep, Instant},
};

use crate::{
    cache::{RecentTabs, RecycleBin},
    clock::Clock,
    commands::{Command, SyncStatus},
    config::SyncConfig,
    diff::diff_tabs,
    error::SyncError,
    event::{HostEvent, StorageArea, StorageChange},
    gate::SyncGate,
    host::{KeyValueStore, StoreEntries, TabHost},
    identity::UrlPolicy,
    properties::{HostTab, NewTab, PeerId, SyncTimes, TabId, TabScope, TabStatus, Timestamp},
    queue::{Step, SyncOp, SyncQueue},
    reconcile::{build_record, plan_removals, select_creations, sync_time_for, MergeContext},
    redirect::{on_complete, on_loading, on_redirect},
    schedule::{complete_all, DelayedSlot, Waiter},
    settings::{self, Settings, AUTO_SYNC_ENABLED, SYNC_ALL, SYNC_RECORD},
    snapshot::{decode_payload, encode_record, SnapshotEntry, SyncRecord},
    tracker::{TabItem, TabTracker},
};

#[derive(Debug)]
struct EngineState {
    peer_id: PeerId,
    gate: SyncGate,
    sync_all: bool,
    tracker: TabTracker,
    recent: RecentTabs,
    recycled: RecycleBin,
    source_sync_times: SyncTimes,
    dest_sync_times: SyncTimes,
    started_at: Timestamp,
}

impl EngineState {
    fn scope(&self) -> TabScope {
        TabScope::from_sync_all(self.sync_all)
    }
}

/// Tabs captured by a publish, written when the debounce fires.
#[derive(Debug)]
struct PendingWrite {
    tabs: Vec<HostTab>,
    time: Timestamp,
}

struct EngineInner<H, L, R> {
    host: H,
    local: L,
    shared: R,
    config: SyncConfig,
    policy: UrlPolicy,
    clock: Clock,
    state: Mutex<EngineState>,
    queue: Mutex<SyncQueue>,
    writes: DelayedSlot<PendingWrite>,
    settle: DelayedSlot<()>,
    status: watch::Sender<SyncStatus>,
}

/// Handle to a running engine. Cheap to clone; all clones drive the same peer.
pub struct SyncEngine<H, L, R> {
    inner: Arc<EngineInner<H, L, R>>,
}

impl<H, L, R> Clone for SyncEngine<H, L, R> {
    fn clone(&self) -> Self {
        SyncEngine {
            inner: self.inner.clone(),
        }
    }
}

impl<H, L, R> SyncEngine<H, L, R>
where
    H: TabHost,
    L: KeyValueStore,
    R: KeyValueStore,
{
    /// Restore settings and tab records, detect the window state and start maintenance.
    pub async fn start(
        host: H,
        local: L,
        shared: R,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        Self::start_with_clock(host, local, shared, config, Clock::new()).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn start_with_clock(
        host: H,
        local: L,
        shared: R,
        config: SyncConfig,
        clock: Clock,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let settings = Settings::load(&local, &shared).await?;
        let policy = config.url_policy();
        tracing::info!(
            "[SyncEngine] starting peer {} (auto sync: {}, sync all: {})",
            settings.peer_id,
            settings.auto_sync_enabled,
            settings.sync_all
        );

        let mut recycled = RecycleBin::new();
        for item in settings.tab_map.items().values() {
            recycled.stash(item.clone(), &policy);
        }

        let state = EngineState {
            peer_id: settings.peer_id,
            gate: SyncGate::new(settings.auto_sync_enabled),
            sync_all: settings.sync_all,
            tracker: TabTracker::new(),
            recent: RecentTabs::new(),
            recycled,
            source_sync_times: settings.source_sync_times,
            dest_sync_times: settings.dest_sync_times,
            started_at: clock.now(),
        };
        let (status, _) = watch::channel(state.gate.status(false));

        let engine = SyncEngine {
            inner: Arc::new(EngineInner {
                host,
                local,
                shared,
                config,
                policy,
                clock,
                state: Mutex::new(state),
                queue: Mutex::new(SyncQueue::new()),
                writes: DelayedSlot::new(),
                settle: DelayedSlot::new(),
                status,
            }),
        };

        engine.inner.adopt_recycled_tabs().await?;
        engine.inner.refresh_window_presence().await?;
        engine.inner.update_sync_allowed_state();
        EngineInner::spawn_maintenance(&engine.inner);
        Ok(engine)
    }

    /// Process host events until the channel closes.
    pub async fn run(&self, mut events: UnboundedReceiver<HostEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        tracing::debug!("[SyncEngine] event channel closed");
    }

    pub async fn handle_event(&self, event: HostEvent) {
        tracing::trace!("[SyncEngine] {event}");
        self.inner.handle_event(event).await;
    }

    /// Execute a user command. `SaveTabs` and `RestoreTabs` resolve once the queued operation
    /// ran (or was dropped because syncing is not allowed).
    pub async fn command(&self, command: Command) -> Result<(), SyncError> {
        match command {
            Command::SaveTabs | Command::RestoreTabs => {
                let (tx, rx) = oneshot::channel();
                self.inner.apply_command(command, Some(tx)).await?;
                rx.await?
            }
            _ => self.inner.apply_command(command, None).await,
        }
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    pub fn peer_id(&self) -> PeerId {
        self.inner.state.lock().peer_id.clone()
    }

    pub fn gate(&self) -> SyncGate {
        self.inner.state.lock().gate
    }

    pub fn tracked(&self, id: TabId) -> Option<TabItem> {
        self.inner.state.lock().tracker.get(id).cloned()
    }

    pub fn tracker(&self) -> TabTracker {
        self.inner.state.lock().tracker.clone()
    }

    pub fn sync_times(&self) -> (SyncTimes, SyncTimes) {
        let state = self.inner.state.lock();
        (
            state.source_sync_times.clone(),
            state.dest_sync_times.clone(),
        )
    }

    /// Whether `url` is currently kept from being recreated by snapshots.
    pub fn is_recently_closed(&self, url: &str) -> bool {
        let now = self.inner.clock.now();
        self.inner
            .state
            .lock()
            .recent
            .is_suppressed(url, now, self.inner.config.recreate_window_ms)
    }

    /// Stored snapshot as currently visible in the shared area.
    pub async fn stored_record(&self) -> Result<Option<SyncRecord>, SyncError> {
        self.inner.stored_record().await
    }

    pub fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }
}

impl<H, L, R> EngineInner<H, L, R>
where
    H: TabHost,
    L: KeyValueStore,
    R: KeyValueStore,
{
    fn merge_context<'a>(&'a self, state: &'a EngineState, now: Timestamp) -> MergeContext<'a> {
        MergeContext {
            local_peer: &state.peer_id,
            now,
            started_at: state.started_at,
            startup_window_ms: self.config.startup_window_ms,
            recreate_window_ms: self.config.recreate_window_ms,
            policy: &self.policy,
        }
    }

    fn refresh_status(&self) {
        let locked = self.queue.lock().is_locked();
        let status = self.state.lock().gate.status(locked);
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            tracing::debug!("[SyncEngine] status {current} -> {status}");
            *current = status;
            true
        });
    }

    async fn query_scope(&self) -> Result<Vec<HostTab>, SyncError> {
        let scope = self.state.lock().scope();
        self.host
            .query_tabs(scope)
            .await?
            .ok_or_else(|| SyncError::NotReady("tab list unavailable".to_string()))
    }

    async fn stored_record(&self) -> Result<Option<SyncRecord>, SyncError> {
        let value = self.shared.get(SYNC_RECORD).await?;
        Ok(decode_payload(value.as_ref()))
    }

    async fn persist_state(&self) -> Result<(), SyncError> {
        let entries = {
            let state = self.state.lock();
            settings::state_entries(
                &state.tracker,
                &state.source_sync_times,
                &state.dest_sync_times,
            )?
        };
        self.local.set(entries).await
    }

    // ---- startup and maintenance ----

    async fn adopt_recycled_tabs(&self) -> Result<(), SyncError> {
        let scope = self.state.lock().scope();
        let Some(tabs) = self.host.query_tabs(scope).await? else {
            return Ok(());
        };
        let mut state = self.state.lock();
        for tab in tabs.iter() {
            if let Some(item) = state.recycled.reuse(&tab.url) {
                tracing::debug!("[SyncEngine] tab {} reuses recycled record", tab.id);
                state.tracker.insert(tab.id, item);
            }
        }
        Ok(())
    }

    async fn refresh_window_presence(&self) -> Result<(), SyncError> {
        let present = self.host.normal_window_present().await?;
        self.state.lock().gate.normal_window_present = present;
        Ok(())
    }

    fn spawn_maintenance(inner: &Arc<Self>) {
        let recent_every = inner.config.recent_purge_interval();
        let weak = Arc::downgrade(inner);
        tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + recent_every, recent_every);
            loop {
                ticks.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                inner.purge_recent();
            }
        });

        let recycle_every = inner.config.recycle_purge_interval();
        let weak: Weak<Self> = Arc::downgrade(inner);
        tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + recycle_every, recycle_every);
            loop {
                ticks.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                inner.purge_recycled().await;
            }
        });
    }

    fn purge_recent(&self) {
        let now = self.clock.now();
        let purged = self
            .state
            .lock()
            .recent
            .purge(now, self.config.recreate_window_ms);
        tracing::debug!("[SyncEngine] purged {purged} recently closed urls");
    }

    async fn purge_recycled(&self) {
        let now = self.clock.now();
        let expiry = self.config.recycle_expiry_ms;
        let purged = self.state.lock().recycled.purge(now, expiry);
        tracing::debug!("[SyncEngine] purged {purged} recycled records");

        match self.host.query_tabs(TabScope::All).await {
            Ok(Some(tabs)) => {
                let open: BTreeSet<TabId> = tabs.iter().map(|tab| tab.id).collect();
                let purged = self.state.lock().tracker.purge_stale(&open, now, expiry);
                tracing::debug!("[SyncEngine] purged {purged} records of closed tabs");
            }
            Ok(None) => tracing::debug!("[SyncEngine] skipping tracker purge: tab list unavailable"),
            Err(e) => tracing::debug!("[SyncEngine] skipping tracker purge: {e}"),
        }
    }

    // ---- gate ----

    fn update_sync_allowed_state(self: &Arc<Self>) {
        let merge_now = self.state.lock().gate.update_allowed();
        if merge_now {
            tracing::info!("[SyncEngine] syncing allowed, merging stored snapshot");
            self.enqueue(SyncOp::RestoreTabs, None);
        }
        self.refresh_status();
    }

    fn request_settle_check(self: &Arc<Self>) {
        if !self.settle.offer((), None) {
            return;
        }
        let inner = self.clone();
        let delay = self.config.redirect_delay();
        tokio::spawn(async move {
            sleep(delay).await;
            if inner.settle.take().is_some() {
                inner.settle_check().await;
            }
        });
    }

    async fn settle_check(self: &Arc<Self>) {
        let scope = self.state.lock().scope();
        let tabs = match self.host.query_tabs(scope).await {
            Ok(Some(tabs)) => tabs,
            Ok(None) => {
                tracing::debug!("[SyncEngine] settle check: tab list unavailable");
                return;
            }
            Err(e) => {
                tracing::warn!("[SyncEngine] settle check failed: {e}");
                return;
            }
        };
        if let Some(loading) = tabs.iter().find(|tab| tab.is_loading()) {
            tracing::debug!("[SyncEngine] tab {} is still loading", loading.id);
            self.state.lock().gate.all_settled = false;
            return;
        }
        let auto_sync = {
            let mut state = self.state.lock();
            state.gate.all_settled = true;
            state.gate.auto_sync_enabled
        };
        if auto_sync {
            self.enqueue(SyncOp::SaveTabs, None);
        }
        self.update_sync_allowed_state();
    }

    // ---- queue ----

    fn enqueue(self: &Arc<Self>, op: SyncOp, waiter: Option<Waiter>) {
        self.queue.lock().push(op, waiter);
        self.schedule_next();
    }

    fn schedule_next(self: &Arc<Self>) {
        if !self.queue.lock().schedule() {
            return;
        }
        let inner = self.clone();
        let delay = self.config.step_delay();
        tokio::spawn(async move {
            sleep(delay).await;
            inner.step().await;
        });
    }

    async fn step(self: Arc<Self>) {
        let (settled, allowed) = {
            let state = self.state.lock();
            (state.gate.all_settled, state.gate.syncing_allowed)
        };
        let step = self.queue.lock().next_step(settled, allowed);
        match step {
            Step::Idle => tracing::debug!("[SyncQueue] exhausted"),
            Step::Locked => {
                tracing::debug!("[SyncQueue] locked, skipping this step");
                self.schedule_next();
            }
            Step::Settling => {
                tracing::debug!("[SyncQueue] tabs are still loading, skipping this step");
                self.request_settle_check();
                self.schedule_next();
            }
            Step::Drop(queued) => {
                tracing::debug!("[SyncQueue] syncing not allowed, dropping {}", queued.op);
                complete_all(
                    queued.waiters,
                    Err(SyncError::NotReady("syncing not allowed".to_string())),
                );
                self.schedule_next();
            }
            Step::Run(queued) => {
                let name = queued.op.to_string();
                tracing::debug!("[SyncQueue] locking for {name}");
                self.refresh_status();

                let inner = self.clone();
                let op = queued.op;
                let result = match tokio::spawn(async move { inner.run_op(op).await }).await {
                    Ok(result) => result,
                    Err(e) => Err(SyncError::from(e)),
                };
                self.queue.lock().release();

                match &result {
                    Ok(()) => tracing::debug!("[SyncQueue] {name} done"),
                    Err(e) if e.is_transient() => tracing::debug!("[SyncQueue] {name}: {e}"),
                    Err(e) => tracing::warn!("[SyncQueue] {name} failed: {e}"),
                }
                complete_all(queued.waiters, result);
                self.refresh_status();
                self.schedule_next();
            }
        }
    }

    async fn run_op(self: Arc<Self>, op: SyncOp) -> Result<(), SyncError> {
        match op {
            SyncOp::SaveTabs => self.save_tabs().await,
            SyncOp::RestoreTabs => self.restore_tabs().await,
            SyncOp::ApplyRecord(record) => self.apply_record(*record).await,
        }
    }

    // ---- operations ----

    async fn save_tabs(self: &Arc<Self>) -> Result<(), SyncError> {
        match self.stored_record().await? {
            Some(record) if !record.is_empty() => {
                self.publish(Some(record.author_peer_id), record.items).await
            }
            _ => self.publish(None, Vec::new()).await,
        }
    }

    async fn restore_tabs(self: &Arc<Self>) -> Result<(), SyncError> {
        match self.stored_record().await? {
            Some(record) if !record.is_empty() => self.apply_record(record).await,
            _ => self.publish(None, Vec::new()).await,
        }
    }

    /// Write the local tabs unless they already equal `stored` (the items of the snapshot last
    /// written by `author`).
    #[tracing::instrument(skip(self, stored), fields(stored = stored.len()))]
    async fn publish(
        self: &Arc<Self>,
        author: Option<PeerId>,
        stored: Vec<SnapshotEntry>,
    ) -> Result<(), SyncError> {
        let tabs = self.query_scope().await?;
        if tabs.is_empty() {
            return Err(SyncError::NotReady("no tabs in scope".to_string()));
        }
        let diff = {
            let state = self.state.lock();
            if !state.gate.syncing_allowed {
                return Err(SyncError::NotReady("syncing not allowed".to_string()));
            }
            diff_tabs(&tabs, &state.tracker, &stored, &self.policy)
        };

        if !diff.is_empty() {
            let (tx, rx) = oneshot::channel();
            self.schedule_write(
                PendingWrite {
                    tabs,
                    time: self.clock.now(),
                },
                tx,
            );
            return rx.await?;
        }

        tracing::debug!("[SyncEngine] no diff against stored snapshot");
        let now = self.clock.now();
        let mut state = self.state.lock();
        if let Some(author) = author.filter(|author| author != &state.peer_id) {
            state.dest_sync_times.insert(author, now);
        }
        Ok(())
    }

    fn schedule_write(self: &Arc<Self>, write: PendingWrite, waiter: Waiter) {
        if !self.writes.offer(write, Some(waiter)) {
            return;
        }
        let inner = self.clone();
        let delay = self.config.write_delay();
        tokio::spawn(async move {
            sleep(delay).await;
            if let Some((write, waiters)) = inner.writes.take() {
                let result = inner.write_tabs(write).await;
                if let Err(e) = &result {
                    tracing::warn!("[SyncEngine] snapshot write failed: {e}");
                }
                complete_all(waiters, result);
            }
        });
    }

    async fn write_tabs(&self, write: PendingWrite) -> Result<(), SyncError> {
        let record = {
            let state = self.state.lock();
            build_record(
                &write.tabs,
                &state.tracker,
                &state.peer_id,
                write.time,
                &state.source_sync_times,
                &self.policy,
            )
        };
        let mut entries = StoreEntries::new();
        entries.insert(
            SYNC_RECORD.to_string(),
            Value::String(encode_record(&record)?),
        );
        self.shared.set(entries).await?;
        tracing::info!(
            "[SyncEngine] published {} tabs at {}",
            record.items.len(),
            record.write_time
        );
        self.persist_state().await
    }

    /// Merge a snapshot written by another peer into the local tabs.
    #[tracing::instrument(skip(self, record), fields(author = %record.author_peer_id))]
    async fn apply_record(self: &Arc<Self>, record: SyncRecord) -> Result<(), SyncError> {
        let (peer, seen) = {
            let state = self.state.lock();
            let seen = state.source_sync_times.get(&record.author_peer_id).copied();
            (state.peer_id.clone(), seen)
        };
        if record.is_authored_by(&peer) {
            tracing::debug!("[SyncEngine] ignoring own snapshot");
            return Ok(());
        }
        if let Some(seen) = seen.filter(|seen| record.write_time < *seen) {
            tracing::debug!(
                "[SyncEngine] ignoring snapshot written at {}, already merged {seen}",
                record.write_time
            );
            return Ok(());
        }
        let tabs = self.query_scope().await?;

        let (creations, missing) = {
            let state = self.state.lock();
            let now = self.clock.now();
            let diff = diff_tabs(&tabs, &state.tracker, &record.items, &self.policy);
            let creations = select_creations(
                &diff.additional,
                &state.recent,
                &self.merge_context(&state, now),
            );
            (creations, diff.missing)
        };

        let mut tab_count = tabs.len();
        for entry in creations {
            tracing::debug!("[SyncEngine] creating tab {}", entry.url);
            match self
                .host
                .create_tab(NewTab::background(&entry.url, entry.pinned))
                .await
            {
                Ok(tab) => {
                    let mut state = self.state.lock();
                    let item = state.tracker.item_mut(tab.id);
                    item.original_url = Some(entry.url);
                    item.source = entry.source;
                    tab_count += 1;
                }
                Err(e) => tracing::warn!("[SyncEngine] could not create tab {}: {e}", entry.url),
            }
        }

        let removals = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let now = self.clock.now();
            let sync_time = sync_time_for(&record, &state.peer_id, &state.dest_sync_times);
            let ctx = MergeContext {
                local_peer: &state.peer_id,
                now,
                started_at: state.started_at,
                startup_window_ms: self.config.startup_window_ms,
                recreate_window_ms: self.config.recreate_window_ms,
                policy: &self.policy,
            };
            plan_removals(
                &mut state.tracker,
                &missing,
                &record.author_peer_id,
                sync_time,
                &ctx,
                tab_count,
            )
        };

        for removal in removals {
            if removal.placeholder_first {
                tracing::debug!("[SyncEngine] opening placeholder before closing the last tab");
                self.host
                    .create_tab(NewTab::background(&self.config.placeholder_url, false))
                    .await?;
            }
            tracing::debug!("[SyncEngine] removing tab {}", removal.id);
            if let Err(e) = self.host.remove_tab(removal.id).await {
                tracing::warn!("[SyncEngine] could not remove tab {}: {e}", removal.id);
            }
        }

        self.state
            .lock()
            .source_sync_times
            .entry(record.author_peer_id.clone())
            .and_modify(|seen| *seen = (*seen).max(record.write_time))
            .or_insert(record.write_time);
        self.persist_state().await
    }

    // ---- events ----

    async fn handle_event(self: &Arc<Self>, event: HostEvent) {
        match event {
            HostEvent::TabCreated(tab) => self.on_tab_created(&tab),
            HostEvent::TabLoading(tab) => {
                let now = self.clock.now();
                let mut state = self.state.lock();
                on_loading(
                    state.tracker.item_mut(tab.id),
                    &tab.url,
                    now,
                    self.config.redirect_window_ms,
                );
                state.gate.all_settled = false;
            }
            HostEvent::TabComplete(tab) => {
                let now = self.clock.now();
                {
                    let mut state = self.state.lock();
                    let replaced =
                        on_complete(state.tracker.item_mut(tab.id), &tab.url, now, &self.policy);
                    if let Some(url) = replaced {
                        state.recent.track(&url, now);
                    }
                }
                self.request_settle_check();
            }
            HostEvent::TabRemoved { id, window_closing } => {
                self.on_tab_removed(id, window_closing)
            }
            HostEvent::Redirect { id, source, target } => {
                on_redirect(self.state.lock().tracker.item_mut(id), &source, &target);
            }
            HostEvent::WindowCreated { normal } => {
                if normal {
                    self.state.lock().gate.normal_window_present = true;
                    self.update_sync_allowed_state();
                }
            }
            HostEvent::WindowRemoved => {
                if let Err(e) = self.refresh_window_presence().await {
                    tracing::warn!("[SyncEngine] window query failed: {e}");
                    self.state.lock().gate.normal_window_present = false;
                }
                self.update_sync_allowed_state();
            }
            HostEvent::StorageChanged(StorageArea::Shared, changes) => {
                for change in changes {
                    self.on_shared_change(change);
                }
            }
            HostEvent::StorageChanged(StorageArea::Local, _) => {}
            HostEvent::Command(command) => {
                if let Err(e) = self.apply_command(command, None).await {
                    tracing::warn!("[SyncEngine] command {command} failed: {e}");
                }
            }
        }
    }

    fn on_tab_created(&self, tab: &HostTab) {
        let mut state = self.state.lock();
        if tab.pending_url.is_none()
            && tab.status == TabStatus::Unloaded
            && !state.tracker.contains(tab.id)
        {
            if let Some(item) = state.recycled.reuse(&tab.url) {
                tracing::debug!("[SyncEngine] tab {} reuses recycled record", tab.id);
                state.tracker.insert(tab.id, item);
            }
        }
        state.gate.all_settled = false;
    }

    fn on_tab_removed(self: &Arc<Self>, id: TabId, window_closing: bool) {
        let now = self.clock.now();
        {
            let mut state = self.state.lock();
            if window_closing {
                if let Some(item) = state.tracker.get(id).cloned() {
                    state.recycled.stash(item, &self.policy);
                }
                return;
            }
            if let Some(item) = state.tracker.remove(id) {
                if !item.deleting {
                    if let Some(url) = item.closing_identity(&self.policy) {
                        state.recent.track(url, now);
                    }
                }
            }
        }
        self.request_settle_check();
    }

    fn on_shared_change(self: &Arc<Self>, change: StorageChange) {
        match change.key.as_str() {
            SYNC_ALL => {
                let Some(sync_all) = change.new_value.as_ref().and_then(Value::as_bool) else {
                    return;
                };
                tracing::debug!("[SyncEngine] sync all changed to {sync_all}");
                self.state.lock().sync_all = sync_all;
                self.update_sync_allowed_state();
            }
            SYNC_RECORD => {
                let Some(record) = decode_payload(change.new_value.as_ref()) else {
                    tracing::debug!("[SyncEngine] snapshot cleared or unreadable");
                    return;
                };
                let (own, auto_sync) = {
                    let state = self.state.lock();
                    (
                        record.is_authored_by(&state.peer_id),
                        state.gate.auto_sync_enabled,
                    )
                };
                if record.is_empty() {
                    tracing::debug!("[SyncEngine] ignoring empty snapshot");
                } else if own {
                    tracing::debug!("[SyncEngine] skipping storage change from self");
                } else if auto_sync {
                    self.enqueue(SyncOp::ApplyRecord(Box::new(record)), None);
                }
            }
            _ => {}
        }
    }

    async fn apply_command(
        self: &Arc<Self>,
        command: Command,
        waiter: Option<Waiter>,
    ) -> Result<(), SyncError> {
        tracing::debug!("[SyncEngine] command {command}");
        match command {
            Command::EnableAutoSync | Command::DisableAutoSync => {
                let enabled = command == Command::EnableAutoSync;
                settings::write_value(&self.local, AUTO_SYNC_ENABLED, &enabled).await?;
                self.state.lock().gate.set_auto_sync(enabled);
                self.update_sync_allowed_state();
            }
            Command::SyncAll | Command::SyncPinned => {
                let sync_all = command == Command::SyncAll;
                settings::write_value(&self.shared, SYNC_ALL, &sync_all).await?;
                self.state.lock().sync_all = sync_all;
                self.update_sync_allowed_state();
            }
            Command::SaveTabs => self.enqueue(SyncOp::SaveTabs, waiter),
            Command::RestoreTabs => self.enqueue(SyncOp::RestoreTabs, waiter),
        }
        Ok(())
    }
}
