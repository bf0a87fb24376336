//! Decisions of the reconciliation protocol, kept free of I/O.
//!
//! The engine gathers the current tabs, the stored snapshot and its own bookkeeping, asks these
//! functions what to create, remove or publish, and then performs the host calls itself.

use crate::{
    cache::RecentTabs,
    identity::UrlPolicy,
    properties::{HostTab, PeerId, SyncTimes, TabId, Timestamp},
    snapshot::{SnapshotEntry, SyncRecord},
    tracker::TabTracker,
};

/// Local facts a merge decision depends on.
#[derive(Clone, Copy, Debug)]
pub struct MergeContext<'a> {
    pub local_peer: &'a PeerId,
    pub now: Timestamp,
    pub started_at: Timestamp,
    pub startup_window_ms: i64,
    pub recreate_window_ms: i64,
    pub policy: &'a UrlPolicy,
}

impl MergeContext<'_> {
    pub fn in_startup_window(&self) -> bool {
        self.now.saturating_sub(self.started_at) <= self.startup_window_ms
    }
}

/// A tab the merge decided to close.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Removal {
    pub id: TabId,
    /// The tab is the last one in scope: open a placeholder before closing it.
    pub placeholder_first: bool,
}

/// Latest time the author of `record` is known to have seen the local peer's state.
///
/// Either the author says so through its `peer_sync_times`, or an earlier publish found nothing
/// to write against the author's snapshot.
pub fn sync_time_for(
    record: &SyncRecord,
    local_peer: &PeerId,
    dest_times: &SyncTimes,
) -> Timestamp {
    let announced = record.peer_sync_times.get(local_peer).copied().unwrap_or(0);
    let confirmed = dest_times.get(&record.author_peer_id).copied().unwrap_or(0);
    if confirmed > announced {
        tracing::debug!(
            "[Reconcile] sync time for {} moved {announced} -> {confirmed}",
            record.author_peer_id
        );
    }
    announced.max(confirmed)
}

/// Remote entries that should be opened locally.
pub fn select_creations(
    additional: &[SnapshotEntry],
    recent: &RecentTabs,
    ctx: &MergeContext<'_>,
) -> Vec<SnapshotEntry> {
    additional
        .iter()
        .filter(|entry| {
            if ctx.policy.should_ignore(&entry.url) {
                tracing::debug!("[Reconcile] skipping ignored url {}", entry.url);
                false
            } else if entry.source.as_ref() == Some(ctx.local_peer) {
                tracing::debug!("[Reconcile] skipping {} created on this peer", entry.url);
                false
            } else if recent.is_suppressed(&entry.url, ctx.now, ctx.recreate_window_ms) {
                tracing::debug!("[Reconcile] skipping recently closed {}", entry.url);
                false
            } else {
                true
            }
        })
        .cloned()
        .collect()
}

/// Local tabs that `author`'s snapshot no longer lists and that may safely be closed.
///
/// A tab goes only when `author` created it, or when `author` has provably seen the tab's current
/// state (`sync_time` at or after the tab's last update). Chosen tabs are marked `deleting` in
/// `tracker`. `tab_count` is the number of tabs currently in scope, newly created ones included.
pub fn plan_removals(
    tracker: &mut TabTracker,
    missing: &[HostTab],
    author: &PeerId,
    sync_time: Timestamp,
    ctx: &MergeContext<'_>,
    mut tab_count: usize,
) -> Vec<Removal> {
    if missing.len() != 1 && ctx.in_startup_window() {
        tracing::debug!(
            "[Reconcile] startup window: not removing {} tabs at once",
            missing.len()
        );
        return Vec::new();
    }

    let mut removals = Vec::new();
    for tab in missing {
        let item = tracker.item_mut(tab.id);
        let update_time = item.update_time.unwrap_or(ctx.started_at);
        let from_author = item.source.as_ref() == Some(author);
        if !from_author && (sync_time == 0 || sync_time < update_time) {
            tracing::debug!(
                "[Reconcile] keeping tab {} {} updated at {update_time}, {author} synced at {sync_time}",
                tab.id,
                tab.url
            );
            continue;
        }
        item.deleting = true;
        tab_count = tab_count.saturating_sub(1);
        removals.push(Removal {
            id: tab.id,
            placeholder_first: tab_count == 0,
        });
    }
    removals
}

/// The snapshot this peer would publish for `tabs`.
pub fn build_record(
    tabs: &[HostTab],
    tracker: &TabTracker,
    local_peer: &PeerId,
    write_time: Timestamp,
    source_times: &SyncTimes,
    policy: &UrlPolicy,
) -> SyncRecord {
    let items = tabs
        .iter()
        .filter(|tab| !policy.should_ignore(&tab.url))
        .map(|tab| {
            let item = tracker.get(tab.id);
            let url = item
                .map(|item| item.published_url(&tab.url))
                .unwrap_or(tab.url.as_str());
            let source = item
                .and_then(|item| item.source.clone())
                .unwrap_or_else(|| local_peer.clone());
            SnapshotEntry::new(url, source, tab.pinned)
        })
        .collect();
    SyncRecord {
        items,
        author_peer_id: local_peer.clone(),
        write_time,
        peer_sync_times: source_times.clone(),
    }
}
