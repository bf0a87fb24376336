//! Short-term memory of closed tabs.
//!
//! [`RecentTabs`] remembers identifiers the user closed so that a lagging snapshot from another
//! peer does not bring them straight back. [`RecycleBin`] keeps the records of tabs that went
//! away because their whole window (or the host) closed, so the same tab restored later gets its
//! provenance and canonical identity back instead of looking like a brand new local tab.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::{
    identity::UrlPolicy,
    properties::Timestamp,
    tracker::TabItem,
};

#[derive(Clone, Debug, Default)]
pub struct RecentTabs {
    closed: HashMap<String, Timestamp>,
}

impl RecentTabs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, url: &str, now: Timestamp) {
        tracing::debug!("[RecentTabs] tracking closed url {url} at {now}");
        self.closed.insert(url.to_string(), now);
    }

    /// True when `url` was closed less than `window_ms` ago.
    pub fn is_suppressed(&self, url: &str, now: Timestamp, window_ms: i64) -> bool {
        self.closed
            .get(url)
            .map(|closed| now.saturating_sub(*closed) < window_ms)
            .unwrap_or(false)
    }

    pub fn purge(&mut self, now: Timestamp, window_ms: i64) -> usize {
        let before = self.closed.len();
        self.closed.retain(|_, closed| now.saturating_sub(*closed) <= window_ms);
        before - self.closed.len()
    }

    pub fn len(&self) -> usize {
        self.closed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closed.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct RecycleBin {
    by_url: BTreeMap<String, VecDeque<TabItem>>,
}

impl RecycleBin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stash a record under its observed url. Records without a syncable url are dropped.
    pub fn stash(&mut self, item: TabItem, policy: &UrlPolicy) -> bool {
        let Some(url) = item.url.clone() else {
            return false;
        };
        if policy.should_ignore(&url) {
            return false;
        }
        self.by_url.entry(url).or_default().push_back(item);
        true
    }

    /// Oldest stashed record for `url`, removed from the bin.
    pub fn reuse(&mut self, url: &str) -> Option<TabItem> {
        let queue = self.by_url.get_mut(url)?;
        let item = queue.pop_front();
        if queue.is_empty() {
            self.by_url.remove(url);
        }
        item
    }

    /// Drop records not updated within `expiry_ms`.
    pub fn purge(&mut self, now: Timestamp, expiry_ms: i64) -> usize {
        let mut purged = 0;
        self.by_url.retain(|_, queue| {
            let before = queue.len();
            queue.retain(|item| !item.is_stale(now, expiry_ms));
            purged += before - queue.len();
            !queue.is_empty()
        });
        purged
    }

    pub fn len(&self) -> usize {
        self.by_url.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }
}
