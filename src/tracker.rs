use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    identity::UrlPolicy,
    properties::{PeerId, TabId, Timestamp},
};

/// Everything the engine knows about one open tab.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabItem {
    /// Last fully loaded url.
    #[serde(default)]
    pub url: Option<String>,
    /// The url other peers should use for this tab once redirects and in-page navigation have
    /// been collapsed.
    #[serde(default)]
    pub original_url: Option<String>,
    /// Pending redirect target while a navigation is in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub assumed_redirect: bool,
    /// Network level redirects observed during the current navigation, target -> source.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub redirects: HashMap<String, String>,
    /// Peer that originally created this tab, if it did not originate here.
    #[serde(default)]
    pub source: Option<PeerId>,
    #[serde(default)]
    pub update_time: Option<Timestamp>,
    /// Set once reconciliation decided to close the tab, so the close is not mistaken for a user
    /// action.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleting: bool,
}

impl TabItem {
    /// Identifier published for this tab: canonical when known, observed otherwise.
    pub fn published_url<'a>(&'a self, observed: &'a str) -> &'a str {
        self.original_url.as_deref().unwrap_or(observed)
    }

    /// Identity to remember when the tab goes away because of the user.
    pub fn closing_identity<'a>(&'a self, policy: &UrlPolicy) -> Option<&'a str> {
        policy.first_syncable([
            self.original_url.as_deref(),
            self.redirect_url.as_deref(),
            self.url.as_deref(),
        ])
    }

    pub fn is_stale(&self, now: Timestamp, expiry_ms: i64) -> bool {
        match self.update_time {
            Some(t) => now.saturating_sub(t) > expiry_ms,
            None => true,
        }
    }
}

/// In-memory map of open tabs, keyed by the host's transient handle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabTracker {
    items: BTreeMap<TabId, TabItem>,
}

impl TabTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: TabId) -> Option<&TabItem> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: TabId) -> Option<&mut TabItem> {
        self.items.get_mut(&id)
    }

    pub fn contains(&self, id: TabId) -> bool {
        self.items.contains_key(&id)
    }

    /// Record for `id`, created empty on first sight.
    pub fn item_mut(&mut self, id: TabId) -> &mut TabItem {
        self.items.entry(id).or_default()
    }

    pub fn insert(&mut self, id: TabId, item: TabItem) -> Option<TabItem> {
        self.items.insert(id, item)
    }

    pub fn remove(&mut self, id: TabId) -> Option<TabItem> {
        self.items.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TabId, &TabItem)> {
        self.items.iter()
    }

    pub fn items(&self) -> &BTreeMap<TabId, TabItem> {
        &self.items
    }

    /// Drop records of tabs that are no longer open and have not been updated within `expiry_ms`.
    /// Records of open tabs are always kept. Returns the number of purged records.
    pub fn purge_stale(
        &mut self,
        open: &BTreeSet<TabId>,
        now: Timestamp,
        expiry_ms: i64,
    ) -> usize {
        let before = self.items.len();
        self.items
            .retain(|id, item| open.contains(id) || !item.is_stale(now, expiry_ms));
        before - self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NEW_TAB_URL;
    use test_log::test;

    #[test]
    fn test_item_mut_creates_empty_record() {
        let mut tracker = TabTracker::new();
        assert!(!tracker.contains(TabId(1)));
        tracker.item_mut(TabId(1)).url = Some("https://a.example/".to_string());
        assert_eq!(tracker.len(), 1);
        assert_eq!(
            tracker.get(TabId(1)).and_then(|i| i.url.as_deref()),
            Some("https://a.example/")
        );
    }

    #[test]
    fn test_published_url_prefers_canonical() {
        let mut item = TabItem::default();
        assert_eq!(item.published_url("https://b.example/"), "https://b.example/");
        item.original_url = Some("https://a.example/".to_string());
        assert_eq!(item.published_url("https://b.example/"), "https://a.example/");
    }

    #[test]
    fn test_closing_identity_skips_ignored() {
        let policy = UrlPolicy::default();
        let item = TabItem {
            original_url: Some(NEW_TAB_URL.to_string()),
            url: Some("https://c.example/".to_string()),
            ..Default::default()
        };
        assert_eq!(item.closing_identity(&policy), Some("https://c.example/"));
    }

    #[test]
    fn test_purge_keeps_open_tabs() {
        let mut tracker = TabTracker::new();
        tracker.item_mut(TabId(1)).update_time = Some(0);
        tracker.item_mut(TabId(2)).update_time = Some(0);
        tracker.item_mut(TabId(3)).update_time = Some(9_000);
        tracker.item_mut(TabId(4));

        let open: BTreeSet<TabId> = [TabId(1)].into_iter().collect();
        let purged = tracker.purge_stale(&open, 10_000, 5_000);

        assert_eq!(purged, 2);
        assert!(tracker.contains(TabId(1)));
        assert!(!tracker.contains(TabId(2)));
        assert!(tracker.contains(TabId(3)));
        assert!(!tracker.contains(TabId(4)));
    }

    #[test]
    fn test_tracker_serializes_transient_fields_sparingly() {
        let mut tracker = TabTracker::new();
        let item = tracker.item_mut(TabId(3));
        item.url = Some("https://a.example/".to_string());
        item.source = Some(PeerId::from("desk"));
        let json = serde_json::to_value(&tracker).unwrap();
        let record = &json["3"];
        assert_eq!(record["source"], "desk");
        assert!(record.get("redirects").is_none());
        assert!(record.get("deleting").is_none());

        let back: TabTracker = serde_json::from_value(json).unwrap();
        assert_eq!(back, tracker);
    }

    #[test]
    fn test_ancient_update_time_is_stale() {
        let item = TabItem {
            update_time: Some(i64::MIN),
            ..Default::default()
        };
        assert!(item.is_stale(1_000, 5_000));
        assert!(!TabItem {
            update_time: Some(900),
            ..Default::default()
        }
        .is_stale(1_000, 5_000));
    }
}
