use crate::{
    identity::{normalize_url, UrlPolicy},
    properties::HostTab,
    snapshot::SnapshotEntry,
    tracker::TabTracker,
};

/// Set difference between the local tabs and a remote snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TabDiff {
    /// Remote entries with no local counterpart.
    pub additional: Vec<SnapshotEntry>,
    /// Local tabs with no remote counterpart.
    pub missing: Vec<HostTab>,
}

impl TabDiff {
    pub fn is_empty(&self) -> bool {
        self.additional.is_empty() && self.missing.is_empty()
    }
}

/// Match local tabs against remote entries one-to-one.
///
/// A remote entry matches a tab when its identifier equals the tab's observed url or the canonical
/// url recorded in `tracker`. Tabs with ignored urls take no part in the comparison.
pub fn diff_tabs(
    local: &[HostTab],
    tracker: &TabTracker,
    remote: &[SnapshotEntry],
    policy: &UrlPolicy,
) -> TabDiff {
    let mut additional: Vec<SnapshotEntry> = remote.to_vec();
    let mut missing = Vec::new();

    for tab in local.iter().filter(|tab| !policy.should_ignore(&tab.url)) {
        let observed = normalize_url(Some(&tab.url));
        let canonical = tracker
            .get(tab.id)
            .and_then(|item| item.original_url.as_deref())
            .map(|url| normalize_url(Some(url)));

        let matched = additional.iter().position(|entry| {
            let remote = normalize_url(Some(&entry.url));
            remote == observed || Some(remote) == canonical
        });
        match matched {
            Some(pos) => {
                additional.remove(pos);
            }
            None => missing.push(tab.clone()),
        }
    }

    tracing::debug!(
        "[Diff] {} additional, {} missing",
        additional.len(),
        missing.len()
    );
    TabDiff {
        additional,
        missing,
    }
}
