use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    str::FromStr,
};
use uuid::Uuid;

use crate::error::SyncError;

/// Milliseconds since the unix epoch.
pub type Timestamp = i64;

/// Per-peer timestamp bookkeeping (`peer id -> last time`).
pub type SyncTimes = BTreeMap<PeerId, Timestamp>;

/// Peer ID
///
/// A stable identifier for one running instance of the engine. Generated once from a random
/// UUID and persisted in the local store area, so it survives restarts of the host.
#[derive(Clone, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn generate() -> Self {
        PeerId(
            Uuid::new_v4()
                .simple()
                .encode_lower(&mut Uuid::encode_buffer())
                .to_string(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        PeerId(value.to_string())
    }
}

impl FromStr for PeerId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(SyncError::Serialization(
                "peer id must not be empty".to_string(),
            ));
        }
        Ok(PeerId(trimmed.to_string()))
    }
}

/// Transient host handle of an open tab. Only meaningful within one host session.
#[derive(
    Clone, Copy, Debug, Default, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord,
)]
#[serde(transparent)]
pub struct TabId(pub u64);

impl Display for TabId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Hash, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    /// Restored by the host but not loaded yet (session restore, discarded tabs).
    Unloaded,
    Loading,
    #[default]
    Complete,
}

/// A tab as reported by the host environment.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostTab {
    pub id: TabId,
    pub url: String,
    /// Url the tab is about to navigate to, when a navigation has been committed but not started.
    #[serde(default)]
    pub pending_url: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub status: TabStatus,
}

impl HostTab {
    pub fn new(id: u64, url: &str) -> Self {
        HostTab {
            id: TabId(id),
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn with_status(mut self, status: TabStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_loading(&self) -> bool {
        self.status == TabStatus::Loading
    }
}

/// Request to open a tab. Tabs opened by the engine never steal focus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTab {
    pub url: String,
    pub pinned: bool,
    pub active: bool,
}

impl NewTab {
    pub fn background(url: &str, pinned: bool) -> Self {
        NewTab {
            url: url.to_string(),
            pinned,
            active: false,
        }
    }
}

/// Which tabs take part in synchronization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TabScope {
    All,
    Pinned,
}

impl TabScope {
    pub fn from_sync_all(sync_all: bool) -> Self {
        if sync_all {
            TabScope::All
        } else {
            TabScope::Pinned
        }
    }

    pub fn includes(&self, tab: &HostTab) -> bool {
        match self {
            TabScope::All => true,
            TabScope::Pinned => tab.pinned,
        }
    }
}
