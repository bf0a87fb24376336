//! Persisted settings and engine state.
//!
//! Every key lives in one storage area. On startup each key is read, and a key that is absent or
//! unreadable is initialized with its default, which is written back so the next start (and any
//! user interface reading the same area) sees the same value.

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error::SyncError,
    host::{KeyValueStore, StoreEntries},
    properties::{PeerId, SyncTimes},
    tracker::TabTracker,
};

/// Local area.
pub const PEER_ID: &str = "peer_id";
pub const AUTO_SYNC_ENABLED: &str = "auto_sync_enabled";
pub const SOURCE_SYNC_TIMES: &str = "source_sync_times";
pub const DEST_SYNC_TIMES: &str = "dest_sync_times";
pub const TAB_MAP: &str = "tab_map";
/// Shared area.
pub const SYNC_ALL: &str = "sync_all";
pub const SYNC_RECORD: &str = "sync_record";

pub async fn read_value<T, S>(store: &S, key: &str) -> Result<Option<T>, SyncError>
where
    T: DeserializeOwned,
    S: KeyValueStore,
{
    match store.get(key).await? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}

pub fn entry<T: Serialize>(
    entries: &mut StoreEntries,
    key: &str,
    value: &T,
) -> Result<(), SyncError> {
    entries.insert(key.to_string(), serde_json::to_value(value)?);
    Ok(())
}

pub async fn write_value<T, S>(store: &S, key: &str, value: &T) -> Result<(), SyncError>
where
    T: Serialize,
    S: KeyValueStore,
{
    let mut entries = StoreEntries::new();
    entry(&mut entries, key, value)?;
    store.set(entries).await
}

async fn init_value<T, S, F>(store: &S, key: &str, default: F) -> Result<T, SyncError>
where
    T: Serialize + DeserializeOwned + std::fmt::Debug,
    S: KeyValueStore,
    F: FnOnce() -> T,
{
    match read_value(store, key).await {
        Ok(Some(value)) => {
            tracing::debug!("[Settings] {key}: {value:?}");
            return Ok(value);
        }
        Ok(None) => {}
        Err(SyncError::Serialization(msg)) => {
            tracing::warn!("[Settings] resetting unreadable {key}: {msg}");
        }
        Err(e) => return Err(e),
    }
    let value = default();
    tracing::debug!("[Settings] {key} initialized to {value:?}");
    write_value(store, key, &value).await?;
    Ok(value)
}

/// Everything the engine restores at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub peer_id: PeerId,
    pub auto_sync_enabled: bool,
    pub sync_all: bool,
    pub source_sync_times: SyncTimes,
    pub dest_sync_times: SyncTimes,
    /// Tracker of the previous session. Its handles are stale; records are only recycled.
    pub tab_map: TabTracker,
}

impl Settings {
    pub async fn load<L, R>(local: &L, shared: &R) -> Result<Settings, SyncError>
    where
        L: KeyValueStore,
        R: KeyValueStore,
    {
        Ok(Settings {
            peer_id: init_value(local, PEER_ID, PeerId::generate).await?,
            auto_sync_enabled: init_value(local, AUTO_SYNC_ENABLED, || false).await?,
            sync_all: init_value(shared, SYNC_ALL, || true).await?,
            source_sync_times: init_value(local, SOURCE_SYNC_TIMES, SyncTimes::new).await?,
            dest_sync_times: init_value(local, DEST_SYNC_TIMES, SyncTimes::new).await?,
            tab_map: init_value(local, TAB_MAP, TabTracker::new).await?,
        })
    }
}

/// Local entries written after every snapshot write and merge.
pub fn state_entries(
    tracker: &TabTracker,
    source_sync_times: &SyncTimes,
    dest_sync_times: &SyncTimes,
) -> Result<StoreEntries, SyncError> {
    let mut entries = StoreEntries::new();
    entry(&mut entries, TAB_MAP, tracker)?;
    entry(&mut entries, SOURCE_SYNC_TIMES, source_sync_times)?;
    entry(&mut entries, DEST_SYNC_TIMES, dest_sync_times)?;
    Ok(entries)
}
