//! Seams to the environment the engine runs in.
//!
//! A [`TabHost`] is the browser (or anything else that owns a list of open items) and a
//! [`KeyValueStore`] is one storage area. The engine uses one store for state private to this
//! peer and another one that the environment replicates between peers.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::{
    error::SyncError,
    properties::{HostTab, NewTab, TabId, TabScope},
};

pub type StoreEntries = BTreeMap<String, Value>;

pub trait TabHost: Send + Sync + 'static {
    /// Tabs in `scope`, across all normal windows. `None` while the host cannot enumerate tabs.
    fn query_tabs(
        &self,
        scope: TabScope,
    ) -> impl std::future::Future<Output = Result<Option<Vec<HostTab>>, SyncError>> + Send;

    /// Open a tab and return it once the host assigned its handle.
    fn create_tab(
        &self,
        tab: NewTab,
    ) -> impl std::future::Future<Output = Result<HostTab, SyncError>> + Send;

    fn remove_tab(
        &self,
        id: TabId,
    ) -> impl std::future::Future<Output = Result<(), SyncError>> + Send;

    /// Whether at least one regular (non-popup, non-devtools) window exists.
    fn normal_window_present(
        &self,
    ) -> impl std::future::Future<Output = Result<bool, SyncError>> + Send;
}

pub trait KeyValueStore: Send + Sync + 'static {
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<Value>, SyncError>> + Send;

    /// Write all `entries` at once. Subscribers of the area see one change notification.
    fn set(
        &self,
        entries: StoreEntries,
    ) -> impl std::future::Future<Output = Result<(), SyncError>> + Send;
}
