//! In-memory host and storage.
//!
//! [`MemoryHost`] behaves like a browser with a single normal window: user actions mutate its tab
//! list and emit the same [`HostEvent`]s a real host would. [`MemoryStore`] is a storage area that
//! notifies its subscribers of every change, and sharing one instance between several peers
//! stands in for a replicated area. Together they drive integration tests and the `simulate`
//! command of the CLI.

use parking_lot::Mutex;
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::{
    clock::Clock,
    config::SyncConfig,
    engine::SyncEngine,
    error::SyncError,
    event::{HostEvent, StorageArea, StorageChange},
    host::{KeyValueStore, StoreEntries, TabHost},
    properties::{HostTab, NewTab, TabId, TabScope, TabStatus},
    settings,
};

pub type SimEngine = SyncEngine<MemoryHost, MemoryStore, MemoryStore>;

#[derive(Debug, Default)]
struct Browser {
    tabs: BTreeMap<TabId, HostTab>,
    next_id: u64,
    window_open: bool,
    /// While false, tab queries answer "not ready".
    enumerable: bool,
}

/// A simulated browser.
#[derive(Clone, Debug)]
pub struct MemoryHost {
    browser: Arc<Mutex<Browser>>,
    events: UnboundedSender<HostEvent>,
}

impl MemoryHost {
    /// A host without windows, and the receiving end of its event stream.
    pub fn new() -> (Self, UnboundedReceiver<HostEvent>) {
        let (events, rx) = unbounded_channel();
        let browser = Browser {
            next_id: 1,
            enumerable: true,
            ..Default::default()
        };
        (
            MemoryHost {
                browser: Arc::new(Mutex::new(browser)),
                events,
            },
            rx,
        )
    }

    pub fn event_sender(&self) -> UnboundedSender<HostEvent> {
        self.events.clone()
    }

    fn emit(&self, event: HostEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("[MemoryHost] no engine listening");
        }
    }

    fn allocate(&self, url: &str, pinned: bool, status: TabStatus) -> HostTab {
        let mut browser = self.browser.lock();
        let id = TabId(browser.next_id);
        browser.next_id += 1;
        let tab = HostTab {
            id,
            url: url.to_string(),
            pending_url: None,
            pinned,
            status,
        };
        browser.tabs.insert(id, tab.clone());
        tab
    }

    fn set_tab(&self, id: TabId, url: &str, status: TabStatus) -> Option<HostTab> {
        let mut browser = self.browser.lock();
        let tab = browser.tabs.get_mut(&id)?;
        tab.url = url.to_string();
        tab.status = status;
        tab.pending_url = None;
        Some(tab.clone())
    }

    /// Open the normal window.
    pub fn open_window(&self) {
        self.browser.lock().window_open = true;
        self.emit(HostEvent::WindowCreated { normal: true });
    }

    /// Open the window with tabs restored from a previous session. Restored tabs start unloaded
    /// and load right after.
    pub fn restore_window(&self, urls: &[&str]) -> Vec<TabId> {
        self.open_window();
        let tabs: Vec<HostTab> = urls
            .iter()
            .map(|url| self.allocate(url, false, TabStatus::Unloaded))
            .collect();
        for tab in tabs.iter() {
            self.emit(HostEvent::TabCreated(tab.clone()));
        }
        for tab in tabs.iter() {
            self.navigate(tab.id, &tab.url);
        }
        tabs.iter().map(|tab| tab.id).collect()
    }

    /// Close the window with all its tabs, the way quitting the browser does.
    pub fn close_window(&self) {
        let ids: Vec<TabId> = {
            let mut browser = self.browser.lock();
            browser.window_open = false;
            std::mem::take(&mut browser.tabs).into_keys().collect()
        };
        for id in ids {
            self.emit(HostEvent::TabRemoved {
                id,
                window_closing: true,
            });
        }
        self.emit(HostEvent::WindowRemoved);
    }

    fn open(&self, url: &str, pinned: bool) -> HostTab {
        let mut tab = self.allocate(url, pinned, TabStatus::Loading);
        tab.pending_url = Some(url.to_string());
        self.emit(HostEvent::TabCreated(tab.clone()));
        self.navigate(tab.id, url);
        self.browser
            .lock()
            .tabs
            .get(&tab.id)
            .cloned()
            .unwrap_or(tab)
    }

    /// The user opens a tab and it loads `url`.
    pub fn open_tab(&self, url: &str) -> TabId {
        self.open(url, false).id
    }

    pub fn open_pinned_tab(&self, url: &str) -> TabId {
        self.open(url, true).id
    }

    /// Start loading `url` in tab `id`. The tab stays loading until [`MemoryHost::finish_loading`].
    pub fn start_loading(&self, id: TabId, url: &str) {
        if let Some(tab) = self.set_tab(id, url, TabStatus::Loading) {
            self.emit(HostEvent::TabLoading(tab));
        }
    }

    pub fn finish_loading(&self, id: TabId, url: &str) {
        if let Some(tab) = self.set_tab(id, url, TabStatus::Complete) {
            self.emit(HostEvent::TabComplete(tab));
        }
    }

    /// Load `url` in tab `id` from start to finish.
    pub fn navigate(&self, id: TabId, url: &str) {
        self.start_loading(id, url);
        self.finish_loading(id, url);
    }

    /// Load `chain[0]` in tab `id`, following network redirects through the rest of the chain.
    pub fn redirect_navigate(&self, id: TabId, chain: &[&str]) {
        let Some((first, rest)) = chain.split_first() else {
            return;
        };
        self.start_loading(id, first);
        let mut source = *first;
        for target in rest {
            self.emit(HostEvent::Redirect {
                id,
                source: source.to_string(),
                target: target.to_string(),
            });
            source = target;
        }
        self.finish_loading(id, source);
    }

    /// The user closes tab `id`.
    pub fn close_tab(&self, id: TabId) -> bool {
        let removed = self.browser.lock().tabs.remove(&id).is_some();
        if removed {
            self.emit(HostEvent::TabRemoved {
                id,
                window_closing: false,
            });
        }
        removed
    }

    pub fn set_enumerable(&self, enumerable: bool) {
        self.browser.lock().enumerable = enumerable;
    }

    pub fn tabs(&self) -> Vec<HostTab> {
        self.browser.lock().tabs.values().cloned().collect()
    }

    /// Urls of the open tabs, sorted.
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .browser
            .lock()
            .tabs
            .values()
            .map(|tab| tab.url.clone())
            .collect();
        urls.sort();
        urls
    }

    pub fn find(&self, url: &str) -> Option<TabId> {
        self.browser
            .lock()
            .tabs
            .values()
            .find(|tab| tab.url == url)
            .map(|tab| tab.id)
    }
}

impl TabHost for MemoryHost {
    async fn query_tabs(&self, scope: TabScope) -> Result<Option<Vec<HostTab>>, SyncError> {
        let browser = self.browser.lock();
        if !browser.enumerable {
            return Ok(None);
        }
        Ok(Some(
            browser
                .tabs
                .values()
                .filter(|tab| scope.includes(tab))
                .cloned()
                .collect(),
        ))
    }

    async fn create_tab(&self, tab: NewTab) -> Result<HostTab, SyncError> {
        if !self.browser.lock().window_open {
            return Err(SyncError::Host("no window to open a tab in".to_string()));
        }
        Ok(self.open(&tab.url, tab.pinned))
    }

    async fn remove_tab(&self, id: TabId) -> Result<(), SyncError> {
        if self.close_tab(id) {
            Ok(())
        } else {
            Err(SyncError::NotFound(format!("tab {id}")))
        }
    }

    async fn normal_window_present(&self) -> Result<bool, SyncError> {
        Ok(self.browser.lock().window_open)
    }
}

#[derive(Debug)]
struct StoreInner {
    values: BTreeMap<String, Value>,
    writes: BTreeMap<String, usize>,
    subscribers: Vec<UnboundedSender<HostEvent>>,
}

/// A storage area kept in memory.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    area: StorageArea,
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    pub fn new(area: StorageArea) -> Self {
        MemoryStore {
            area,
            inner: Arc::new(Mutex::new(StoreInner {
                values: BTreeMap::new(),
                writes: BTreeMap::new(),
                subscribers: Vec::new(),
            })),
        }
    }

    /// Deliver change notifications of this area to `events`.
    pub fn subscribe(&self, events: UnboundedSender<HostEvent>) {
        self.inner.lock().subscribers.push(events);
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.inner.lock().values.get(key).cloned()
    }

    /// Set `key` without counting a write or notifying anyone.
    pub fn insert(&self, key: &str, value: Value) {
        self.inner.lock().values.insert(key.to_string(), value);
    }

    /// Number of writes that changed `key`.
    pub fn writes_of(&self, key: &str) -> usize {
        self.inner.lock().writes.get(key).copied().unwrap_or(0)
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, SyncError> {
        Ok(self.value(key))
    }

    async fn set(&self, entries: StoreEntries) -> Result<(), SyncError> {
        let mut inner = self.inner.lock();
        let mut changes = Vec::new();
        for (key, value) in entries {
            let old_value = inner.values.get(&key).cloned();
            if old_value.as_ref() == Some(&value) {
                continue;
            }
            *inner.writes.entry(key.clone()).or_default() += 1;
            inner.values.insert(key.clone(), value.clone());
            changes.push(StorageChange {
                key,
                old_value,
                new_value: Some(value),
            });
        }
        if changes.is_empty() {
            return Ok(());
        }
        let event = HostEvent::StorageChanged(self.area, changes);
        inner
            .subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
        Ok(())
    }
}

/// One simulated peer: a browser, its private storage and its running engine.
pub struct SimPeer {
    pub name: String,
    pub host: MemoryHost,
    pub local: MemoryStore,
    pub engine: SimEngine,
}

impl SimPeer {
    /// Start a peer with auto sync enabled on `shared`. The browser window opens with `urls` (a
    /// blank tab when empty) and the engine starts processing events in a background task.
    pub async fn spawn(
        name: &str,
        shared: &MemoryStore,
        urls: &[&str],
        config: SyncConfig,
        clock: Clock,
    ) -> Result<SimPeer, SyncError> {
        let (host, events) = MemoryHost::new();
        let local = MemoryStore::new(StorageArea::Local);
        local.insert(settings::PEER_ID, Value::String(name.to_string()));
        local.insert(settings::AUTO_SYNC_ENABLED, Value::Bool(true));
        shared.subscribe(host.event_sender());

        host.open_window();
        if urls.is_empty() {
            host.open_tab(&config.placeholder_url);
        }
        for url in urls {
            host.open_tab(url);
        }

        let engine =
            SyncEngine::start_with_clock(host.clone(), local.clone(), shared.clone(), config, clock)
                .await?;
        tokio::spawn({
            let engine = engine.clone();
            async move { engine.run(events).await }
        });
        Ok(SimPeer {
            name: name.to_string(),
            host,
            local,
            engine,
        })
    }

    /// Open tab urls that take part in synchronization, sorted.
    pub fn synced_urls(&self, config: &SyncConfig) -> Vec<String> {
        let policy = config.url_policy();
        self.host
            .urls()
            .into_iter()
            .filter(|url| !policy.should_ignore(url))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test(tokio::test)]
    async fn test_host_emits_navigation_events() {
        let (host, mut events) = MemoryHost::new();
        host.open_window();
        let id = host.open_tab("https://a.example/");
        host.redirect_navigate(id, &["https://b.example/", "https://c.example/"]);
        host.close_tab(id);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event.to_string());
        }
        assert_eq!(
            seen,
            vec![
                "WindowCreated(normal: true)".to_string(),
                format!("TabCreated({id} https://a.example/)"),
                format!("TabLoading({id} https://a.example/)"),
                format!("TabComplete({id} https://a.example/)"),
                format!("TabLoading({id} https://b.example/)"),
                format!("Redirect({id} https://b.example/ -> https://c.example/)"),
                format!("TabComplete({id} https://c.example/)"),
                format!("TabRemoved({id}, window_closing: false)"),
            ]
        );
    }

    #[test(tokio::test)]
    async fn test_host_queries_respect_scope_and_readiness() {
        let (host, _events) = MemoryHost::new();
        host.open_window();
        host.open_tab("https://a.example/");
        host.open_pinned_tab("https://b.example/");

        let all = host.query_tabs(TabScope::All).await.unwrap().unwrap();
        assert_eq!(all.len(), 2);
        let pinned = host.query_tabs(TabScope::Pinned).await.unwrap().unwrap();
        assert_eq!(pinned.len(), 1);
        assert_eq!(pinned[0].url, "https://b.example/");

        host.set_enumerable(false);
        assert!(host.query_tabs(TabScope::All).await.unwrap().is_none());
        assert!(host.remove_tab(TabId(99)).await.is_err());
    }

    #[test(tokio::test)]
    async fn test_store_notifies_only_real_changes() {
        let store = MemoryStore::new(StorageArea::Shared);
        let (tx, mut rx) = unbounded_channel();
        store.subscribe(tx);

        let mut entries = StoreEntries::new();
        entries.insert("sync_all".to_string(), Value::Bool(true));
        store.set(entries.clone()).await.unwrap();
        store.set(entries).await.unwrap();

        assert_eq!(store.writes_of("sync_all"), 1);
        match rx.try_recv().unwrap() {
            HostEvent::StorageChanged(StorageArea::Shared, changes) => {
                assert_eq!(changes.len(), 1);
                assert_eq!(changes[0].new_value, Some(Value::Bool(true)));
                assert_eq!(changes[0].old_value, None);
            }
            other => panic!("unexpected event {other}"),
        }
        assert!(rx.try_recv().is_err());
    }
}
