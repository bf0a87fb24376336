//! Shared test utilities for engine tests

use serde_json::Value;
use std::time::Duration;

use crate::{
    clock::Clock,
    config::SyncConfig,
    host::{KeyValueStore, StoreEntries},
    properties::{PeerId, Timestamp},
    settings::SYNC_RECORD,
    sim::{MemoryStore, SimPeer},
    snapshot::{encode_record, SnapshotEntry, SyncRecord},
};

pub const A: &str = "https://a.example/";
pub const B: &str = "https://b.example/";
pub const C: &str = "https://c.example/";
pub const D: &str = "https://d.example/";

/// Wall time the test clock starts at.
pub const EPOCH: Timestamp = 1_700_000_000_000;

pub fn test_clock() -> Clock {
    Clock::starting_at(EPOCH)
}

/// Long enough for settle checks, queue steps and the write debounce of one round of activity.
pub async fn settle() {
    tokio::time::sleep(Duration::from_secs(12)).await;
}

pub async fn spawn_peer(name: &str, shared: &MemoryStore, urls: &[&str]) -> SimPeer {
    SimPeer::spawn(name, shared, urls, SyncConfig::default(), test_clock())
        .await
        .unwrap()
}

/// A snapshot written by a peer that only exists in the test.
pub fn foreign_record(
    author: &str,
    urls: &[&str],
    write_time: Timestamp,
    peer_times: &[(&str, Timestamp)],
) -> SyncRecord {
    SyncRecord {
        items: urls
            .iter()
            .map(|url| SnapshotEntry::new(url, PeerId::from(author), false))
            .collect(),
        author_peer_id: PeerId::from(author),
        write_time,
        peer_sync_times: peer_times
            .iter()
            .map(|(peer, time)| (PeerId::from(*peer), *time))
            .collect(),
    }
}

pub async fn store_record(shared: &MemoryStore, record: &SyncRecord) {
    let mut entries = StoreEntries::new();
    entries.insert(
        SYNC_RECORD.to_string(),
        Value::String(encode_record(record).unwrap()),
    );
    shared.set(entries).await.unwrap();
}

/// Urls of the stored snapshot, sorted.
pub async fn published_urls(peer: &SimPeer) -> Vec<String> {
    let record = peer.engine.stored_record().await.unwrap().unwrap();
    let mut urls: Vec<String> = record.items.into_iter().map(|entry| entry.url).collect();
    urls.sort();
    urls
}

pub fn strings(urls: &[&str]) -> Vec<String> {
    urls.iter().map(|url| url.to_string()).collect()
}
