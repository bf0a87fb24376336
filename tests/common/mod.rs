//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::time::Duration;
use tabsync_core::{
    clock::Clock,
    config::SyncConfig,
    settings::SYNC_RECORD,
    sim::{MemoryStore, SimPeer},
};

pub const A: &str = "https://a.example/";
pub const B: &str = "https://b.example/";
pub const C: &str = "https://c.example/";

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Peers started by one test share a clock, as if their hosts ran on synchronized machines.
#[allow(dead_code)]
pub fn clock() -> Clock {
    Clock::starting_at(1_700_000_000_000)
}

#[allow(dead_code)]
pub async fn peer(name: &str, shared: &MemoryStore, urls: &[&str], clock: Clock) -> SimPeer {
    SimPeer::spawn(name, shared, urls, SyncConfig::default(), clock)
        .await
        .unwrap()
}

/// Let one round of settle checks, queue steps and debounced writes play out.
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_secs(15)).await;
}

#[allow(dead_code)]
pub fn synced(peer: &SimPeer) -> Vec<String> {
    peer.synced_urls(&SyncConfig::default())
}

#[allow(dead_code)]
pub fn strings(urls: &[&str]) -> Vec<String> {
    urls.iter().map(|url| url.to_string()).collect()
}

#[allow(dead_code)]
pub fn snapshot_writes(shared: &MemoryStore) -> usize {
    shared.writes_of(SYNC_RECORD)
}
