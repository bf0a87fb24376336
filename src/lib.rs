//! # tabsync-core
//!
//! A leaderless reconciliation engine that keeps the open tabs of several browser instances
//! consistent through a small, eventually-consistent key/value area they all share.
//!
//! ## Overview
//!
//! Every instance (a *peer*) runs one [`engine::SyncEngine`]. The engine listens to tab, window
//! and storage events from its host, publishes the peer's tab list as a compressed snapshot under
//! a single shared key, and merges snapshots written by other peers. There is no coordinator:
//! convergence follows from three rules applied identically on every peer.
//!
//! - **Provenance**: each snapshot entry remembers which peer first opened it, so a peer never
//!   recreates a tab it created itself and only closes tabs another peer has provably seen
//! - **Sync times**: per-peer timestamps record how far each pair of peers has caught up, so a
//!   tab missing from a stale snapshot is kept instead of deleted
//! - **Canonical identity**: redirect chains, client side redirects and in-page navigation are
//!   collapsed into the url the tab was first opened with, so peers that end up on different
//!   final urls still agree
//!
//! ### Key Features
//!
//! - **Debounced publishing**: bursts of tab events produce one snapshot write
//! - **Serialized operations**: one queue runs publishes and merges one at a time
//! - **Never empty**: a placeholder opens before a merge would close the last tab in scope
//! - **Session recycling**: tab records survive a host restart and are matched back to restored
//!   tabs by url
//! - **Compact storage**: snapshots are JSON compressed with zstd and base64 encoded; plain JSON
//!   from older writers still decodes
//!
//! ## Architecture
//!
//! - **[`engine`]**: the service: event handling, queue steps, publish and merge
//! - **[`host`]**: the [`host::TabHost`] and [`host::KeyValueStore`] seams to the environment
//! - **[`redirect`]** and **[`tracker`]**: per-tab navigation state and canonical identity
//! - **[`diff`]** and **[`reconcile`]**: pure decisions of the reconciliation protocol
//! - **[`snapshot`]**: the shared record and its wire format
//! - **[`queue`]**, **[`schedule`]** and **[`gate`]**: operation serialization, debouncing and
//!   the conditions under which syncing is allowed
//! - **[`settings`]** and **[`config`]**: persisted state and timing configuration
//! - **[`sim`]**: in-memory host and store used by tests and the `tabsync` CLI
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tabsync_core::{
//!     clock::Clock, commands::Command, config::SyncConfig, event::StorageArea,
//!     sim::{MemoryStore, SimPeer},
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), tabsync_core::SyncError> {
//!     let shared = MemoryStore::new(StorageArea::Shared);
//!     let config = SyncConfig::default();
//!     let clock = Clock::new();
//!
//!     let laptop = SimPeer::spawn("laptop", &shared, &["https://a.example/"], config.clone(), clock).await?;
//!     let desk = SimPeer::spawn("desk", &shared, &[], config.clone(), clock).await?;
//!
//!     // Publish right away instead of waiting for the next tab event.
//!     laptop.engine.command(Command::SaveTabs).await?;
//!     println!("desk has {:?}", desk.synced_urls(&config));
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **default**: the library
//! - **bin**: the `tabsync` CLI (snapshot decode/encode, multi-peer simulation)

pub mod cache;
pub mod clock;
pub mod commands;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod event;
pub mod gate;
pub mod host;
pub mod identity;
pub mod properties;
pub mod queue;
pub mod reconcile;
pub mod redirect;
pub mod schedule;
pub mod settings;
pub mod sim;
pub mod snapshot;
#[cfg(test)]
mod tests;
pub mod tracker;

pub use error::*;
