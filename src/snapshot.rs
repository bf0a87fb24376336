//! The shared snapshot record and its storage payload.
//!
//! A snapshot is always a full replacement of the author's view. It is stored as
//! `base64(zstd(json))` to stay inside the per-item quota of synchronized storage areas. Payloads
//! written before compression was introduced (a bare JSON object or JSON text) still decode.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt::Write, io::Cursor};

use crate::{
    error::SyncError,
    properties::{PeerId, SyncTimes, Timestamp},
};

const COMPRESSION_LEVEL: i32 = 3;

/// One tab as published by a peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Canonical identifier when known, observed identifier otherwise.
    pub url: String,
    /// Peer credited with originally creating the tab.
    #[serde(default)]
    pub source: Option<PeerId>,
    #[serde(default)]
    pub pinned: bool,
}

impl SnapshotEntry {
    pub fn new(url: &str, source: PeerId, pinned: bool) -> Self {
        SnapshotEntry {
            url: url.to_string(),
            source: Some(source),
            pinned,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    #[serde(default)]
    pub items: Vec<SnapshotEntry>,
    pub author_peer_id: PeerId,
    pub write_time: Timestamp,
    /// The author's `source_sync_times` at write time.
    #[serde(default)]
    pub peer_sync_times: SyncTimes,
}

impl SyncRecord {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_authored_by(&self, peer: &PeerId) -> bool {
        &self.author_peer_id == peer
    }

    /// Human readable dump, marking entries and times that concern `me`.
    pub fn describe(&self, me: Option<&PeerId>) -> Result<String, SyncError> {
        let mark = |peer: &PeerId| {
            if Some(peer) == me {
                format!("{peer} (me)")
            } else {
                peer.to_string()
            }
        };
        let mut out = String::new();
        writeln!(out, "author: {}", mark(&self.author_peer_id))?;
        writeln!(out, "time: {}", self.write_time)?;
        writeln!(out, "peer sync times:")?;
        for (peer, time) in self.peer_sync_times.iter() {
            writeln!(out, "    {}: {time}", mark(peer))?;
        }
        writeln!(out, "items ({}):", self.items.len())?;
        for entry in self.items.iter() {
            let source = entry.source.as_ref().map(&mark).unwrap_or_default();
            let pinned = if entry.pinned { " pinned" } else { "" };
            writeln!(out, "    [{source}]{pinned} {}", entry.url)?;
        }
        Ok(out)
    }
}

pub fn encode_record(record: &SyncRecord) -> Result<String, SyncError> {
    let json = serde_json::to_vec(record)?;
    let compressed = zstd::stream::encode_all(Cursor::new(json), COMPRESSION_LEVEL)
        .map_err(|e| SyncError::Compression(format!("zstd encode failed: {e}")))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
}

pub fn decode_record(payload: &str) -> Result<SyncRecord, SyncError> {
    let trimmed = payload.trim();
    if trimmed.starts_with('{') {
        tracing::debug!("[Snapshot] decoding uncompressed legacy payload");
        return Ok(serde_json::from_str(trimmed)?);
    }
    let compressed = base64::engine::general_purpose::STANDARD.decode(trimmed)?;
    let json = zstd::stream::decode_all(Cursor::new(compressed))
        .map_err(|e| SyncError::Compression(format!("zstd decode failed: {e}")))?;
    Ok(serde_json::from_slice(&json)?)
}

/// Decode a stored value. Absent, malformed or undecodable payloads all read as "no snapshot".
pub fn decode_payload(value: Option<&Value>) -> Option<SyncRecord> {
    let decoded = match value? {
        Value::Null => return None,
        Value::String(payload) if payload.is_empty() => return None,
        Value::String(payload) => decode_record(payload),
        legacy @ Value::Object(_) => {
            serde_json::from_value(legacy.clone()).map_err(SyncError::from)
        }
        other => Err(SyncError::Serialization(format!(
            "unexpected snapshot payload: {other}"
        ))),
    };
    match decoded {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!("[Snapshot] ignoring undecodable snapshot: {e}");
            None
        }
    }
}
