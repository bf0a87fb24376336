use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::error::SyncError;

/// Command interface between a user interface (popup, CLI) and the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Turn automatic synchronization on. The next time syncing is allowed a merge runs.
    EnableAutoSync,
    DisableAutoSync,
    /// Synchronize every tab.
    SyncAll,
    /// Synchronize pinned tabs only.
    SyncPinned,
    /// Publish the local tabs now.
    SaveTabs,
    /// Merge the stored snapshot now.
    RestoreTabs,
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Command::EnableAutoSync => write!(f, "start"),
            Command::DisableAutoSync => write!(f, "stop"),
            Command::SyncAll => write!(f, "syncAll"),
            Command::SyncPinned => write!(f, "syncPinned"),
            Command::SaveTabs => write!(f, "saveTabs"),
            Command::RestoreTabs => write!(f, "restoreTabs"),
        }
    }
}

impl FromStr for Command {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Command::EnableAutoSync),
            "stop" => Ok(Command::DisableAutoSync),
            "syncAll" => Ok(Command::SyncAll),
            "syncPinned" => Ok(Command::SyncPinned),
            "saveTabs" => Ok(Command::SaveTabs),
            "restoreTabs" => Ok(Command::RestoreTabs),
            other => Err(SyncError::NotFound(format!("unknown command '{other}'"))),
        }
    }
}

/// What a status indicator shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Auto sync is on and the engine follows tab and snapshot changes.
    Converged,
    /// Auto sync is off.
    #[default]
    Disabled,
    /// A queued operation holds the sync lock.
    Merging,
    /// Auto sync is on but there is no normal window or tabs are still loading.
    Blocked,
}

impl SyncStatus {
    pub fn evaluate(locked: bool, auto_sync_enabled: bool, syncing_allowed: bool) -> SyncStatus {
        match (locked, auto_sync_enabled, syncing_allowed) {
            (true, _, _) => SyncStatus::Merging,
            (false, true, true) => SyncStatus::Converged,
            (false, true, false) => SyncStatus::Blocked,
            (false, false, _) => SyncStatus::Disabled,
        }
    }
}

impl Display for SyncStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            SyncStatus::Converged => write!(f, "Converged"),
            SyncStatus::Disabled => write!(f, "Disabled"),
            SyncStatus::Merging => write!(f, "Merging"),
            SyncStatus::Blocked => write!(f, "Blocked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_command_names_round_trip() {
        for command in [
            Command::EnableAutoSync,
            Command::DisableAutoSync,
            Command::SyncAll,
            Command::SyncPinned,
            Command::SaveTabs,
            Command::RestoreTabs,
        ] {
            assert_eq!(command.to_string().parse::<Command>().unwrap(), command);
        }
        assert!("reboot".parse::<Command>().is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(SyncStatus::evaluate(true, false, false), SyncStatus::Merging);
        assert_eq!(SyncStatus::evaluate(false, true, true), SyncStatus::Converged);
        assert_eq!(SyncStatus::evaluate(false, true, false), SyncStatus::Blocked);
        assert_eq!(SyncStatus::evaluate(false, false, true), SyncStatus::Disabled);
    }
}
