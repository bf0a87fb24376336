use serde::{Deserialize, Serialize};

use crate::commands::SyncStatus;

/// Conditions that decide whether the engine may touch tabs or the shared snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncGate {
    /// A regular browser window exists. Without one the host is starting up or shutting down and
    /// its tab list cannot be trusted.
    pub normal_window_present: bool,
    pub auto_sync_enabled: bool,
    /// No tab in scope was loading at the last settle check.
    pub all_settled: bool,
    /// Latched by [`SyncGate::update_allowed`]: opens once a window exists and tabs settled, closes
    /// only when the last window goes.
    pub syncing_allowed: bool,
    /// A merge should run as soon as syncing becomes allowed.
    pub merge_pending: bool,
}

impl SyncGate {
    pub fn new(auto_sync_enabled: bool) -> Self {
        SyncGate {
            normal_window_present: false,
            auto_sync_enabled,
            all_settled: true,
            syncing_allowed: false,
            merge_pending: auto_sync_enabled,
        }
    }

    /// Re-evaluate `syncing_allowed`. Returns true when the pending merge should run now, which
    /// also clears it.
    pub fn update_allowed(&mut self) -> bool {
        if !self.normal_window_present {
            self.syncing_allowed = false;
            return false;
        }
        if !self.all_settled {
            return false;
        }
        self.syncing_allowed = true;
        std::mem::take(&mut self.merge_pending)
    }

    pub fn set_auto_sync(&mut self, enabled: bool) {
        self.auto_sync_enabled = enabled;
        self.merge_pending = enabled;
    }

    pub fn status(&self, locked: bool) -> SyncStatus {
        SyncStatus::evaluate(locked, self.auto_sync_enabled, self.syncing_allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_no_window_closes_the_gate() {
        let mut gate = SyncGate::new(true);
        gate.syncing_allowed = true;
        assert!(!gate.update_allowed());
        assert!(!gate.syncing_allowed);
        assert!(gate.merge_pending);
    }

    #[test]
    fn test_pending_merge_fires_once() {
        let mut gate = SyncGate::new(true);
        gate.normal_window_present = true;
        assert!(gate.update_allowed());
        assert!(gate.syncing_allowed);
        assert!(!gate.update_allowed());
    }

    #[test]
    fn test_loading_tabs_defer_but_do_not_revoke() {
        let mut gate = SyncGate::new(false);
        gate.normal_window_present = true;
        gate.all_settled = false;
        assert!(!gate.update_allowed());
        assert!(!gate.syncing_allowed);

        gate.all_settled = true;
        gate.update_allowed();
        gate.all_settled = false;
        gate.update_allowed();
        assert!(gate.syncing_allowed);
    }

    #[test]
    fn test_enabling_arms_a_merge() {
        let mut gate = SyncGate::new(false);
        gate.normal_window_present = true;
        assert!(!gate.update_allowed());
        assert_eq!(gate.status(false), SyncStatus::Disabled);

        gate.set_auto_sync(true);
        assert!(gate.update_allowed());
        assert_eq!(gate.status(false), SyncStatus::Converged);
        assert_eq!(gate.status(true), SyncStatus::Merging);
    }

    #[test]
    fn test_disabling_withdraws_the_pending_merge() {
        let mut gate = SyncGate::new(false);
        gate.set_auto_sync(true);
        gate.set_auto_sync(false);
        assert!(!gate.merge_pending);

        gate.normal_window_present = true;
        assert!(!gate.update_allowed());
        assert!(gate.syncing_allowed);
        assert_eq!(gate.status(false), SyncStatus::Disabled);
    }
}
