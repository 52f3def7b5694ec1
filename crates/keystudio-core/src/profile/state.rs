//! Committed / applied / staged snapshots and the dirty check.

use serde::{Deserialize, Serialize};

use super::device::StatusSnapshot;

/// One of the three device state slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,
}

impl StateSnapshot {
    pub fn new(profile_id: impl Into<String>, checksum: u32, revision: u32) -> Self {
        Self {
            profile_id: Some(profile_id.into()),
            checksum: Some(checksum),
            revision: Some(revision),
        }
    }
}

/// Flash, RAM, and edit-buffer snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub committed: Option<StateSnapshot>,
    pub applied: Option<StateSnapshot>,
    pub staged: Option<StateSnapshot>,
}

impl SyncState {
    /// Staged checksum differs from the applied checksum, or from the
    /// committed checksum when nothing is applied.  No staged checksum means
    /// there is no edit buffer, which counts as clean even when a reference
    /// checksum exists.
    pub fn is_dirty(&self) -> bool {
        let checksum = |slot: &Option<StateSnapshot>| slot.as_ref().and_then(|s| s.checksum);
        let Some(staged) = checksum(&self.staged) else {
            return false;
        };
        let reference = checksum(&self.applied).or_else(|| checksum(&self.committed));
        reference != Some(staged)
    }

    /// Merges a status report; slots the device left out keep their value.
    pub fn merged_with(&self, status: &StatusSnapshot) -> Self {
        Self {
            committed: status
                .committed_state
                .clone()
                .or_else(|| self.committed.clone()),
            applied: status.applied_state.clone().or_else(|| self.applied.clone()),
            staged: status.staged_state.clone().or_else(|| self.staged.clone()),
        }
    }

    /// Copy with the staged checksum replaced.
    pub fn with_staged_checksum(&self, profile_id: &str, checksum: u32) -> Self {
        let revision = self.staged.as_ref().and_then(|s| s.revision);
        Self {
            staged: Some(StateSnapshot {
                profile_id: Some(profile_id.to_string()),
                checksum: Some(checksum),
                revision,
            }),
            ..self.clone()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(checksum: u32) -> Option<StateSnapshot> {
        Some(StateSnapshot::new("p1", checksum, 1))
    }

    #[test]
    fn test_clean_when_all_slots_agree() {
        let state = SyncState {
            committed: snap(7),
            applied: snap(7),
            staged: snap(7),
        };
        assert!(!state.is_dirty());
    }

    #[test]
    fn test_dirty_when_staged_differs_from_applied() {
        let state = SyncState {
            committed: snap(7),
            applied: snap(7),
            staged: snap(8),
        };
        assert!(state.is_dirty());
    }

    #[test]
    fn test_applied_takes_precedence_over_committed() {
        // Applied already matches the edit buffer; flash is behind.
        let state = SyncState {
            committed: snap(7),
            applied: snap(8),
            staged: snap(8),
        };
        assert!(!state.is_dirty());
    }

    #[test]
    fn test_falls_back_to_committed_without_applied() {
        let state = SyncState {
            committed: snap(7),
            applied: None,
            staged: snap(8),
        };
        assert!(state.is_dirty());
    }

    #[test]
    fn test_not_dirty_without_staged_checksum() {
        let state = SyncState {
            committed: snap(7),
            applied: None,
            staged: None,
        };
        assert!(!state.is_dirty());
    }

    #[test]
    fn test_staged_without_checksum_is_clean() {
        let state = SyncState {
            committed: snap(7),
            applied: snap(8),
            staged: Some(StateSnapshot {
                checksum: None,
                ..StateSnapshot::new("p1", 0, 1)
            }),
        };
        assert!(!state.is_dirty());
    }

    #[test]
    fn test_merge_keeps_slots_missing_from_status() {
        // Arrange
        let state = SyncState {
            committed: snap(1),
            applied: snap(2),
            staged: snap(3),
        };
        let status = StatusSnapshot {
            staged_state: snap(9),
            ..StatusSnapshot::default()
        };

        // Act
        let merged = state.merged_with(&status);

        // Assert
        assert_eq!(merged.committed, snap(1));
        assert_eq!(merged.applied, snap(2));
        assert_eq!(merged.staged, snap(9));
    }
}
