//! Sync state of locally mutated listens and feedback entries.
//!
//! Legal lifecycle of one record:
//!
//! ```text
//! PendingAdd -> Synchronized -> PendingRemove -> (deleted)
//! ```
//!
//! Any subsequence of that chain is legal (the internal backend goes straight
//! from `PendingAdd` to `Synchronized`, or from `Synchronized` to deleted).
//! Nothing ever moves backwards.

use std::fmt;

use crate::error::{Error, Result};

/// Whether a local record's existence has been communicated to its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SyncState {
    /// Created locally, never reported to the remote backend
    PendingAdd,
    /// Local and remote agree as of the record's date
    Synchronized,
    /// Removed locally, removal not yet acknowledged remotely
    PendingRemove,
}

impl SyncState {
    /// Convert to string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::PendingAdd => "pending_add",
            SyncState::Synchronized => "synchronized",
            SyncState::PendingRemove => "pending_remove",
        }
    }

    /// Position in the lifecycle chain.
    fn rank(self) -> u8 {
        match self {
            SyncState::PendingAdd => 0,
            SyncState::Synchronized => 1,
            SyncState::PendingRemove => 2,
        }
    }

    /// Whether `self -> next` respects the lifecycle. Staying put is allowed.
    pub fn can_become(self, next: SyncState) -> bool {
        if next == SyncState::PendingRemove {
            // PendingRemove implies the record was Synchronized
            return matches!(self, SyncState::Synchronized | SyncState::PendingRemove);
        }
        next.rank() >= self.rank()
    }

    /// Validate `self -> next`, returning `next` on success.
    pub fn transition(self, next: SyncState) -> Result<SyncState> {
        if self.can_become(next) {
            Ok(next)
        } else {
            Err(Error::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending_add" => Ok(SyncState::PendingAdd),
            "synchronized" => Ok(SyncState::Synchronized),
            "pending_remove" => Ok(SyncState::PendingRemove),
            other => Err(Error::invalid_data(format!("unknown sync state '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_are_legal() {
        assert!(SyncState::PendingAdd.can_become(SyncState::Synchronized));
        assert!(SyncState::Synchronized.can_become(SyncState::PendingRemove));
        assert!(SyncState::Synchronized.can_become(SyncState::Synchronized));
    }

    #[test]
    fn test_backward_transitions_are_illegal() {
        assert!(!SyncState::PendingRemove.can_become(SyncState::PendingAdd));
        assert!(!SyncState::PendingRemove.can_become(SyncState::Synchronized));
        assert!(!SyncState::Synchronized.can_become(SyncState::PendingAdd));
    }

    #[test]
    fn test_pending_remove_requires_synchronized() {
        assert!(!SyncState::PendingAdd.can_become(SyncState::PendingRemove));
        assert!(matches!(
            SyncState::PendingAdd.transition(SyncState::PendingRemove),
            Err(Error::IllegalTransition { .. })
        ));
    }

    #[test]
    fn test_string_roundtrip() {
        for state in [
            SyncState::PendingAdd,
            SyncState::Synchronized,
            SyncState::PendingRemove,
        ] {
            assert_eq!(state.as_str().parse::<SyncState>().unwrap(), state);
        }
        assert!("bogus".parse::<SyncState>().is_err());
    }
}
