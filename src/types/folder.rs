use std::fmt;

use super::ModSeq;

/// How a folder was opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FolderAccess {
    /// Opened with `EXAMINE`, or the server answered `SELECT` with `[READ-ONLY]`.
    ReadOnly,
    /// Opened with `SELECT`; messages may be modified.
    ReadWrite,
}

impl FolderAccess {
    /// Whether `STORE` and friends are permitted.
    pub fn is_writable(self) -> bool {
        self == FolderAccess::ReadWrite
    }
}

impl fmt::Display for FolderAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            FolderAccess::ReadOnly => f.write_str("READ-ONLY"),
            FolderAccess::ReadWrite => f.write_str("READ-WRITE"),
        }
    }
}

/// The versioning state of the open folder.
///
/// `highest_mod_seq` is the watermark all conflict detection is anchored on. It never decreases;
/// a value of `0` means the folder does not support mod-sequences, in which case conditional
/// stores are refused and no mod-sequences are assigned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FolderSyncState {
    /// The folder's `UIDVALIDITY`.
    pub uid_validity: u32,
    /// The folder's `HIGHESTMODSEQ`, or `0` if unsupported.
    pub highest_mod_seq: ModSeq,
    /// Whether the session had quick resync enabled when this folder was opened.
    pub quick_resync_enabled: bool,
}

impl FolderSyncState {
    /// Whether the folder tracks mod-sequences at all.
    pub fn supports_mod_seq(&self) -> bool {
        self.highest_mod_seq != 0
    }

    /// Assign a mod-sequence to a change this session just made.
    ///
    /// The result is strictly greater than the current watermark, and at least `reported` if the
    /// server told us the value it used. Returns `None` on folders without mod-sequences.
    ///
    /// A server may give every message of one `STORE` the same mod-sequence `N`. Numbering them
    /// `N`, `N + 1`, ... locally then runs ahead of the server, and a later change made elsewhere
    /// at `N + 1` is discarded by [`observe`](Self::observe) as stale. It is picked up again by
    /// the next resynchronization.
    pub(crate) fn advance(&mut self, reported: Option<ModSeq>) -> Option<ModSeq> {
        if !self.supports_mod_seq() {
            return None;
        }
        let next = reported
            .unwrap_or(0)
            .max(self.highest_mod_seq.saturating_add(1));
        self.highest_mod_seq = next;
        Some(next)
    }

    /// Account for a mod-sequence reported by the server for a change made elsewhere.
    ///
    /// Returns `false` if the change is not newer than what we have already seen, in which case
    /// it must be discarded as a stale duplicate.
    pub(crate) fn observe(&mut self, seen: ModSeq) -> bool {
        if !self.supports_mod_seq() {
            return true;
        }
        if seen <= self.highest_mod_seq {
            return false;
        }
        self.highest_mod_seq = seen;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_strictly_increasing() {
        let mut state = FolderSyncState {
            uid_validity: 1,
            highest_mod_seq: 10,
            quick_resync_enabled: false,
        };
        assert_eq!(state.advance(None), Some(11));
        assert_eq!(state.advance(Some(5)), Some(12));
        assert_eq!(state.advance(Some(20)), Some(20));
        assert_eq!(state.highest_mod_seq, 20);
    }

    #[test]
    fn no_mod_seq_support() {
        let mut state = FolderSyncState::default();
        assert_eq!(state.advance(Some(4)), None);
        assert!(state.observe(4));
        assert_eq!(state.highest_mod_seq, 0);
    }

    #[test]
    fn stale_observations() {
        let mut state = FolderSyncState {
            uid_validity: 1,
            highest_mod_seq: 10,
            quick_resync_enabled: true,
        };
        assert!(!state.observe(10));
        assert!(!state.observe(3));
        assert!(state.observe(11));
        assert_eq!(state.highest_mod_seq, 11);
    }

    #[test]
    fn shared_server_mod_seq_runs_ahead() {
        let mut state = FolderSyncState {
            uid_validity: 1,
            highest_mod_seq: 10,
            quick_resync_enabled: true,
        };
        assert_eq!(state.advance(Some(20)), Some(20));
        assert_eq!(state.advance(Some(20)), Some(21));
        // another session's change at 21 looks like something already seen
        assert!(!state.observe(21));
        assert!(state.observe(22));
    }
}
