//! Quick mailbox resynchronization ([RFC 7162 section 3.2](https://tools.ietf.org/html/rfc7162#section-3.2)).
//!
//! A client that remembers a folder's `UIDVALIDITY`, the last `HIGHESTMODSEQ` it saw, and the
//! uids it knew about can hand these to
//! [`FolderSession::open_with_resync`](crate::session::FolderSession::open_with_resync) as
//! [`ResyncHints`]. The server then answers with only what changed and what vanished since.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::types::{FolderEvent, MessageSummary, ModSeq, UniqueId, VanishedSet};

/// Whether quick resync is enabled for a session.
///
/// The mode is chosen once, before any folder is opened, and never goes back to `Disabled`. It
/// decides how removals are reported: [`FolderEvent::MessagesVanished`] when enabled,
/// [`FolderEvent::MessageExpunged`] otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResyncMode {
    /// Legacy behavior: removals are reported one index at a time.
    #[default]
    Disabled,
    /// `QRESYNC` was enabled.
    Enabled,
}

#[derive(Debug, Default)]
pub(crate) struct ResyncTracker {
    mode: ResyncMode,
    folder_opened: bool,
}

impl ResyncTracker {
    pub(crate) fn mode(&self) -> ResyncMode {
        self.mode
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.mode == ResyncMode::Enabled
    }

    /// Returns `true` if the mode changed and the server must be told.
    pub(crate) fn enable(&mut self) -> Result<bool> {
        match self.mode {
            ResyncMode::Enabled => Ok(false),
            ResyncMode::Disabled if self.folder_opened => Err(Error::InvalidState(
                "quick resync must be enabled before the first folder is opened".to_string(),
            )),
            ResyncMode::Disabled => Ok(true),
        }
    }

    pub(crate) fn set_enabled(&mut self) {
        self.mode = ResyncMode::Enabled;
    }

    pub(crate) fn mark_opened(&mut self) {
        self.folder_opened = true;
    }

    pub(crate) fn require_enabled(&self) -> Result<()> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(Error::InvalidState(
                "quick resync has not been enabled for this session".to_string(),
            ))
        }
    }
}

/// What the caller remembers about a folder from an earlier session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResyncHints {
    /// The `UIDVALIDITY` the cached state belongs to.
    pub uid_validity: u32,
    /// The highest mod-sequence the caller has seen, or `0` if unknown.
    pub last_known_mod_seq: ModSeq,
    /// The uids the caller has cached.
    pub known_uids: Vec<UniqueId>,
}

impl ResyncHints {
    pub fn new(uid_validity: u32, last_known_mod_seq: ModSeq, known_uids: Vec<UniqueId>) -> Self {
        ResyncHints {
            uid_validity,
            last_known_mod_seq,
            known_uids,
        }
    }

    pub(crate) fn check_validity(&self, actual: u32) -> Result<()> {
        if actual != self.uid_validity {
            return Err(Error::UidValidityMismatch {
                expected: self.uid_validity,
                actual,
            });
        }
        Ok(())
    }
}

/// The delta between the caller's cached view and the server's current state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResyncResult {
    /// Messages that changed since the last known mod-sequence. Entries may carry more fields
    /// than were requested.
    pub changed: Vec<MessageSummary>,
    /// Known messages that no longer exist. `earlier` is set if any of the server's reports was
    /// incremental.
    pub vanished: VanishedSet,
}

/// Accumulates the notifications of one resynchronizing open.
#[derive(Debug)]
pub(crate) struct ResyncPass<'a> {
    hints: &'a ResyncHints,
    known: BTreeSet<u32>,
    result: ResyncResult,
    events: Vec<FolderEvent>,
}

impl<'a> ResyncPass<'a> {
    pub(crate) fn new(hints: &'a ResyncHints) -> Self {
        ResyncPass {
            hints,
            known: hints
                .known_uids
                .iter()
                .filter(|u| u.validity() == hints.uid_validity)
                .map(|u| u.id())
                .collect(),
            result: ResyncResult::default(),
            events: Vec::new(),
        }
    }

    /// Returns `true` if `summary` belongs in the changed set.
    pub(crate) fn changed(&mut self, summary: &MessageSummary) -> bool {
        let newer = summary
            .mod_seq
            .map_or(true, |m| m > self.hints.last_known_mod_seq);
        if newer {
            self.result.changed.push(summary.clone());
        }
        newer
    }

    /// Record a `VANISHED` report, keeping only uids the caller knew about.
    pub(crate) fn vanished(&mut self, reported: VanishedSet) {
        let validity = self.hints.uid_validity;
        let uids = reported.intersect(self.known.iter().map(|&id| UniqueId::new(validity, id)));
        self.record_vanished(uids, reported.earlier);
    }

    fn record_vanished(&mut self, uids: Vec<UniqueId>, earlier: bool) {
        if uids.is_empty() {
            return;
        }
        self.events.push(FolderEvent::MessagesVanished {
            uids: uids.clone(),
            earlier,
        });
        self.result.vanished.merge(VanishedSet::new(uids, earlier));
    }

    /// Reconcile with a full listing of the folder, for when the server's answer did not account
    /// for every message.
    ///
    /// Listed messages newer than the last known mod-sequence join the changed set unless already
    /// in it, and known uids missing from the listing are reported as vanished.
    pub(crate) fn listed(&mut self, summaries: &[MessageSummary]) {
        let listed: BTreeSet<u32> = summaries.iter().filter_map(|s| s.uid).map(|u| u.id()).collect();
        for summary in summaries {
            let seen = summary.uid.map_or(false, |uid| {
                self.result.changed.iter().any(|c| c.uid == Some(uid))
            });
            if !seen {
                self.changed(summary);
            }
        }

        let validity = self.hints.uid_validity;
        let gone: Vec<_> = self
            .known
            .iter()
            .filter(|id| !listed.contains(id))
            .map(|&id| UniqueId::new(validity, id))
            .filter(|&uid| !self.result.vanished.contains(uid))
            .collect();
        self.record_vanished(gone, false);
    }

    /// The uids the folder should now contain, in ascending order, assuming the server reported
    /// every change.
    pub(crate) fn expected_uids(&self) -> Vec<UniqueId> {
        let mut ids: BTreeSet<u32> = self
            .known
            .iter()
            .copied()
            .filter(|id| !self.result.vanished.contains(UniqueId::new(self.hints.uid_validity, *id)))
            .collect();
        ids.extend(self.result.changed.iter().filter_map(|s| s.uid).map(|u| u.id()));
        ids.into_iter()
            .map(|id| UniqueId::new(self.hints.uid_validity, id))
            .collect()
    }

    pub(crate) fn finish(self) -> (ResyncResult, Vec<FolderEvent>) {
        (self.result, self.events)
    }
}
