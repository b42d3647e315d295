//! Per-message state of the open folder, kept in sequence order.

use crate::types::{Keywords, MessageFlags, MessageSummary, ModSeq, UniqueId, VanishedSet};

/// What this session knows about one message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageState {
    /// The message's unique id, if it has been reported.
    pub uid: Option<UniqueId>,
    /// System flags.
    pub flags: MessageFlags,
    /// Keywords.
    pub keywords: Keywords,
    /// Gmail labels.
    pub labels: Keywords,
    /// The mod-sequence of the last known change, if any.
    pub mod_seq: Option<ModSeq>,
}

impl MessageState {
    /// Overwrite whatever `summary` reports.
    pub(crate) fn merge(&mut self, summary: &MessageSummary) {
        if let Some(uid) = summary.uid {
            self.uid = Some(uid);
        }
        if let Some(flags) = summary.flags {
            self.flags = flags;
        }
        if let Some(ref keywords) = summary.keywords {
            self.keywords = keywords.clone();
        }
        if let Some(ref labels) = summary.labels {
            self.labels = labels.clone();
        }
        if let Some(mod_seq) = summary.mod_seq {
            self.mod_seq = Some(mod_seq);
        }
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct MessageCache {
    entries: Vec<MessageState>,
}

impl MessageCache {
    pub(crate) fn with_len(exists: u32) -> Self {
        let mut cache = MessageCache::default();
        cache.grow(exists);
        cache
    }

    pub(crate) fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    pub(crate) fn get(&self, index: u32) -> Option<&MessageState> {
        self.entries.get(index as usize)
    }

    pub(crate) fn get_mut(&mut self, index: u32) -> Option<&mut MessageState> {
        self.entries.get_mut(index as usize)
    }

    pub(crate) fn position_of(&self, uid: UniqueId) -> Option<u32> {
        self.entries
            .iter()
            .position(|m| m.uid == Some(uid))
            .map(|i| i as u32)
    }

    pub(crate) fn remove(&mut self, index: u32) -> Option<MessageState> {
        if (index as usize) < self.entries.len() {
            Some(self.entries.remove(index as usize))
        } else {
            None
        }
    }

    /// Remove every message whose uid is in `set`. Each returned index is the position the
    /// message had when it was removed, as an `EXPUNGE` would report it.
    pub(crate) fn remove_vanished(&mut self, set: &VanishedSet) -> Vec<(u32, UniqueId)> {
        let mut removed = Vec::new();
        let mut index = 0;
        while index < self.entries.len() {
            match self.entries[index].uid.filter(|&uid| set.contains(uid)) {
                Some(uid) => {
                    self.entries.remove(index);
                    removed.push((index as u32, uid));
                }
                None => index += 1,
            }
        }
        removed
    }

    /// `EXISTS` only ever announces new messages at the end.
    pub(crate) fn grow(&mut self, exists: u32) {
        while self.entries.len() < exists as usize {
            self.entries.push(MessageState::default());
        }
    }

    pub(crate) fn upsert(&mut self, summary: &MessageSummary) -> &MessageState {
        self.grow(summary.index + 1);
        let entry = &mut self.entries[summary.index as usize];
        entry.merge(summary);
        entry
    }

    /// Give every message a uid, in ascending order.
    pub(crate) fn assign_uids(&mut self, uids: &[UniqueId]) {
        for (entry, uid) in self.entries.iter_mut().zip(uids) {
            entry.uid = Some(*uid);
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &MessageState> + '_ {
        self.entries.iter()
    }
}
