//! Conditional `STORE`: requests, target selection, conflict classification.
//!
//! A [`StoreRequest`] describes *what* to change, a [`MessageSelector`] describes *which*
//! messages. [`FolderSession::store`](crate::session::FolderSession::store) validates both,
//! dispatches one command, and reports the targets whose precondition failed as a
//! [`ConflictSet`].

use std::collections::HashMap;
use std::fmt;
use std::ops::{RangeFrom, RangeInclusive};

use crate::cache::{MessageCache, MessageState};
use crate::error::{Error, Result};
use crate::types::{
    FolderAccess, FolderEvent, FolderSyncState, Keywords, MessageFlags, MessageSummary, ModSeq,
    UniqueId,
};
use crate::utils::sequence_set;

/// How a [`StoreRequest`] combines its delta with a message's current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreAction {
    /// `+FLAGS`: union.
    Add,
    /// `-FLAGS`: difference.
    Remove,
    /// `FLAGS`: replacement.
    Set,
}

/// A change to the flags, keywords or labels of a set of messages.
///
/// Flags and keywords are independent namespaces: a [`StoreAction::Set`] replaces the system
/// flags, and replaces the keywords only when [`keywords`](StoreRequest::keywords) was given.
/// Labels are stored separately and cannot be mixed with flags in one request.
///
/// A `Set` with an empty delta clears the namespace. An `Add` or `Remove` with an empty delta is
/// rejected with [`Error::InvalidArgument`].
///
/// ```
/// use imap_resync::store::{StoreAction, StoreRequest};
/// use imap_resync::types::MessageFlags;
///
/// let request = StoreRequest::new(StoreAction::Add, MessageFlags::SEEN)
///     .keywords(["$Forwarded"])
///     .unchanged_since(1234)
///     .silent(true);
/// assert_eq!(request.precondition(), Some(1234));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreRequest {
    action: StoreAction,
    flags: MessageFlags,
    keywords: Option<Keywords>,
    labels: Option<Keywords>,
    unchanged_since: Option<ModSeq>,
    silent: bool,
}

impl StoreRequest {
    /// Change the system flags of the targeted messages.
    ///
    /// Only [storable](MessageFlags::STORABLE) flags are sent; `RECENT` and `USER_DEFINED` are
    /// ignored.
    pub fn new(action: StoreAction, flags: MessageFlags) -> Self {
        StoreRequest {
            action,
            flags,
            keywords: None,
            labels: None,
            unchanged_since: None,
            silent: false,
        }
    }

    /// Change the Gmail labels (`X-GM-LABELS`) of the targeted messages.
    pub fn labels<I, S>(action: StoreAction, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StoreRequest {
            labels: Some(labels.into_iter().map(Into::into).collect()),
            ..StoreRequest::new(action, MessageFlags::empty())
        }
    }

    /// Also change these keywords.
    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = Some(keywords.into_iter().map(Into::into).collect());
        self
    }

    /// Only apply to messages whose mod-sequence is `<= mod_seq`
    /// ([`UNCHANGEDSINCE`](https://tools.ietf.org/html/rfc7162#section-3.1.3)).
    pub fn unchanged_since(mut self, mod_seq: ModSeq) -> Self {
        self.unchanged_since = Some(mod_seq);
        self
    }

    /// Do not raise change events for this session's own update.
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn action(&self) -> StoreAction {
        self.action
    }

    /// The storable system flags to change.
    pub fn flag_delta(&self) -> MessageFlags {
        self.flags.storable()
    }

    pub fn keyword_delta(&self) -> Option<&Keywords> {
        self.keywords.as_ref()
    }

    pub fn label_delta(&self) -> Option<&Keywords> {
        self.labels.as_ref()
    }

    pub fn precondition(&self) -> Option<ModSeq> {
        self.unchanged_since
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Whether this is a `Set` of system flags that leaves keywords alone. `FLAGS` on the wire
    /// replaces keywords too, so such a request has to resend what each message already has.
    pub fn keeps_keywords(&self) -> bool {
        self.action == StoreAction::Set && self.keywords.is_none() && self.labels.is_none()
    }

    /// Whether this request targets labels rather than flags and keywords.
    pub fn is_labels(&self) -> bool {
        self.labels.is_some()
    }

    fn is_empty(&self) -> bool {
        match self.labels {
            Some(ref labels) => labels.is_empty(),
            None => {
                self.flag_delta().is_empty() && self.keywords.as_ref().map_or(true, |k| k.is_empty())
            }
        }
    }

    /// Checks that need nothing but the request itself.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.labels.is_some() && (!self.flags.is_empty() || self.keywords.is_some()) {
            return Err(Error::InvalidArgument(
                "labels cannot be stored together with flags or keywords".to_string(),
            ));
        }
        if self.action != StoreAction::Set && self.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "{:?} requires at least one flag, keyword or label",
                self.action
            )));
        }
        Ok(())
    }

    /// Checks against the open folder.
    pub(crate) fn check_folder(&self, state: &FolderSyncState, access: FolderAccess) -> Result<()> {
        if self.unchanged_since.is_some() && !state.supports_mod_seq() {
            return Err(Error::NotSupported(
                "UNCHANGEDSINCE requires a folder with mod-sequences".to_string(),
            ));
        }
        if !access.is_writable() {
            return Err(Error::InvalidState("folder is open read-only".to_string()));
        }
        Ok(())
    }

    /// The state `current` would have once this request is applied. The mod-sequence is left
    /// alone.
    pub fn apply(&self, current: &MessageState) -> MessageState {
        let mut next = current.clone();
        if let Some(ref labels) = self.labels {
            combine(self.action, &mut next.labels, labels);
            return next;
        }

        let delta = self.flag_delta();
        next.flags = match self.action {
            StoreAction::Add => current.flags | delta,
            StoreAction::Remove => current.flags - delta,
            StoreAction::Set => (current.flags - MessageFlags::STORABLE) | delta,
        };
        if let Some(ref keywords) = self.keywords {
            combine(self.action, &mut next.keywords, keywords);
        }
        next
    }
}

fn combine(action: StoreAction, current: &mut Keywords, delta: &Keywords) {
    match action {
        StoreAction::Add => current.extend(delta.iter().cloned()),
        StoreAction::Remove => current.retain(|k| !delta.contains(k)),
        StoreAction::Set => *current = delta.clone(),
    }
}

/// Which messages a [`StoreRequest`] applies to.
///
/// Indexes are 0-based positions in the open folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageSelector {
    /// Messages by unique id. Every id must belong to the open folder's current `UIDVALIDITY`.
    Uids(Vec<UniqueId>),
    /// Messages by position.
    Indexes(Vec<u32>),
    /// A contiguous range of positions. `end: None` extends to the last message.
    Range {
        /// First position.
        start: u32,
        /// Last position, inclusive.
        end: Option<u32>,
    },
}

impl MessageSelector {
    /// Resolve against the cache of the open folder.
    pub(crate) fn resolve(&self, cache: &MessageCache, uid_validity: u32) -> Result<Vec<Target>> {
        let len = cache.len();
        let mut targets = Vec::new();
        match *self {
            MessageSelector::Uids(ref uids) => {
                for &uid in uids {
                    if !uid.is_valid() || uid.validity() != uid_validity {
                        return Err(Error::InvalidArgument(format!(
                            "uid {} of UIDVALIDITY {} does not belong to this folder (UIDVALIDITY {})",
                            uid,
                            uid.validity(),
                            uid_validity
                        )));
                    }
                    let index = cache
                        .position_of(uid)
                        .ok_or_else(|| Error::InvalidArgument(format!("unknown uid {}", uid)))?;
                    targets.push(Target {
                        reference: MessageRef::Uid(uid),
                        index,
                    });
                }
            }
            MessageSelector::Indexes(ref indexes) => {
                for &index in indexes {
                    if index >= len {
                        return Err(Error::InvalidArgument(format!(
                            "index {} out of range for a folder of {} messages",
                            index, len
                        )));
                    }
                    targets.push(Target::index(index));
                }
            }
            MessageSelector::Range { start, end } => {
                let last = match end {
                    Some(end) if start > end => {
                        return Err(Error::InvalidArgument(format!(
                            "inverted range {}..={}",
                            start, end
                        )))
                    }
                    Some(end) if end >= len => {
                        return Err(Error::InvalidArgument(format!(
                            "index {} out of range for a folder of {} messages",
                            end, len
                        )))
                    }
                    Some(end) => end,
                    None if start >= len => return Ok(targets),
                    None => len - 1,
                };
                targets.extend((start..=last).map(Target::index));
            }
        }

        let mut seen = std::collections::HashSet::new();
        targets.retain(|t| seen.insert(t.index));
        Ok(targets)
    }
}

impl From<Vec<UniqueId>> for MessageSelector {
    fn from(uids: Vec<UniqueId>) -> Self {
        MessageSelector::Uids(uids)
    }
}

impl From<UniqueId> for MessageSelector {
    fn from(uid: UniqueId) -> Self {
        MessageSelector::Uids(vec![uid])
    }
}

impl From<Vec<u32>> for MessageSelector {
    fn from(indexes: Vec<u32>) -> Self {
        MessageSelector::Indexes(indexes)
    }
}

impl From<RangeInclusive<u32>> for MessageSelector {
    fn from(range: RangeInclusive<u32>) -> Self {
        MessageSelector::Range {
            start: *range.start(),
            end: Some(*range.end()),
        }
    }
}

impl From<RangeFrom<u32>> for MessageSelector {
    fn from(range: RangeFrom<u32>) -> Self {
        MessageSelector::Range {
            start: range.start,
            end: None,
        }
    }
}

/// A message as the caller addressed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageRef {
    /// By unique id.
    Uid(UniqueId),
    /// By 0-based position.
    Index(u32),
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MessageRef::Uid(uid) => write!(f, "uid {}", uid),
            MessageRef::Index(index) => write!(f, "index {}", index),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Target {
    pub(crate) reference: MessageRef,
    pub(crate) index: u32,
}

impl Target {
    fn index(index: u32) -> Self {
        Target {
            reference: MessageRef::Index(index),
            index,
        }
    }
}

/// The targets of a conditional store that were *not* updated because they had changed since
/// the precondition's mod-sequence.
///
/// Targets are reported the way they were addressed: by uid for
/// [`MessageSelector::Uids`], by index otherwise. Always empty for unconditional stores.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConflictSet {
    refs: Vec<MessageRef>,
}

impl ConflictSet {
    pub(crate) fn new(refs: Vec<MessageRef>) -> Self {
        ConflictSet { refs }
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = MessageRef> + '_ {
        self.refs.iter().copied()
    }

    /// The conflicted targets that were addressed by uid.
    pub fn uids(&self) -> impl Iterator<Item = UniqueId> + '_ {
        self.refs.iter().filter_map(|r| match *r {
            MessageRef::Uid(uid) => Some(uid),
            MessageRef::Index(_) => None,
        })
    }

    /// The conflicted targets that were addressed by index.
    pub fn indexes(&self) -> impl Iterator<Item = u32> + '_ {
        self.refs.iter().filter_map(|r| match *r {
            MessageRef::Index(index) => Some(index),
            MessageRef::Uid(_) => None,
        })
    }

    pub fn contains(&self, reference: MessageRef) -> bool {
        self.refs.contains(&reference)
    }
}

impl IntoIterator for ConflictSet {
    type Item = MessageRef;
    type IntoIter = std::vec::IntoIter<MessageRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.refs.into_iter()
    }
}

impl<'a> IntoIterator for &'a ConflictSet {
    type Item = MessageRef;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, MessageRef>>;

    fn into_iter(self) -> Self::IntoIter {
        self.refs.iter().copied()
    }
}

/// One `STORE` (or `UID STORE`) as handed to a
/// [`FolderTransport`](crate::transport::FolderTransport).
///
/// All targets are addressed the same way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreCommand {
    targets: Vec<MessageRef>,
    request: StoreRequest,
    /// Aligned with `targets`, or empty.
    kept_keywords: Vec<Keywords>,
}

impl StoreCommand {
    pub(crate) fn new(targets: Vec<MessageRef>, request: StoreRequest) -> Self {
        StoreCommand {
            targets,
            request,
            kept_keywords: Vec::new(),
        }
    }

    /// The keywords each target currently has, for a request that
    /// [keeps keywords](StoreRequest::keeps_keywords).
    pub(crate) fn keeping_keywords(mut self, kept: Vec<Keywords>) -> Self {
        debug_assert_eq!(kept.len(), self.targets.len());
        self.kept_keywords = kept;
        self
    }

    pub fn targets(&self) -> &[MessageRef] {
        &self.targets
    }

    pub fn request(&self) -> &StoreRequest {
        &self.request
    }

    /// `true` for `UID STORE`.
    pub fn by_uid(&self) -> bool {
        matches!(self.targets.first(), Some(MessageRef::Uid(_)))
    }

    /// The targets as a compact wire sequence set. Indexes are rendered 1-based.
    pub fn sequence_set(&self) -> String {
        wire_set(&self.targets)
    }

    /// The targets grouped by the keywords they must keep, one group per wire command. Without
    /// keywords to keep there is a single group.
    pub fn batches(&self) -> Vec<StoreBatch<'_>> {
        if self.kept_keywords.len() != self.targets.len() {
            return vec![StoreBatch {
                targets: self.targets.clone(),
                kept_keywords: None,
            }];
        }
        let mut batches: Vec<StoreBatch<'_>> = Vec::new();
        for (target, kept) in self.targets.iter().zip(&self.kept_keywords) {
            match batches.iter_mut().find(|b| b.kept_keywords == Some(kept)) {
                Some(batch) => batch.targets.push(*target),
                None => batches.push(StoreBatch {
                    targets: vec![*target],
                    kept_keywords: Some(kept),
                }),
            }
        }
        batches
    }
}

/// Targets of a [`StoreCommand`] that share one wire command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreBatch<'a> {
    pub targets: Vec<MessageRef>,
    /// Keywords to send along with the new system flags.
    pub kept_keywords: Option<&'a Keywords>,
}

impl StoreBatch<'_> {
    /// The targets as a compact wire sequence set. Indexes are rendered 1-based.
    pub fn sequence_set(&self) -> String {
        wire_set(&self.targets)
    }
}

fn wire_set(targets: &[MessageRef]) -> String {
    sequence_set(targets.iter().map(|t| match *t {
        MessageRef::Uid(uid) => uid.id(),
        MessageRef::Index(index) => index + 1,
    }))
}

/// What the server said about a [`StoreCommand`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreResponse {
    /// Targets the server refused because their mod-sequence exceeded the precondition
    /// (the [`MODIFIED`](https://tools.ietf.org/html/rfc7162#section-3.1.3) response code).
    pub modified: Vec<MessageRef>,
    /// `FETCH` data the server sent while processing the command, for targets and for any other
    /// message that changed meanwhile.
    pub fetched: Vec<MessageSummary>,
}

/// Split targets into those the precondition already rules out and those to send.
pub(crate) fn partition(
    request: &StoreRequest,
    targets: Vec<Target>,
    cache: &MessageCache,
) -> (Vec<Target>, Vec<Target>) {
    let Some(since) = request.precondition() else {
        return (targets, Vec::new());
    };
    targets.into_iter().partition(|t| {
        cache
            .get(t.index)
            .and_then(|m| m.mod_seq)
            .map_or(true, |m| m <= since)
    })
}

/// Separate the `FETCH` data about `targets` from data about other messages.
pub(crate) fn split_fetched(
    targets: &[Target],
    fetched: Vec<MessageSummary>,
) -> (HashMap<u32, MessageSummary>, Vec<MessageSummary>) {
    let mut mine = HashMap::new();
    let mut others = Vec::new();
    for summary in fetched {
        let hit = targets.iter().find(|t| match (t.reference, summary.uid) {
            (MessageRef::Uid(uid), Some(reported)) => uid == reported,
            _ => t.index == summary.index,
        });
        match hit {
            Some(t) => {
                mine.insert(t.index, summary);
            }
            None => others.push(summary),
        }
    }
    (mine, others)
}

/// Apply `request` to every dispatched target the server did not refuse.
///
/// Mod-sequences are assigned in the order the server reported them. Returns the refused
/// targets and the events to raise.
pub(crate) fn commit(
    request: &StoreRequest,
    dispatched: &[Target],
    modified: &[MessageRef],
    mut reported: HashMap<u32, MessageSummary>,
    state: &mut FolderSyncState,
    cache: &mut MessageCache,
) -> (Vec<Target>, Vec<FolderEvent>) {
    let before = state.highest_mod_seq;
    let mut refused = Vec::new();
    let mut applied = Vec::new();
    for target in dispatched {
        if modified.contains(&target.reference) {
            refused.push(*target);
        } else {
            applied.push((*target, reported.remove(&target.index)));
        }
    }
    applied.sort_by_key(|(_, summary)| {
        summary
            .as_ref()
            .and_then(|s| s.mod_seq)
            .unwrap_or(ModSeq::MAX)
    });

    let mut events = Vec::new();
    for (target, summary) in applied {
        let Some(current) = cache.get(target.index) else {
            continue;
        };
        let mut next = request.apply(current);
        if let Some(ref summary) = summary {
            // the server's view wins over our computation
            next.merge(&MessageSummary {
                uid: None,
                mod_seq: None,
                ..summary.clone()
            });
        }
        let mod_seq = state.advance(summary.as_ref().and_then(|s| s.mod_seq));
        if mod_seq.is_some() {
            next.mod_seq = mod_seq;
        }

        if !request.is_silent() {
            events.push(change_event(request.is_labels(), target.index, &next, mod_seq));
        }
        if let Some(entry) = cache.get_mut(target.index) {
            *entry = next;
        }
    }

    if state.highest_mod_seq != before {
        events.push(FolderEvent::HighestModSeqChanged(state.highest_mod_seq));
    }
    (refused, events)
}

pub(crate) fn change_event(
    labels: bool,
    index: u32,
    state: &MessageState,
    mod_seq: Option<ModSeq>,
) -> FolderEvent {
    if labels {
        FolderEvent::LabelsChanged {
            index,
            uid: state.uid,
            labels: state.labels.clone(),
            mod_seq,
        }
    } else {
        FolderEvent::FlagsChanged {
            index,
            uid: state.uid,
            flags: state.flags,
            keywords: state.keywords.clone(),
            mod_seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn message(flags: MessageFlags, keywords: &[&str]) -> MessageState {
        MessageState {
            flags,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn remove_seen() {
        let current = message(MessageFlags::SEEN | MessageFlags::FLAGGED, &[]);
        let next = StoreRequest::new(StoreAction::Remove, MessageFlags::SEEN).apply(&current);
        assert_eq!(next.flags, MessageFlags::FLAGGED);
    }

    #[test]
    fn set_keeps_other_namespaces() {
        let mut current = message(MessageFlags::SEEN | MessageFlags::RECENT, &["$Junk"]);
        current.labels.insert("Inbox".to_string());

        let next = StoreRequest::new(StoreAction::Set, MessageFlags::DRAFT).apply(&current);
        assert_eq!(next.flags, MessageFlags::DRAFT | MessageFlags::RECENT);
        assert!(next.keywords.contains("$Junk"));
        assert!(next.labels.contains("Inbox"));

        let next = StoreRequest::new(StoreAction::Set, MessageFlags::empty())
            .keywords(Vec::<String>::new())
            .apply(&current);
        assert_eq!(next.flags, MessageFlags::RECENT);
        assert!(next.keywords.is_empty());

        let next = StoreRequest::labels(StoreAction::Remove, ["Inbox"]).apply(&current);
        assert!(next.labels.is_empty());
        assert_eq!(next.flags, current.flags);
    }

    #[test]
    fn empty_delta_validation() {
        assert!(matches!(
            StoreRequest::new(StoreAction::Add, MessageFlags::empty()).validate(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            StoreRequest::new(StoreAction::Remove, MessageFlags::empty())
                .keywords(Vec::<String>::new())
                .validate(),
            Err(Error::InvalidArgument(_))
        ));
        // only server-set flags
        assert!(matches!(
            StoreRequest::new(StoreAction::Add, MessageFlags::RECENT).validate(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(StoreRequest::new(StoreAction::Set, MessageFlags::empty())
            .validate()
            .is_ok());
        assert!(StoreRequest::new(StoreAction::Add, MessageFlags::empty())
            .keywords(["$Label1"])
            .validate()
            .is_ok());
        assert!(matches!(
            StoreRequest::labels(StoreAction::Add, Vec::<String>::new()).validate(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn labels_do_not_mix() {
        let request = StoreRequest::labels(StoreAction::Add, ["Work"]).keywords(["$Junk"]);
        assert!(matches!(request.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn folder_checks() {
        let no_modseq = FolderSyncState {
            uid_validity: 1,
            highest_mod_seq: 0,
            quick_resync_enabled: false,
        };
        let request = StoreRequest::new(StoreAction::Add, MessageFlags::SEEN).unchanged_since(3);
        assert!(matches!(
            request.check_folder(&no_modseq, FolderAccess::ReadWrite),
            Err(Error::NotSupported(_))
        ));

        let modseq = FolderSyncState {
            highest_mod_seq: 5,
            ..no_modseq
        };
        assert!(matches!(
            request.check_folder(&modseq, FolderAccess::ReadOnly),
            Err(Error::InvalidState(_))
        ));
        assert!(request.check_folder(&modseq, FolderAccess::ReadWrite).is_ok());
    }

    fn cache(uids: &[u32]) -> MessageCache {
        let mut cache = MessageCache::with_len(uids.len() as u32);
        let ids: Vec<_> = uids.iter().map(|&u| UniqueId::new(1, u)).collect();
        cache.assign_uids(&ids);
        cache
    }

    #[test]
    fn resolve_selectors() {
        let cache = cache(&[10, 11, 12, 13]);

        let t = MessageSelector::from(vec![UniqueId::new(1, 12)])
            .resolve(&cache, 1)
            .unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].index, 2);

        assert!(matches!(
            MessageSelector::from(vec![UniqueId::new(2, 12)]).resolve(&cache, 1),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            MessageSelector::from(vec![UniqueId::new(1, 99)]).resolve(&cache, 1),
            Err(Error::InvalidArgument(_))
        ));

        let t = MessageSelector::from(1u32..).resolve(&cache, 1).unwrap();
        assert_eq!(t.iter().map(|t| t.index).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(MessageSelector::from(4u32..).resolve(&cache, 1).unwrap().is_empty());
        assert!(matches!(
            MessageSelector::from(2u32..=4).resolve(&cache, 1),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            MessageSelector::Range {
                start: 3,
                end: Some(1)
            }
            .resolve(&cache, 1),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            MessageSelector::from(vec![0u32, 4]).resolve(&cache, 1),
            Err(Error::InvalidArgument(_))
        ));

        let t = MessageSelector::from(vec![2u32, 2, 0]).resolve(&cache, 1).unwrap();
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn command_rendering() {
        let command = StoreCommand::new(
            vec![
                MessageRef::Index(0),
                MessageRef::Index(1),
                MessageRef::Index(2),
                MessageRef::Index(4),
            ],
            StoreRequest::new(StoreAction::Add, MessageFlags::SEEN),
        );
        assert!(!command.by_uid());
        assert_eq!(command.sequence_set(), "1:3,5");

        let command = StoreCommand::new(
            vec![MessageRef::Uid(UniqueId::new(1, 7))],
            StoreRequest::new(StoreAction::Add, MessageFlags::SEEN),
        );
        assert!(command.by_uid());
        assert_eq!(command.sequence_set(), "7");
        assert_eq!(command.batches().len(), 1);
    }

    #[test]
    fn set_batches_by_kept_keywords() {
        let request = StoreRequest::new(StoreAction::Set, MessageFlags::DRAFT);
        assert!(request.keeps_keywords());
        assert!(!request.clone().keywords(["$Junk"]).keeps_keywords());

        let junk: Keywords = ["$Junk".to_string()].into_iter().collect();
        let command = StoreCommand::new(
            vec![MessageRef::Index(0), MessageRef::Index(1), MessageRef::Index(2)],
            request,
        )
        .keeping_keywords(vec![junk.clone(), Keywords::new(), junk.clone()]);
        let batches = command.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].kept_keywords, Some(&junk));
        assert_eq!(batches[0].sequence_set(), "1,3");
        assert_eq!(batches[1].kept_keywords, Some(&Keywords::new()));
        assert_eq!(batches[1].sequence_set(), "2");
    }

    #[test]
    fn precondition_boundary() {
        let mut cache = cache(&[1, 2]);
        cache.get_mut(0).unwrap().mod_seq = Some(5);
        cache.get_mut(1).unwrap().mod_seq = Some(9);
        let targets = MessageSelector::from(0u32..).resolve(&cache, 1).unwrap();

        let request = StoreRequest::new(StoreAction::Add, MessageFlags::SEEN).unchanged_since(7);
        let (send, conflicted) = partition(&request, targets.clone(), &cache);
        assert_eq!(send.len(), 1);
        assert_eq!(send[0].index, 0);
        assert_eq!(conflicted[0].index, 1);

        // equality applies
        let request = request.unchanged_since(9);
        let (send, conflicted) = partition(&request, targets.clone(), &cache);
        assert_eq!(send.len(), 2);
        assert!(conflicted.is_empty());

        let request = request.unchanged_since(8);
        let (_, conflicted) = partition(&request, targets, &cache);
        assert_eq!(conflicted.len(), 1);
    }

    #[test]
    fn commit_assigns_in_reported_order() {
        let mut cache = cache(&[1, 2, 3]);
        let mut state = FolderSyncState {
            uid_validity: 1,
            highest_mod_seq: 10,
            quick_resync_enabled: false,
        };
        let targets = MessageSelector::from(0u32..).resolve(&cache, 1).unwrap();
        let request = StoreRequest::new(StoreAction::Add, MessageFlags::FLAGGED);

        let fetched = vec![
            MessageSummary::new(0).with_mod_seq(14),
            MessageSummary::new(2).with_mod_seq(12),
        ];
        let (mine, others) = split_fetched(&targets, fetched);
        assert!(others.is_empty());

        let (refused, events) = commit(
            &request,
            &targets,
            &[MessageRef::Index(1)],
            mine,
            &mut state,
            &mut cache,
        );
        assert_eq!(refused.len(), 1);
        assert_eq!(refused[0].index, 1);
        assert_eq!(state.highest_mod_seq, 14);
        assert_eq!(cache.get(2).unwrap().mod_seq, Some(12));
        assert_eq!(cache.get(0).unwrap().mod_seq, Some(14));
        assert_eq!(cache.get(1).unwrap().flags, MessageFlags::empty());

        let order: Vec<_> = events
            .iter()
            .filter_map(|e| match *e {
                FolderEvent::FlagsChanged { index, .. } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec![2, 0]);
        assert_eq!(
            events.last(),
            Some(&FolderEvent::HighestModSeqChanged(14))
        );
    }

    #[test]
    fn commit_adopts_server_flags() {
        let mut cache = cache(&[1]);
        cache.get_mut(0).unwrap().flags = MessageFlags::SEEN;
        let mut state = FolderSyncState::default();
        let targets = MessageSelector::from(0u32..).resolve(&cache, 1).unwrap();
        let request = StoreRequest::new(StoreAction::Add, MessageFlags::FLAGGED).silent(true);

        let reported = MessageSummary::new(0).with_flags(
            MessageFlags::FLAGGED | MessageFlags::SEEN | MessageFlags::ANSWERED,
            Keywords::new(),
        );
        let (mine, _) = split_fetched(&targets, vec![reported]);
        let (_, events) = commit(&request, &targets, &[], mine, &mut state, &mut cache);

        assert!(events.is_empty());
        assert_eq!(
            cache.get(0).unwrap().flags,
            MessageFlags::FLAGGED | MessageFlags::SEEN | MessageFlags::ANSWERED
        );
        assert_eq!(cache.get(0).unwrap().mod_seq, None);
    }

    fn arb_flags() -> impl Strategy<Value = MessageFlags> {
        (0u32..128).prop_map(MessageFlags::from_bits_truncate)
    }

    proptest! {
        #[test]
        fn add_and_remove_are_idempotent(
            current in arb_flags(),
            delta in arb_flags(),
            keywords in proptest::collection::btree_set("[a-z]{1,4}", 0..4),
            add in any::<bool>(),
        ) {
            let action = if add { StoreAction::Add } else { StoreAction::Remove };
            let request = StoreRequest::new(action, delta).keywords(keywords);
            let once = request.apply(&message(current, &["abc"]));
            let twice = request.apply(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
