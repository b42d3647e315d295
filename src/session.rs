//! The folder session: one connection, one open folder, one lock.

use std::sync::{mpsc, Mutex, MutexGuard, PoisonError};

use enumset::EnumSet;

use crate::cache::{MessageCache, MessageState};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::events::EventRegistry;
use crate::resync::{ResyncHints, ResyncMode, ResyncPass, ResyncResult, ResyncTracker};
use crate::store::{self, ConflictSet, MessageSelector, StoreCommand, StoreRequest, Target};
use crate::transport::{AppendMessage, FolderTransport, Notification, OpenResponse};
use crate::types::{
    EventCategory, FolderAccess, FolderEvent, FolderSyncState, MessageSummary, Uid, UniqueId,
    UniqueIdMap,
};

/// A client's view of one folder on a server, kept in sync with a [`FolderTransport`].
///
/// All operations take `&self` and are serialized by an internal lock, so a session can be
/// shared between threads. Each operation holds the lock from validation through the transport
/// exchange to the last emitted event; a failed or cancelled operation leaves the local state
/// exactly as it was.
///
/// ```no_run
/// # use imap_resync::{FolderSession, FolderTransport, Result};
/// # use imap_resync::store::{StoreAction, StoreRequest};
/// # use imap_resync::types::{FolderAccess, MessageFlags, UniqueId};
/// # fn run<T: FolderTransport>(transport: T) -> Result<()> {
/// let session = FolderSession::builder(transport).quick_resync(true).build()?;
/// let state = session.open("INBOX", FolderAccess::ReadWrite)?;
///
/// let seen = StoreRequest::new(StoreAction::Add, MessageFlags::SEEN)
///     .unchanged_since(state.highest_mod_seq);
/// let conflicts = session.store(vec![UniqueId::new(state.uid_validity, 42)], &seen)?;
/// for message in &conflicts {
///     println!("{} changed meanwhile", message);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FolderSession<T: FolderTransport> {
    inner: Mutex<Inner<T>>,
}

#[derive(Debug)]
struct Inner<T> {
    transport: T,
    tracker: ResyncTracker,
    folder: Option<OpenFolder>,
    events: EventRegistry,
}

#[derive(Debug)]
struct OpenFolder {
    name: String,
    access: FolderAccess,
    state: FolderSyncState,
    cache: MessageCache,
    uid_next: Option<Uid>,
}

fn not_open() -> Error {
    Error::InvalidState("no folder is open".to_string())
}

/// Builds a [`FolderSession`].
#[derive(Debug)]
pub struct SessionBuilder<T: FolderTransport> {
    transport: T,
    quick_resync: bool,
}

impl<T: FolderTransport> SessionBuilder<T> {
    pub fn new(transport: T) -> Self {
        SessionBuilder {
            transport,
            quick_resync: false,
        }
    }

    /// Enable quick resync as soon as the session is built.
    pub fn quick_resync(mut self, enable: bool) -> Self {
        self.quick_resync = enable;
        self
    }

    pub fn build(self) -> Result<FolderSession<T>> {
        let session = FolderSession::new(self.transport);
        if self.quick_resync {
            session.enable_quick_resync()?;
        }
        Ok(session)
    }
}

impl<T: FolderTransport> FolderSession<T> {
    /// A session over `transport`, with quick resync disabled.
    pub fn new(transport: T) -> Self {
        FolderSession {
            inner: Mutex::new(Inner {
                transport,
                tracker: ResyncTracker::default(),
                folder: None,
                events: EventRegistry::default(),
            }),
        }
    }

    pub fn builder(transport: T) -> SessionBuilder<T> {
        SessionBuilder::new(transport)
    }

    // state is only mutated after every fallible step, so a panic elsewhere cannot leave it torn
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch to quick resync mode.
    ///
    /// Must be called before the first folder is opened, otherwise this fails with
    /// [`Error::InvalidState`]. Calling it again once enabled does nothing.
    pub fn enable_quick_resync(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.tracker.enable()? {
            inner.transport.enable_quick_resync()?;
            inner.tracker.set_enabled();
            log::debug!("quick resync enabled");
        }
        Ok(())
    }

    pub fn resync_mode(&self) -> ResyncMode {
        self.lock().tracker.mode()
    }

    /// Open `mailbox` and list its messages.
    pub fn open(&self, mailbox: &str, access: FolderAccess) -> Result<FolderSyncState> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let response = inner.transport.open(mailbox, access, None)?;
        inner.tracker.mark_opened();
        // the server closed whatever was open before
        inner.folder = None;

        let mut folder = OpenFolder::new(mailbox, &response, inner.tracker.is_enabled());
        for notification in response.notifications {
            folder.absorb(notification);
        }
        if folder.cache.len() > 0 {
            let summaries = inner.transport.fetch()?;
            folder.load(summaries);
        }

        let state = folder.state;
        log::debug!(
            "opened {} ({}): uidvalidity {}, highestmodseq {}, {} messages",
            mailbox,
            folder.access,
            state.uid_validity,
            state.highest_mod_seq,
            folder.cache.len()
        );
        inner.folder = Some(folder);
        Ok(state)
    }

    /// Open `mailbox` and fetch only what changed since the state described by `hints`.
    ///
    /// Requires quick resync to be enabled. Fails with [`Error::UidValidityMismatch`] if the
    /// folder was recreated since; the caller's cached uids are then worthless.
    pub fn open_with_resync(
        &self,
        mailbox: &str,
        access: FolderAccess,
        hints: &ResyncHints,
    ) -> Result<ResyncResult> {
        self.open_with_resync_cancellable(mailbox, access, hints, &CancelToken::new())
    }

    /// Like [`open_with_resync`](FolderSession::open_with_resync), giving up with
    /// [`Error::Cancelled`] once `cancel` fires.
    pub fn open_with_resync_cancellable(
        &self,
        mailbox: &str,
        access: FolderAccess,
        hints: &ResyncHints,
        cancel: &CancelToken,
    ) -> Result<ResyncResult> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.tracker.require_enabled()?;
        cancel.check()?;

        let response = inner.transport.open(mailbox, access, Some(hints))?;
        inner.tracker.mark_opened();
        inner.folder = None;
        hints.check_validity(response.uid_validity)?;
        cancel.check()?;

        let mut folder = OpenFolder::new(mailbox, &response, true);
        let mut pass = ResyncPass::new(hints);
        for notification in response.notifications {
            match notification {
                Notification::Fetch(summary) => {
                    if pass.changed(&summary) {
                        folder.cache.upsert(&summary);
                    }
                }
                Notification::Vanished(set) => pass.vanished(set),
                other => folder.absorb(other),
            }
        }

        // without a mod-sequence to start from the server reports no delta at all
        let delta_reported = hints.last_known_mod_seq > 0 && folder.state.supports_mod_seq();
        let expected = pass.expected_uids();
        if delta_reported && expected.len() as u32 == folder.cache.len() {
            folder.cache.assign_uids(&expected);
        } else {
            let summaries = if folder.cache.len() > 0 {
                log::debug!(
                    "resync of {} accounts for {} of {} messages, listing the folder",
                    mailbox,
                    expected.len(),
                    folder.cache.len()
                );
                let summaries = inner.transport.fetch()?;
                cancel.check()?;
                summaries
            } else {
                Vec::new()
            };
            pass.listed(&summaries);
            folder.load(summaries);
        }

        let (result, events) = pass.finish();
        log::debug!(
            "resynchronized {}: {} changed, {} vanished, highestmodseq {}",
            mailbox,
            result.changed.len(),
            result.vanished.len(),
            folder.state.highest_mod_seq
        );
        inner.folder = Some(folder);
        inner.events.emit_all(events);
        Ok(result)
    }

    /// Apply `request` to the messages picked by `selector`.
    ///
    /// Returns the targets that were not updated because they changed after the request's
    /// [`unchanged_since`](StoreRequest::unchanged_since) mod-sequence. Every other target was
    /// updated and, unless the request is silent, reported to subscribers.
    pub fn store<S>(&self, selector: S, request: &StoreRequest) -> Result<ConflictSet>
    where
        S: Into<MessageSelector>,
    {
        self.store_cancellable(selector, request, &CancelToken::new())
    }

    /// Like [`store`](FolderSession::store), giving up with [`Error::Cancelled`] once `cancel`
    /// fires.
    pub fn store_cancellable<S>(
        &self,
        selector: S,
        request: &StoreRequest,
        cancel: &CancelToken,
    ) -> Result<ConflictSet>
    where
        S: Into<MessageSelector>,
    {
        let selector = selector.into();
        request.validate()?;

        let mut guard = self.lock();
        let inner = &mut *guard;
        let folder = inner.folder.as_mut().ok_or_else(not_open)?;
        request.check_folder(&folder.state, folder.access)?;

        let targets = selector.resolve(&folder.cache, folder.state.uid_validity)?;
        let (dispatch, mut conflicted) = store::partition(request, targets.clone(), &folder.cache);
        if dispatch.is_empty() {
            return Ok(conflict_set(&targets, conflicted));
        }

        cancel.check()?;
        let mut command =
            StoreCommand::new(dispatch.iter().map(|t| t.reference).collect(), request.clone());
        if request.keeps_keywords() {
            let kept = dispatch
                .iter()
                .map(|t| {
                    folder
                        .cache
                        .get(t.index)
                        .map(|m| m.keywords.clone())
                        .unwrap_or_default()
                })
                .collect();
            command = command.keeping_keywords(kept);
        }
        let response = inner.transport.store(&command)?;
        cancel.check()?;
        let notifications = inner.transport.drain_notifications()?;

        let (mine, others) = store::split_fetched(&dispatch, response.fetched);
        let mut events = Vec::new();
        for summary in others {
            events.extend(folder.apply(Notification::Fetch(summary)));
        }
        let (refused, applied) = store::commit(
            request,
            &dispatch,
            &response.modified,
            mine,
            &mut folder.state,
            &mut folder.cache,
        );
        events.extend(applied);
        for notification in notifications {
            events.extend(folder.apply(notification));
        }
        if !refused.is_empty() {
            log::debug!("{} targets modified since {:?}", refused.len(), request.precondition());
        }
        inner.events.emit_all(events);

        conflicted.extend(refused);
        Ok(conflict_set(&targets, conflicted))
    }

    /// Copy messages of the open folder to `destination`.
    pub fn copy_to<S>(&self, selector: S, destination: &str) -> Result<UniqueIdMap>
    where
        S: Into<MessageSelector>,
    {
        self.transfer(selector.into(), destination, false)
    }

    /// Move messages of the open folder to `destination`.
    ///
    /// The moved messages disappear from this folder and are reported like any other removal.
    pub fn move_to<S>(&self, selector: S, destination: &str) -> Result<UniqueIdMap>
    where
        S: Into<MessageSelector>,
    {
        self.transfer(selector.into(), destination, true)
    }

    fn transfer(
        &self,
        selector: MessageSelector,
        destination: &str,
        remove_source: bool,
    ) -> Result<UniqueIdMap> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let folder = inner.folder.as_mut().ok_or_else(not_open)?;
        if remove_source && !folder.access.is_writable() {
            return Err(Error::InvalidState("folder is open read-only".to_string()));
        }
        let validity = folder.state.uid_validity;
        let targets = selector.resolve(&folder.cache, validity)?;
        let uids = uids_of(&targets, &folder.cache)?;
        if uids.is_empty() {
            return Ok(UniqueIdMap::EMPTY);
        }

        let copied = inner.transport.copy(&uids, destination, remove_source)?;
        let notifications = inner.transport.drain_notifications()?;

        let map = match copied {
            Some(copied) => UniqueIdMap::new(
                copied
                    .source
                    .into_iter()
                    .map(|id| UniqueId::new(validity, id))
                    .collect(),
                copied
                    .destination
                    .into_iter()
                    .map(|id| UniqueId::new(copied.uid_validity, id))
                    .collect(),
            ),
            None => UniqueIdMap::EMPTY,
        };
        let events: Vec<_> = notifications
            .into_iter()
            .flat_map(|n| folder.apply(n))
            .collect();
        inner.events.emit_all(events);
        Ok(map)
    }

    /// Add a message to `mailbox`. Returns its uid if the server reported one.
    pub fn append(&self, mailbox: &str, message: &AppendMessage<'_>) -> Result<Option<UniqueId>> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let appended = inner.transport.append(mailbox, message)?;
        inner.drain()?;
        Ok(appended.and_then(|a| {
            a.uids
                .first()
                .map(|&id| UniqueId::new(a.uid_validity, id))
        }))
    }

    /// Replace message `uid` of the open folder with `message`, which is added to `mailbox`.
    pub fn replace(
        &self,
        uid: UniqueId,
        mailbox: &str,
        message: &AppendMessage<'_>,
    ) -> Result<UniqueIdMap> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let folder = inner.folder.as_ref().ok_or_else(not_open)?;
        if !folder.access.is_writable() {
            return Err(Error::InvalidState("folder is open read-only".to_string()));
        }
        if uid.validity() != folder.state.uid_validity || !uid.is_valid() {
            return Err(Error::InvalidArgument(format!(
                "uid {} does not belong to {}",
                uid, folder.name
            )));
        }

        let appended = inner.transport.replace(uid, mailbox, message)?;
        inner.drain()?;
        Ok(match appended {
            Some(a) => UniqueIdMap::new(
                vec![uid],
                a.uids
                    .into_iter()
                    .map(|id| UniqueId::new(a.uid_validity, id))
                    .collect(),
            ),
            None => UniqueIdMap::EMPTY,
        })
    }

    /// Ask the server for changes made elsewhere and deliver them to subscribers.
    pub fn poll(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.transport.noop()?;
        inner.drain()
    }

    /// Receive the events of the given categories.
    ///
    /// The channel stays open until the receiver is dropped or the session goes away.
    pub fn subscribe(&self, categories: EnumSet<EventCategory>) -> mpsc::Receiver<FolderEvent> {
        self.lock().events.subscribe(categories)
    }

    /// The versioning state of the open folder.
    pub fn sync_state(&self) -> Option<FolderSyncState> {
        self.lock().folder.as_ref().map(|f| f.state)
    }

    /// How the open folder was opened.
    pub fn access(&self) -> Option<FolderAccess> {
        self.lock().folder.as_ref().map(|f| f.access)
    }

    /// The name of the open folder.
    pub fn folder_name(&self) -> Option<String> {
        self.lock().folder.as_ref().map(|f| f.name.clone())
    }

    /// `UIDNEXT` of the open folder, as reported when it was opened.
    pub fn uid_next(&self) -> Option<Uid> {
        self.lock().folder.as_ref().and_then(|f| f.uid_next)
    }

    /// The number of messages in the open folder.
    pub fn count(&self) -> u32 {
        self.lock().folder.as_ref().map_or(0, |f| f.cache.len())
    }

    /// What the session knows about the message at `index`.
    pub fn message(&self, index: u32) -> Option<MessageState> {
        self.lock()
            .folder
            .as_ref()
            .and_then(|f| f.cache.get(index).cloned())
    }

    /// What the session knows about every message, in order.
    pub fn messages(&self) -> Vec<MessageState> {
        self.lock()
            .folder
            .as_ref()
            .map(|f| f.cache.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Tear down the session and return the transport.
    pub fn into_transport(self) -> T {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .transport
    }
}

impl<T: FolderTransport> Inner<T> {
    fn drain(&mut self) -> Result<()> {
        let notifications = self.transport.drain_notifications()?;
        let Some(folder) = self.folder.as_mut() else {
            if !notifications.is_empty() {
                log::debug!("dropping {} notifications, no folder is open", notifications.len());
            }
            return Ok(());
        };
        let events: Vec<_> = notifications
            .into_iter()
            .flat_map(|n| folder.apply(n))
            .collect();
        self.events.emit_all(events);
        Ok(())
    }
}

fn conflict_set(targets: &[Target], mut conflicted: Vec<Target>) -> ConflictSet {
    conflicted.sort_by_key(|c| targets.iter().position(|t| t == c));
    ConflictSet::new(conflicted.into_iter().map(|t| t.reference).collect())
}

fn uids_of(targets: &[Target], cache: &MessageCache) -> Result<Vec<UniqueId>> {
    targets
        .iter()
        .map(|t| {
            cache.get(t.index).and_then(|m| m.uid).ok_or_else(|| {
                Error::InvalidArgument(format!("message at index {} has no known uid", t.index))
            })
        })
        .collect()
}

impl OpenFolder {
    fn new(name: &str, response: &OpenResponse, quick_resync_enabled: bool) -> Self {
        OpenFolder {
            name: name.to_string(),
            access: response.access,
            state: FolderSyncState {
                uid_validity: response.uid_validity,
                highest_mod_seq: response.highest_mod_seq.unwrap_or(0),
                quick_resync_enabled,
            },
            cache: MessageCache::with_len(response.exists),
            uid_next: response.uid_next,
        }
    }

    /// Take in a listing of the folder. Nothing here is news to subscribers.
    fn load(&mut self, summaries: Vec<MessageSummary>) {
        for summary in summaries {
            if let Some(mod_seq) = summary.mod_seq {
                self.state.observe(mod_seq);
            }
            self.cache.upsert(&summary);
        }
    }

    /// Take in a notification received while opening.
    fn absorb(&mut self, notification: Notification) {
        match notification {
            Notification::Fetch(summary) => self.load(vec![summary]),
            Notification::Exists(exists) => self.cache.grow(exists),
            Notification::HighestModSeq(mod_seq) => {
                self.state.observe(mod_seq);
            }
            Notification::Expunge(index) => {
                self.cache.remove(index);
            }
            Notification::Vanished(set) => {
                self.cache.remove_vanished(&set);
            }
        }
    }

    /// Apply a notification about a change made elsewhere.
    fn apply(&mut self, notification: Notification) -> Vec<FolderEvent> {
        let quick = self.state.quick_resync_enabled;
        let mut events = Vec::new();
        match notification {
            Notification::Fetch(summary) => {
                let before = self.state.highest_mod_seq;
                if let Some(mod_seq) = summary.mod_seq {
                    if !self.state.observe(mod_seq) {
                        log::warn!(
                            "discarding stale FETCH for index {}: modseq {} <= {}",
                            summary.index,
                            mod_seq,
                            before
                        );
                        return events;
                    }
                }
                let mod_seq = summary.mod_seq.filter(|_| self.state.supports_mod_seq());
                let state = self.cache.upsert(&summary).clone();
                if summary.flags.is_some() || summary.keywords.is_some() {
                    events.push(store::change_event(false, summary.index, &state, mod_seq));
                }
                if summary.labels.is_some() {
                    events.push(store::change_event(true, summary.index, &state, mod_seq));
                }
                if self.state.highest_mod_seq != before {
                    events.push(FolderEvent::HighestModSeqChanged(self.state.highest_mod_seq));
                }
            }
            Notification::Vanished(set) => {
                let before = u64::from(self.cache.len());
                let removed = self.cache.remove_vanished(&set);
                if quick {
                    // a genuine report names no more uids than the folder held
                    let uids = if set.len() <= before {
                        set.iter().collect()
                    } else {
                        log::warn!(
                            "VANISHED names {} uids in a folder of {} messages",
                            set.len(),
                            before
                        );
                        removed.iter().map(|&(_, uid)| uid).collect()
                    };
                    if !set.is_empty() {
                        events.push(FolderEvent::MessagesVanished {
                            uids,
                            earlier: set.earlier,
                        });
                    }
                } else {
                    events.extend(
                        removed
                            .into_iter()
                            .map(|(index, _)| FolderEvent::MessageExpunged { index }),
                    );
                }
            }
            Notification::Expunge(index) => match self.cache.remove(index) {
                None => log::warn!(
                    "EXPUNGE of index {} in a folder of {} messages",
                    index,
                    self.cache.len() + 1
                ),
                Some(MessageState { uid: Some(uid), .. }) if quick => {
                    events.push(FolderEvent::MessagesVanished {
                        uids: vec![uid],
                        earlier: false,
                    });
                }
                Some(_) => {
                    if quick {
                        log::warn!("EXPUNGE of index {} whose uid is unknown", index);
                    }
                    events.push(FolderEvent::MessageExpunged { index });
                }
            },
            Notification::Exists(exists) => {
                if exists < self.cache.len() {
                    log::debug!(
                        "EXISTS {} below {} cached messages, expecting expunges",
                        exists,
                        self.cache.len()
                    );
                }
                self.cache.grow(exists);
            }
            Notification::HighestModSeq(mod_seq) => {
                if self.state.supports_mod_seq() && self.state.observe(mod_seq) {
                    events.push(FolderEvent::HighestModSeqChanged(mod_seq));
                }
            }
        }
        events
    }
}
