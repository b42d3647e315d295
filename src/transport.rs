//! The seam between the engines and the wire.
//!
//! A [`FolderTransport`] sends already-validated commands to the server and hands back typed
//! results. It knows nothing about conflict detection or mod-sequence bookkeeping; that is the
//! job of [`FolderSession`](crate::session::FolderSession). The crate ships one implementation,
//! [`ImapTransport`](crate::imap::ImapTransport).

use chrono::{DateTime, FixedOffset};

use crate::error::Result;
use crate::resync::ResyncHints;
use crate::store::{StoreCommand, StoreResponse};
use crate::types::{
    FolderAccess, Keywords, MessageFlags, MessageSummary, ModSeq, Uid, UniqueId, VanishedSet,
};

/// Typed command results for one authenticated connection.
///
/// Implementations must surface every transport failure as an error rather than partial data.
/// Unsolicited responses that arrive while a command runs are queued and returned from
/// [`drain_notifications`](FolderTransport::drain_notifications).
pub trait FolderTransport {
    /// Turn on quick resync for the rest of the connection (`ENABLE QRESYNC`).
    fn enable_quick_resync(&mut self) -> Result<()>;

    /// Open `mailbox`. With `hints`, ask the server for the changes since then.
    fn open(
        &mut self,
        mailbox: &str,
        access: FolderAccess,
        hints: Option<&ResyncHints>,
    ) -> Result<OpenResponse>;

    /// Run one `STORE` against the open folder.
    fn store(&mut self, command: &StoreCommand) -> Result<StoreResponse>;

    /// Flags, uids and mod-sequences of every message of the open folder.
    fn fetch(&mut self) -> Result<Vec<MessageSummary>>;

    /// Copy (or, with `remove_source`, move) messages of the open folder to `destination`.
    fn copy(
        &mut self,
        uids: &[UniqueId],
        destination: &str,
        remove_source: bool,
    ) -> Result<Option<CopyUid>>;

    /// Add a message to `mailbox`.
    fn append(&mut self, mailbox: &str, message: &AppendMessage<'_>) -> Result<Option<AppendUid>>;

    /// Atomically replace message `uid` of the open folder with a new message in `mailbox`.
    fn replace(
        &mut self,
        uid: UniqueId,
        mailbox: &str,
        message: &AppendMessage<'_>,
    ) -> Result<Option<AppendUid>>;

    /// Give the server a chance to report changes.
    fn noop(&mut self) -> Result<()>;

    /// Every unsolicited notification received since the last call, in arrival order.
    fn drain_notifications(&mut self) -> Result<Vec<Notification>>;
}

/// The result of opening a folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenResponse {
    /// `UIDVALIDITY`
    pub uid_validity: u32,
    /// `UIDNEXT`, if reported.
    pub uid_next: Option<Uid>,
    /// `HIGHESTMODSEQ`, or `None` if the folder has no mod-sequences (`NOMODSEQ`).
    pub highest_mod_seq: Option<ModSeq>,
    /// `EXISTS`
    pub exists: u32,
    /// Whether the server granted write access.
    pub access: FolderAccess,
    /// Everything else the server sent while opening: for a resync, the changed and vanished
    /// messages.
    pub notifications: Vec<Notification>,
}

impl OpenResponse {
    pub fn new(uid_validity: u32, exists: u32, access: FolderAccess) -> Self {
        OpenResponse {
            uid_validity,
            uid_next: None,
            highest_mod_seq: None,
            exists,
            access,
            notifications: Vec::new(),
        }
    }
}

/// Something the server reported about the open folder.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Notification {
    /// A `FETCH` response.
    Fetch(MessageSummary),
    /// A `VANISHED` response.
    Vanished(VanishedSet),
    /// An `EXPUNGE` response, as a 0-based index.
    Expunge(u32),
    /// An `EXISTS` response.
    Exists(u32),
    /// A `HIGHESTMODSEQ` response code.
    HighestModSeq(ModSeq),
}

/// The [`COPYUID`](https://tools.ietf.org/html/rfc4315#section-3) response code, expanded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyUid {
    /// `UIDVALIDITY` of the destination folder.
    pub uid_validity: u32,
    /// Source uids, in the order the server matched them.
    pub source: Vec<Uid>,
    /// Destination uids, aligned with `source`.
    pub destination: Vec<Uid>,
}

/// The [`APPENDUID`](https://tools.ietf.org/html/rfc4315#section-3) response code, expanded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendUid {
    /// `UIDVALIDITY` of the destination folder.
    pub uid_validity: u32,
    /// The uids assigned to the new messages.
    pub uids: Vec<Uid>,
}

/// A message to `APPEND` or `REPLACE` with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendMessage<'a> {
    pub(crate) content: &'a [u8],
    pub(crate) flags: MessageFlags,
    pub(crate) keywords: Keywords,
    pub(crate) internal_date: Option<DateTime<FixedOffset>>,
}

impl<'a> AppendMessage<'a> {
    /// A message with the full RFC 822 `content`.
    pub fn new(content: &'a [u8]) -> Self {
        AppendMessage {
            content,
            flags: MessageFlags::empty(),
            keywords: Keywords::new(),
            internal_date: None,
        }
    }

    /// Set these flags on the new message.
    pub fn flags(mut self, flags: MessageFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set these keywords on the new message.
    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Use `date` as the message's internal date rather than the time of arrival.
    pub fn internal_date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.internal_date = Some(date);
        self
    }

    pub fn content(&self) -> &[u8] {
        self.content
    }

    pub fn message_flags(&self) -> MessageFlags {
        self.flags
    }

    pub fn message_keywords(&self) -> &Keywords {
        &self.keywords
    }

    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.internal_date
    }
}
