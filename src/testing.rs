//! Enable the test_helpers feature to expose a scriptable [`MockTransport`] and helpers that
//! build notifications from raw server output, for testing code that uses this crate without a
//! server.
//!
//! To use add a dev-dependency on the crate with the feature "test_helpers"
//! e.g.
//!
//! ```toml
//! [dependencies]
//! imap-resync = { version = "0.1" }
//!
//! [dev-dependencies]
//! # mirror the same configuration your dependencies and add test_helpers
//! imap-resync = { version = "0.1", features = ["test_helpers"] }
//! ```
//!
use std::collections::VecDeque;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::resync::ResyncHints;
use crate::store::{StoreCommand, StoreResponse};
use crate::transport::{
    AppendMessage, AppendUid, CopyUid, FolderTransport, Notification, OpenResponse,
};
use crate::types::{FolderAccess, MessageSummary, UniqueId};

/// A command as the [`MockTransport`] received it.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Command {
    /// `ENABLE QRESYNC`
    EnableQuickResync,
    /// `SELECT` or `EXAMINE`
    Open {
        /// Folder name.
        mailbox: String,
        /// Requested access.
        access: FolderAccess,
        /// Resync hints, if any.
        hints: Option<ResyncHints>,
    },
    /// `STORE` or `UID STORE`
    Store(StoreCommand),
    /// `UID FETCH`
    Fetch,
    /// `UID COPY` or `UID MOVE`
    Copy {
        /// Source uids.
        uids: Vec<UniqueId>,
        /// Destination folder.
        destination: String,
        /// `true` for a move.
        remove_source: bool,
    },
    /// `APPEND`
    Append {
        /// Destination folder.
        mailbox: String,
        /// Message bytes.
        content: Vec<u8>,
    },
    /// `UID REPLACE`
    Replace {
        /// The replaced message.
        uid: UniqueId,
        /// Destination folder.
        mailbox: String,
        /// Message bytes.
        content: Vec<u8>,
    },
    /// `NOOP`
    Noop,
}

/// A [`FolderTransport`] that replays scripted results and records every command.
///
/// Results are consumed in the order they were pushed. When nothing was scripted, `store`,
/// `fetch`, `copy`, `append` and `replace` succeed with an empty answer, while `open` fails with
/// [`Error::No`].
///
/// ```
/// # #[cfg(feature = "test_helpers")] {
/// use imap_resync::testing::{Command, MockTransport};
/// use imap_resync::transport::OpenResponse;
/// use imap_resync::types::FolderAccess;
/// use imap_resync::FolderSession;
///
/// let mut transport = MockTransport::new();
/// transport.push_open(OpenResponse::new(7, 0, FolderAccess::ReadWrite));
/// let session = FolderSession::new(transport);
/// session.open("INBOX", FolderAccess::ReadWrite).unwrap();
/// assert!(matches!(session.into_transport().commands()[0], Command::Open { .. }));
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MockTransport {
    opens: VecDeque<Result<OpenResponse>>,
    stores: VecDeque<Result<StoreResponse>>,
    fetches: VecDeque<Vec<MessageSummary>>,
    copies: VecDeque<Option<CopyUid>>,
    appends: VecDeque<Option<AppendUid>>,
    pending: Vec<Notification>,
    cancel_during_store: Option<CancelToken>,
    commands: Vec<Command>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next `open`.
    pub fn push_open(&mut self, response: OpenResponse) -> &mut Self {
        self.opens.push_back(Ok(response));
        self
    }

    /// Fail the next `open`.
    pub fn push_open_error(&mut self, error: Error) -> &mut Self {
        self.opens.push_back(Err(error));
        self
    }

    /// Answer the next `store`.
    pub fn push_store(&mut self, response: StoreResponse) -> &mut Self {
        self.stores.push_back(Ok(response));
        self
    }

    /// Fail the next `store`, e.g. with [`Error::ConnectionLost`].
    pub fn push_store_error(&mut self, error: Error) -> &mut Self {
        self.stores.push_back(Err(error));
        self
    }

    /// Answer the next `fetch`.
    pub fn push_fetch(&mut self, summaries: Vec<MessageSummary>) -> &mut Self {
        self.fetches.push_back(summaries);
        self
    }

    /// Answer the next `copy`.
    pub fn push_copy(&mut self, copied: Option<CopyUid>) -> &mut Self {
        self.copies.push_back(copied);
        self
    }

    /// Answer the next `append` or `replace`.
    pub fn push_append(&mut self, appended: Option<AppendUid>) -> &mut Self {
        self.appends.push_back(appended);
        self
    }

    /// Queue unsolicited notifications for the next drain.
    pub fn push_notifications(&mut self, notifications: Vec<Notification>) -> &mut Self {
        self.pending.extend(notifications);
        self
    }

    /// Fire `token` while the next `store` is in flight.
    pub fn cancel_during_store(&mut self, token: CancelToken) -> &mut Self {
        self.cancel_during_store = Some(token);
        self
    }

    /// Every command received so far.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// The `STORE` commands received so far.
    pub fn stores(&self) -> Vec<&StoreCommand> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Store(store) => Some(store),
                _ => None,
            })
            .collect()
    }
}

impl FolderTransport for MockTransport {
    fn enable_quick_resync(&mut self) -> Result<()> {
        self.commands.push(Command::EnableQuickResync);
        Ok(())
    }

    fn open(
        &mut self,
        mailbox: &str,
        access: FolderAccess,
        hints: Option<&ResyncHints>,
    ) -> Result<OpenResponse> {
        self.commands.push(Command::Open {
            mailbox: mailbox.to_string(),
            access,
            hints: hints.cloned(),
        });
        self.opens
            .pop_front()
            .unwrap_or_else(|| Err(Error::No(format!("no such mailbox: {}", mailbox))))
    }

    fn store(&mut self, command: &StoreCommand) -> Result<StoreResponse> {
        self.commands.push(Command::Store(command.clone()));
        if let Some(token) = self.cancel_during_store.take() {
            token.cancel();
        }
        self.stores.pop_front().unwrap_or_else(|| Ok(StoreResponse::default()))
    }

    fn fetch(&mut self) -> Result<Vec<MessageSummary>> {
        self.commands.push(Command::Fetch);
        Ok(self.fetches.pop_front().unwrap_or_default())
    }

    fn copy(
        &mut self,
        uids: &[UniqueId],
        destination: &str,
        remove_source: bool,
    ) -> Result<Option<CopyUid>> {
        self.commands.push(Command::Copy {
            uids: uids.to_vec(),
            destination: destination.to_string(),
            remove_source,
        });
        Ok(self.copies.pop_front().flatten())
    }

    fn append(&mut self, mailbox: &str, message: &AppendMessage<'_>) -> Result<Option<AppendUid>> {
        self.commands.push(Command::Append {
            mailbox: mailbox.to_string(),
            content: message.content().to_vec(),
        });
        Ok(self.appends.pop_front().flatten())
    }

    fn replace(
        &mut self,
        uid: UniqueId,
        mailbox: &str,
        message: &AppendMessage<'_>,
    ) -> Result<Option<AppendUid>> {
        self.commands.push(Command::Replace {
            uid,
            mailbox: mailbox.to_string(),
            content: message.content().to_vec(),
        });
        Ok(self.appends.pop_front().flatten())
    }

    fn noop(&mut self) -> Result<()> {
        self.commands.push(Command::Noop);
        Ok(())
    }

    fn drain_notifications(&mut self) -> Result<Vec<Notification>> {
        Ok(std::mem::take(&mut self.pending))
    }
}

/// Methods to build [`Notification`]s from raw server output
pub mod notifications {
    use crate::transport::Notification;

    /// Builds [`Notification`]s for a folder with `UIDVALIDITY` `uid_validity` based on the
    /// provided input
    ///
    /// Example input.
    ///
    /// ```
    /// let input = "\
    /// * 24 FETCH (FLAGS (\\Seen) UID 4827943 MODSEQ (65402))\r\n\
    /// * VANISHED 405,407,410\r\n\
    /// * 3 EXPUNGE\r\n\
    /// ";
    /// ```
    pub fn parse(input: impl Into<Vec<u8>>, uid_validity: u32) -> Vec<Notification> {
        crate::imap::parse::parse_untagged(&input.into(), uid_validity)
            .unwrap()
            .notifications
    }
}
