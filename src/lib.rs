//! Conditional flag updates and quick folder resynchronization for IMAP clients.
//!
//! This crate keeps a local view of one open IMAP folder in step with the server. It builds on
//! [CONDSTORE and QRESYNC](https://tools.ietf.org/html/rfc7162) to
//!
//!  - change flags, keywords or labels only on messages nobody else touched since a known
//!    mod-sequence ([`FolderSession::store`] with [`StoreRequest::unchanged_since`]),
//!  - reopen a folder and learn only what changed and what vanished since the last session
//!    ([`FolderSession::open_with_resync`]),
//!  - map message identifiers across `COPY`, `MOVE`, `APPEND` and `REPLACE`
//!    ([`UniqueIdMap`](types::UniqueIdMap)).
//!
//! The engines talk to the server through a [`FolderTransport`]. [`imap::ImapTransport`] speaks
//! the wire protocol over any authenticated `Read + Write` stream.
//!
//! # Usage
//!
//! ```no_run
//! use imap_resync::imap::ImapTransport;
//! use imap_resync::types::{EventCategory, FolderAccess, MessageFlags, UniqueId};
//! use imap_resync::{FolderSession, ResyncHints, StoreAction, StoreRequest};
//!
//! # fn main() -> imap_resync::Result<()> {
//! # let stream = std::net::TcpStream::connect("imap.example.com:143")?;
//! // `stream` is an authenticated connection
//! let session = FolderSession::builder(ImapTransport::new(stream))
//!     .quick_resync(true)
//!     .build()?;
//! let events = session.subscribe(EventCategory::Flags | EventCategory::Vanished);
//!
//! let hints = ResyncHints::new(67890007, 90060115194045000, vec![UniqueId::new(67890007, 41)]);
//! let result = session.open_with_resync("INBOX", FolderAccess::ReadWrite, &hints)?;
//! println!("{} changed, {} vanished", result.changed.len(), result.vanished.len());
//!
//! let state = session.sync_state().expect("folder is open");
//! let request = StoreRequest::new(StoreAction::Add, MessageFlags::SEEN)
//!     .unchanged_since(state.highest_mod_seq);
//! let conflicts = session.store(0u32.., &request)?;
//! for message in &conflicts {
//!     println!("{} changed on the server, not marked seen", message);
//! }
//!
//! for event in events.try_iter() {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod error;
pub mod imap;
pub mod resync;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

mod cache;
mod events;
mod utils;

#[cfg(any(test, feature = "test_helpers"))]
pub mod testing;

#[cfg(test)]
mod mock_stream;

pub use crate::cache::MessageState;
pub use crate::cancel::CancelToken;
pub use crate::error::{Error, Result};
pub use crate::resync::{ResyncHints, ResyncMode, ResyncResult};
pub use crate::session::{FolderSession, SessionBuilder};
pub use crate::store::{ConflictSet, MessageSelector, StoreAction, StoreRequest};
pub use crate::transport::FolderTransport;
