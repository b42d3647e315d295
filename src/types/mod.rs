//! This module contains types used throughout the crate.

/// From section [2.3.1.1 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-2.3.1.1).
///
/// A 32-bit value assigned to each message, which when used with the unique identifier validity
/// value forms a 64-bit value that will not refer to any other message in the mailbox or any
/// subsequent mailbox with the same name forever. Unique identifiers are assigned in a strictly
/// ascending fashion in the mailbox, but are not necessarily contiguous.
///
/// On its own a `Uid` is only meaningful together with the `UIDVALIDITY` of the folder it came
/// from. See [`UniqueId`] for the pair.
pub type Uid = u32;

/// From section [2.3.1.2 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-2.3.1.2).
///
/// A relative position from 1 to the number of messages in the mailbox, ordered by ascending
/// unique identifier. Message sequence numbers are reassigned whenever a message is expunged.
///
/// This crate exposes 0-based *indexes* (`seq - 1`) in its public API; `Seq` only appears on the
/// wire.
pub type Seq = u32;

/// From section [3 of RFC 7162](https://tools.ietf.org/html/rfc7162#section-3).
///
/// A positive 63-bit value assigned by the server to every change of a message's metadata. The
/// per-folder `HIGHESTMODSEQ` never decreases. A value of `0` means that mod-sequences are
/// unsupported by the folder, or unknown.
pub type ModSeq = u64;

mod flag;
pub use self::flag::{Flag, Keywords, MessageFlags};

mod unique_id;
pub use self::unique_id::UniqueId;

mod unique_id_map;
pub use self::unique_id_map::{Iter, UniqueIdMap};

mod vanished;
pub use self::vanished::{VanishedIter, VanishedSet};

mod summary;
pub use self::summary::MessageSummary;

mod event;
pub use self::event::{EventCategory, FolderEvent};

mod folder;
pub use self::folder::{FolderAccess, FolderSyncState};

pub use enumset::EnumSet;
