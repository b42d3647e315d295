use enumset::EnumSetType;

use super::{Keywords, MessageFlags, ModSeq, UniqueId};

/// A change to the open folder, delivered to subscribers of a
/// [`FolderSession`](crate::session::FolderSession).
///
/// Events are produced both by this session's own `STORE`s (unless they were silent) and by
/// notifications from the server about changes made elsewhere. They are delivered in the order
/// their mod-sequences were assigned.
///
/// Removals are reported either as [`FolderEvent::MessagesVanished`] (when quick resync is
/// enabled) or as [`FolderEvent::MessageExpunged`] (otherwise), never both for the same message.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum FolderEvent {
    /// The flags or keywords of a message changed.
    FlagsChanged {
        /// The 0-based position of the message.
        index: u32,
        /// The unique id of the message, if known.
        uid: Option<UniqueId>,
        /// The new system flags.
        flags: MessageFlags,
        /// The new keywords.
        keywords: Keywords,
        /// The mod-sequence of the change, if the folder has mod-sequences.
        mod_seq: Option<ModSeq>,
    },

    /// The Gmail labels of a message changed.
    LabelsChanged {
        /// The 0-based position of the message.
        index: u32,
        /// The unique id of the message, if known.
        uid: Option<UniqueId>,
        /// The new labels.
        labels: Keywords,
        /// The mod-sequence of the change, if the folder has mod-sequences.
        mod_seq: Option<ModSeq>,
    },

    /// Messages were removed, as reported by a
    /// [`VANISHED` response](https://tools.ietf.org/html/rfc7162#section-3.2.10).
    ///
    /// Only sent when quick resync is enabled.
    MessagesVanished {
        /// The removed messages.
        uids: Vec<UniqueId>,
        /// Whether this was an incremental answer during resynchronization.
        earlier: bool,
    },

    /// A single message was removed, as reported by an
    /// [`EXPUNGE` response](https://tools.ietf.org/html/rfc3501#section-7.4.1). The index of every
    /// later message drops by one.
    ///
    /// Only sent when quick resync is disabled.
    MessageExpunged {
        /// The 0-based position the message had.
        index: u32,
    },

    /// The folder's `HIGHESTMODSEQ` advanced.
    HighestModSeqChanged(ModSeq),
}

impl FolderEvent {
    /// The category used to filter subscriptions.
    pub fn category(&self) -> EventCategory {
        match *self {
            FolderEvent::FlagsChanged { .. } => EventCategory::Flags,
            FolderEvent::LabelsChanged { .. } => EventCategory::Labels,
            FolderEvent::MessagesVanished { .. } => EventCategory::Vanished,
            FolderEvent::MessageExpunged { .. } => EventCategory::Expunged,
            FolderEvent::HighestModSeqChanged(_) => EventCategory::HighestModSeq,
        }
    }
}

/// The kinds of [`FolderEvent`] a subscriber can ask for.
#[derive(Debug, EnumSetType)]
pub enum EventCategory {
    /// [`FolderEvent::FlagsChanged`]
    Flags,
    /// [`FolderEvent::LabelsChanged`]
    Labels,
    /// [`FolderEvent::MessagesVanished`]
    Vanished,
    /// [`FolderEvent::MessageExpunged`]
    Expunged,
    /// [`FolderEvent::HighestModSeqChanged`]
    HighestModSeq,
}
