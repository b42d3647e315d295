use super::{Keywords, MessageFlags, ModSeq, UniqueId};

/// Data about one message, as reported by a
/// [`FETCH` response](https://tools.ietf.org/html/rfc3501#section-7.4.2) during a resync, after
/// a `STORE`, or by unilateral server decision (e.g., flag updates from another session).
///
/// Every field but `index` is optional. Servers are free to include more attributes than were
/// asked for, so consumers must not assume any particular shape.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct MessageSummary {
    /// The 0-based position of this message in its folder.
    pub index: u32,
    /// The unique identifier of the message.
    pub uid: Option<UniqueId>,
    /// The system flags currently set.
    pub flags: Option<MessageFlags>,
    /// The keywords currently set.
    pub keywords: Option<Keywords>,
    /// Gmail labels (`X-GM-LABELS`), if reported.
    pub labels: Option<Keywords>,
    /// The mod-sequence of the last change to this message.
    pub mod_seq: Option<ModSeq>,
}

impl MessageSummary {
    /// An otherwise empty summary for the message at `index`.
    pub fn new(index: u32) -> Self {
        MessageSummary {
            index,
            ..Default::default()
        }
    }

    /// Attach a unique id.
    pub fn with_uid(mut self, uid: UniqueId) -> Self {
        self.uid = Some(uid);
        self
    }

    /// Attach flags and keywords.
    pub fn with_flags(mut self, flags: MessageFlags, keywords: Keywords) -> Self {
        self.flags = Some(flags);
        self.keywords = Some(keywords);
        self
    }

    /// Attach labels.
    pub fn with_labels(mut self, labels: Keywords) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Attach a mod-sequence.
    pub fn with_mod_seq(mut self, mod_seq: ModSeq) -> Self {
        self.mod_seq = Some(mod_seq);
        self
    }
}
