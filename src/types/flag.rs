use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use bitflags::bitflags;

use crate::utils::iter_join;

/// An open set of user-defined keywords (or Gmail labels).
///
/// Keywords are case-sensitive and unique; the set is kept sorted so that serialized commands
/// are stable.
pub type Keywords = BTreeSet<String>;

/// With the exception of [`Flag::Custom`], these flags are system flags that are pre-defined in
/// [RFC 3501 section 2.3.2](https://tools.ietf.org/html/rfc3501#section-2.3.2). All system flags
/// begin with `\` in the IMAP protocol.
///
/// This is the wire-level view of a single flag. The engine works on [`MessageFlags`] and
/// [`Keywords`]; [`MessageFlags::split`] converts between the two.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub enum Flag<'a> {
    /// Message has been read
    Seen,

    /// Message has been answered
    Answered,

    /// Message is "flagged" for urgent/special attention
    Flagged,

    /// Message is "deleted" for removal by later EXPUNGE
    Deleted,

    /// Message has not completed composition (marked as a draft).
    Draft,

    /// Message is "recently" arrived in this mailbox. This flag can not be altered by the client.
    Recent,

    /// The `PERMANENTFLAGS` of a folder can include this special flag (`\*`), which indicates that
    /// it is possible to create new keywords by attempting to store those flags in the mailbox.
    MayCreate,

    /// A non-standard user- or server-defined flag.
    Custom(Cow<'a, str>),
}

impl Flag<'static> {
    fn system(s: &str) -> Option<Self> {
        match s {
            "\\Seen" => Some(Flag::Seen),
            "\\Answered" => Some(Flag::Answered),
            "\\Flagged" => Some(Flag::Flagged),
            "\\Deleted" => Some(Flag::Deleted),
            "\\Draft" => Some(Flag::Draft),
            "\\Recent" => Some(Flag::Recent),
            "\\*" => Some(Flag::MayCreate),
            _ => None,
        }
    }
}

impl<'a> Flag<'a> {
    /// The bit for this flag, or `None` for a keyword.
    pub fn as_message_flag(&self) -> Option<MessageFlags> {
        match *self {
            Flag::Seen => Some(MessageFlags::SEEN),
            Flag::Answered => Some(MessageFlags::ANSWERED),
            Flag::Flagged => Some(MessageFlags::FLAGGED),
            Flag::Deleted => Some(MessageFlags::DELETED),
            Flag::Draft => Some(MessageFlags::DRAFT),
            Flag::Recent => Some(MessageFlags::RECENT),
            Flag::MayCreate => Some(MessageFlags::USER_DEFINED),
            Flag::Custom(_) => None,
        }
    }
}

impl<'a> fmt::Display for Flag<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Flag::Seen => write!(f, "\\Seen"),
            Flag::Answered => write!(f, "\\Answered"),
            Flag::Flagged => write!(f, "\\Flagged"),
            Flag::Deleted => write!(f, "\\Deleted"),
            Flag::Draft => write!(f, "\\Draft"),
            Flag::Recent => write!(f, "\\Recent"),
            Flag::MayCreate => write!(f, "\\*"),
            Flag::Custom(ref s) => write!(f, "{}", s),
        }
    }
}

impl<'a> From<String> for Flag<'a> {
    fn from(s: String) -> Self {
        if let Some(f) = Flag::system(&s) {
            f
        } else {
            Flag::Custom(Cow::Owned(s))
        }
    }
}

impl<'a> From<&'a str> for Flag<'a> {
    fn from(s: &'a str) -> Self {
        if let Some(f) = Flag::system(s) {
            f
        } else {
            Flag::Custom(Cow::Borrowed(s))
        }
    }
}

bitflags! {
    /// The well-known per-message states.
    ///
    /// `RECENT` and `USER_DEFINED` are set by the server only. They are accepted in a
    /// [`StoreRequest`](crate::store::StoreRequest) but never sent to the server.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MessageFlags: u32 {
        /// `\Seen`
        const SEEN = 1 << 0;
        /// `\Answered`
        const ANSWERED = 1 << 1;
        /// `\Flagged`
        const FLAGGED = 1 << 2;
        /// `\Deleted`
        const DELETED = 1 << 3;
        /// `\Draft`
        const DRAFT = 1 << 4;
        /// `\Recent`
        const RECENT = 1 << 5;
        /// `\*`
        const USER_DEFINED = 1 << 6;
    }
}

impl MessageFlags {
    /// The flags a client is allowed to change with `STORE`.
    pub const STORABLE: MessageFlags = MessageFlags::SEEN
        .union(MessageFlags::ANSWERED)
        .union(MessageFlags::FLAGGED)
        .union(MessageFlags::DELETED)
        .union(MessageFlags::DRAFT);

    /// Only the bits of `self` that a client may store.
    pub fn storable(self) -> MessageFlags {
        self & MessageFlags::STORABLE
    }

    /// Separate wire-level flags into system flags and keywords.
    pub fn split<'a, I>(flags: I) -> (MessageFlags, Keywords)
    where
        I: IntoIterator<Item = Flag<'a>>,
    {
        let mut system = MessageFlags::empty();
        let mut keywords = Keywords::new();
        for flag in flags {
            match flag.as_message_flag() {
                Some(bit) => system |= bit,
                None => {
                    keywords.insert(flag.to_string());
                }
            }
        }
        (system, keywords)
    }

    /// The wire-level flags for the bits set in `self`, in a fixed order.
    pub fn to_flags(self) -> Vec<Flag<'static>> {
        [
            (MessageFlags::SEEN, Flag::Seen),
            (MessageFlags::ANSWERED, Flag::Answered),
            (MessageFlags::FLAGGED, Flag::Flagged),
            (MessageFlags::DELETED, Flag::Deleted),
            (MessageFlags::DRAFT, Flag::Draft),
            (MessageFlags::RECENT, Flag::Recent),
            (MessageFlags::USER_DEFINED, Flag::MayCreate),
        ]
        .into_iter()
        .filter(|(bit, _)| self.contains(*bit))
        .map(|(_, flag)| flag)
        .collect()
    }

    /// Render `self` and `keywords` as a parenthesized IMAP flag list, e.g. `(\Seen $Junk)`.
    ///
    /// Only [storable](MessageFlags::STORABLE) flags are included.
    pub(crate) fn flag_list(self, keywords: Option<&Keywords>) -> String {
        let system = self.storable().to_flags().into_iter().map(|f| f.to_string());
        let custom = keywords.into_iter().flatten().cloned();
        format!("({})", iter_join(system.chain(custom), " "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_flags_parse() {
        assert_eq!(Flag::from("\\Seen"), Flag::Seen);
        assert_eq!(Flag::from("\\*"), Flag::MayCreate);
        assert_eq!(Flag::from("$Junk"), Flag::Custom("$Junk".into()));
        // keywords are case-sensitive, system flags match exactly
        assert_eq!(Flag::from("\\seen"), Flag::Custom("\\seen".into()));
    }

    #[test]
    fn split_keeps_keywords_apart() {
        let (flags, keywords) = MessageFlags::split(vec![
            Flag::from("\\Seen"),
            Flag::from("$Forwarded"),
            Flag::from("\\Recent"),
            Flag::from("$Forwarded"),
        ]);
        assert_eq!(flags, MessageFlags::SEEN | MessageFlags::RECENT);
        assert_eq!(keywords.len(), 1);
        assert!(keywords.contains("$Forwarded"));
    }

    #[test]
    fn flag_list_skips_server_flags() {
        let keywords: Keywords = ["$Label1".to_string()].into_iter().collect();
        let flags = MessageFlags::SEEN | MessageFlags::RECENT | MessageFlags::DELETED;
        assert_eq!(flags.flag_list(Some(&keywords)), "(\\Seen \\Deleted $Label1)");
        assert_eq!(MessageFlags::empty().flag_list(None), "()");
        assert_eq!(MessageFlags::RECENT.storable(), MessageFlags::empty());
    }
}
