use std::cmp::Ordering;
use std::fmt;

use super::Uid;

/// A message identifier that stays valid for the lifetime of one folder incarnation.
///
/// The `validity` half is the folder's
/// [`UIDVALIDITY`](https://tools.ietf.org/html/rfc3501#section-2.3.1.1). When a server
/// reassigns unique identifiers it changes the validity, so two `UniqueId`s only compare equal
/// when both halves match, and they are only *ordered* relative to one another when they share a
/// validity.
///
/// [`UniqueId::INVALID`] (an `id` of `0`) stands for "no identifier".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniqueId {
    validity: u32,
    id: Uid,
}

impl UniqueId {
    /// The "no identifier" sentinel.
    pub const INVALID: UniqueId = UniqueId { validity: 0, id: 0 };

    /// A unique id `id` in the folder incarnation `validity`.
    pub const fn new(validity: u32, id: Uid) -> Self {
        UniqueId { validity, id }
    }

    /// The `UIDVALIDITY` this id belongs to.
    pub fn validity(&self) -> u32 {
        self.validity
    }

    /// The raw `UID`.
    pub fn id(&self) -> Uid {
        self.id
    }

    /// `false` for [`UniqueId::INVALID`] and any other id of `0`.
    pub fn is_valid(&self) -> bool {
        self.id != 0
    }
}

impl Default for UniqueId {
    fn default() -> Self {
        UniqueId::INVALID
    }
}

impl PartialOrd for UniqueId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.validity != other.validity {
            return None;
        }
        Some(self.id.cmp(&other.id))
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_partitions_ids() {
        let a = UniqueId::new(1, 10);
        let b = UniqueId::new(2, 10);
        assert_ne!(a, b);
        assert_eq!(a.partial_cmp(&b), None);
        assert!(UniqueId::new(1, 3) < a);
    }

    #[test]
    fn invalid_sentinel() {
        assert!(!UniqueId::INVALID.is_valid());
        assert!(!UniqueId::new(7, 0).is_valid());
        assert_eq!(UniqueId::default(), UniqueId::INVALID);
        assert_eq!(UniqueId::new(7, 42).to_string(), "42");
    }
}
