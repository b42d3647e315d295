use std::ops::RangeInclusive;

use super::{Uid, UniqueId};

/// Messages that are known to have been removed from a folder, as reported by a
/// [`VANISHED` response](https://tools.ietf.org/html/rfc7162#section-3.2.10).
///
/// When `earlier` is `true` the set answers "what was removed since the mod-sequence you gave me"
/// and more `VANISHED (EARLIER)` responses for the same pool of uids may follow during the same
/// resynchronization. When it is `false` the set is an authoritative report of messages that
/// were just expunged.
///
/// The set is kept as the ranges the server sent, so a report such as `1:4000000000` costs no
/// more than `1:2`. Iterating it does visit every uid.
///
/// ```
/// use imap_resync::types::{UniqueId, VanishedSet};
///
/// let vanished = VanishedSet::from_ranges(7, &[1..=1, 3..=5], true);
/// let uids: Vec<u32> = vanished.iter().map(|u| u.id()).collect();
/// assert_eq!(uids, vec![1, 3, 4, 5]);
/// assert!(vanished.contains(UniqueId::new(7, 4)));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VanishedSet {
    validity: u32,
    /// Sorted, disjoint and non-adjacent.
    ranges: Vec<RangeInclusive<Uid>>,
    /// Whether this is an incremental answer to a resynchronization request.
    pub earlier: bool,
}

impl VanishedSet {
    /// A set over `uids`, which must all belong to the same folder incarnation.
    pub fn new(uids: Vec<UniqueId>, earlier: bool) -> Self {
        let validity = uids.first().map_or(0, |u| u.validity());
        let ranges: Vec<_> = uids.iter().map(|u| u.id()..=u.id()).collect();
        Self::from_ranges(validity, &ranges, earlier)
    }

    /// A set over a uid sequence set (as found on the wire) of folder incarnation `validity`.
    pub fn from_ranges(validity: u32, ranges: &[RangeInclusive<Uid>], earlier: bool) -> Self {
        let mut set = VanishedSet {
            validity,
            ranges: ranges.to_vec(),
            earlier,
        };
        set.normalize();
        set
    }

    fn normalize(&mut self) {
        let mut ranges: Vec<_> = std::mem::take(&mut self.ranges)
            .into_iter()
            .map(|r| (*r.start()).min(*r.end())..=(*r.start()).max(*r.end()))
            .collect();
        ranges.sort_by_key(|r| *r.start());
        for range in ranges {
            match self.ranges.last_mut() {
                Some(last) if range.start().saturating_sub(1) <= *last.end() => {
                    *last = *last.start()..=(*last.end()).max(*range.end());
                }
                _ => self.ranges.push(range),
            }
        }
    }

    /// `true` if no uid is in the set.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The number of uids in the set.
    pub fn len(&self) -> u64 {
        self.ranges
            .iter()
            .map(|r| u64::from(*r.end() - *r.start()) + 1)
            .sum()
    }

    /// The `UIDVALIDITY` the uids belong to.
    pub fn validity(&self) -> u32 {
        self.validity
    }

    /// The uids as sorted, disjoint ranges.
    pub fn ranges(&self) -> &[RangeInclusive<Uid>] {
        &self.ranges
    }

    /// Iterate over the uids in ascending order.
    pub fn iter(&self) -> VanishedIter<'_> {
        VanishedIter {
            validity: self.validity,
            ranges: self.ranges.iter(),
            current: None,
        }
    }

    /// Whether `uid` is in the set.
    pub fn contains(&self, uid: UniqueId) -> bool {
        if uid.validity() != self.validity {
            return false;
        }
        let id = uid.id();
        let i = self.ranges.partition_point(|r| *r.end() < id);
        self.ranges.get(i).map_or(false, |r| r.contains(&id))
    }

    /// The members of `uids` that are in the set, in the order given.
    pub fn intersect<I>(&self, uids: I) -> Vec<UniqueId>
    where
        I: IntoIterator<Item = UniqueId>,
    {
        uids.into_iter().filter(|&u| self.contains(u)).collect()
    }

    /// Fold a later notification for the same resynchronization into this one.
    pub fn merge(&mut self, other: VanishedSet) {
        self.earlier |= other.earlier;
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            self.validity = other.validity;
        }
        self.ranges.extend(other.ranges);
        self.normalize();
    }
}

/// Iterator over the uids of a [`VanishedSet`].
#[derive(Clone, Debug)]
pub struct VanishedIter<'a> {
    validity: u32,
    ranges: std::slice::Iter<'a, RangeInclusive<Uid>>,
    current: Option<RangeInclusive<Uid>>,
}

impl Iterator for VanishedIter<'_> {
    type Item = UniqueId;

    fn next(&mut self) -> Option<UniqueId> {
        loop {
            if let Some(id) = self.current.as_mut().and_then(|r| r.next()) {
                return Some(UniqueId::new(self.validity, id));
            }
            self.current = Some(self.ranges.next()?.clone());
        }
    }
}

impl<'a> IntoIterator for &'a VanishedSet {
    type Item = UniqueId;
    type IntoIter = VanishedIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn seq_set() {
        let uids = VanishedSet::from_ranges(1, &[1..=1, 3..=5, 8..=9, 12..=12], false);
        let mut i = uids.iter().map(|u| u.id());
        assert_eq!(Some(1), i.next());
        assert_eq!(Some(3), i.next());
        assert_eq!(Some(4), i.next());
        assert_eq!(Some(5), i.next());
        assert_eq!(Some(8), i.next());
        assert_eq!(Some(9), i.next());
        assert_eq!(Some(12), i.next());
        assert_eq!(None, i.next());

        let uids = VanishedSet::from_ranges(1, &[], false);
        assert!(uids.is_empty());
        assert_eq!(None, uids.iter().next());
    }

    #[test]
    fn unordered_ranges() {
        let uids = VanishedSet::from_ranges(1, &[8..=9, 2..=3, 3..=3, 4..=4], true);
        assert_eq!(uids.len(), 5);
        assert_eq!(uids.ranges(), &[2..=4, 8..=9]);
        assert_eq!(
            uids.iter().map(|u| u.id()).collect::<Vec<_>>(),
            vec![2, 3, 4, 8, 9]
        );
        assert!(uids.earlier);
    }

    #[test]
    fn huge_range_stays_compact() {
        let uids = VanishedSet::from_ranges(1, &[1..=4_000_000_000, 7..=9], false);
        assert_eq!(uids.ranges().len(), 1);
        assert_eq!(uids.len(), 4_000_000_000);
        assert!(uids.contains(UniqueId::new(1, 3_999_999_999)));
        assert!(!uids.contains(UniqueId::new(1, 4_000_000_001)));
        assert!(!uids.contains(UniqueId::new(2, 5)));
        assert_eq!(
            uids.intersect(vec![UniqueId::new(1, 10), UniqueId::new(1, u32::MAX)]),
            vec![UniqueId::new(1, 10)]
        );
    }

    #[test]
    fn merge_accumulates() {
        let mut acc = VanishedSet::from_ranges(1, &[1..=2], true);
        acc.merge(VanishedSet::from_ranges(1, &[2..=4], false));
        assert!(acc.earlier);
        assert_eq!(acc.len(), 4);
        assert!(acc.contains(UniqueId::new(1, 4)));

        let mut acc = VanishedSet::default();
        acc.merge(VanishedSet::from_ranges(1, &[6..=6], false));
        assert!(!acc.earlier);
        assert_eq!(acc.validity(), 1);
        let mut count = 0;
        for uid in &acc {
            count += 1;
            assert_eq!(uid.id(), 6);
        }
        assert_eq!(count, 1);
    }
}
