use std::iter::Zip;
use std::slice;

use super::UniqueId;
use crate::error::{Error, Result};

/// Correlates the identities of messages before and after a `COPY`, `MOVE`, `APPEND` or
/// `REPLACE`.
///
/// `destination[i]` is the post-operation identity of the message that was `source[i]`. The two
/// sequences may differ in length, in which case only the first `min(source, destination)`
/// entries are correlated. `source` may contain duplicates or [`UniqueId::INVALID`]; a
/// [`lookup`](UniqueIdMap::lookup) uses the first matching entry.
///
/// A map is immutable once built and can be shared freely between threads.
///
/// ```
/// use imap_resync::types::{UniqueId, UniqueIdMap};
///
/// let map = UniqueIdMap::new(
///     vec![UniqueId::new(1, 5), UniqueId::new(1, 9)],
///     vec![UniqueId::new(4, 100)],
/// );
/// assert_eq!(map.lookup(UniqueId::new(1, 5)), Some(UniqueId::new(4, 100)));
/// assert_eq!(map.lookup(UniqueId::new(1, 9)), None);
/// assert_eq!(map.len(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UniqueIdMap {
    source: Vec<UniqueId>,
    destination: Vec<UniqueId>,
}

impl UniqueIdMap {
    /// No correlation is available, e.g. because the destination folder does not report
    /// `COPYUID`/`APPENDUID`.
    pub const EMPTY: UniqueIdMap = UniqueIdMap {
        source: Vec::new(),
        destination: Vec::new(),
    };

    /// Correlate `source[i]` with `destination[i]`.
    pub fn new(source: Vec<UniqueId>, destination: Vec<UniqueId>) -> Self {
        UniqueIdMap {
            source,
            destination,
        }
    }

    /// Like [`UniqueIdMap::new`], for callers whose sequences may be missing.
    ///
    /// Fails with [`Error::InvalidArgument`] if either side is `None`.
    pub fn try_from_parts(
        source: Option<Vec<UniqueId>>,
        destination: Option<Vec<UniqueId>>,
    ) -> Result<Self> {
        match (source, destination) {
            (Some(source), Some(destination)) => Ok(Self::new(source, destination)),
            (None, _) => Err(Error::InvalidArgument(
                "uid map requires a source sequence".to_string(),
            )),
            (_, None) => Err(Error::InvalidArgument(
                "uid map requires a destination sequence".to_string(),
            )),
        }
    }

    /// The post-operation identity of `id`, if it was correlated.
    pub fn lookup(&self, id: UniqueId) -> Option<UniqueId> {
        let i = self.source.iter().position(|s| *s == id)?;
        self.destination.get(i).copied()
    }

    /// Whether [`lookup`](UniqueIdMap::lookup) would find `id`.
    pub fn contains(&self, id: UniqueId) -> bool {
        self.lookup(id).is_some()
    }

    /// The number of correlated pairs.
    pub fn len(&self) -> usize {
        self.source.len().min(self.destination.len())
    }

    /// `true` if no pair is correlated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The correlated source ids, in order.
    pub fn keys(&self) -> impl Iterator<Item = UniqueId> + '_ {
        self.iter().map(|(s, _)| s)
    }

    /// The correlated destination ids, in order.
    pub fn values(&self) -> impl Iterator<Item = UniqueId> + '_ {
        self.iter().map(|(_, d)| d)
    }

    /// The `UIDVALIDITY` of the destination folder, if any destination id is known.
    pub fn validity(&self) -> Option<u32> {
        self.destination
            .iter()
            .find(|d| d.is_valid())
            .map(|d| d.validity())
    }

    /// Iterate over `(source, destination)` pairs.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.source.iter().zip(self.destination.iter()),
        }
    }

    /// The full source sequence, including entries past the correlated length.
    pub fn source(&self) -> &[UniqueId] {
        &self.source
    }

    /// The full destination sequence, including entries past the correlated length.
    pub fn destination(&self) -> &[UniqueId] {
        &self.destination
    }
}

/// Iterator over the pairs of a [`UniqueIdMap`].
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    inner: Zip<slice::Iter<'a, UniqueId>, slice::Iter<'a, UniqueId>>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (UniqueId, UniqueId);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(s, d)| (*s, *d))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a> ExactSizeIterator for Iter<'a> {}

impl<'a> IntoIterator for &'a UniqueIdMap {
    type Item = (UniqueId, UniqueId);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(validity: u32, raw: &[u32]) -> Vec<UniqueId> {
        raw.iter().map(|&id| UniqueId::new(validity, id)).collect()
    }

    #[test]
    fn empty_map() {
        let map = UniqueIdMap::EMPTY;
        assert!(map.is_empty());
        assert_eq!(map.lookup(UniqueId::new(1, 1)), None);
        assert_eq!(map.iter().count(), 0);
        assert_eq!(map.validity(), None);
    }

    #[test]
    fn missing_parts() {
        assert!(matches!(
            UniqueIdMap::try_from_parts(None, Some(vec![])),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            UniqueIdMap::try_from_parts(Some(vec![]), None),
            Err(Error::InvalidArgument(_))
        ));
        assert!(UniqueIdMap::try_from_parts(Some(vec![]), Some(vec![])).is_ok());
    }

    #[test]
    fn duplicates_use_first_entry() {
        let map = UniqueIdMap::new(ids(1, &[3, 3, 4]), ids(2, &[30, 31, 40]));
        assert_eq!(map.lookup(UniqueId::new(1, 3)), Some(UniqueId::new(2, 30)));
        assert_eq!(map.lookup(UniqueId::new(1, 4)), Some(UniqueId::new(2, 40)));
        // same raw id, different folder incarnation
        assert_eq!(map.lookup(UniqueId::new(9, 3)), None);
        assert_eq!(map.validity(), Some(2));
    }

    #[test]
    fn uneven_lengths() {
        let map = UniqueIdMap::new(ids(1, &[1, 2, 3]), ids(2, &[10]));
        assert_eq!(map.len(), 1);
        assert!(map.contains(UniqueId::new(1, 1)));
        assert!(!map.contains(UniqueId::new(1, 3)));
        assert_eq!(map.keys().collect::<Vec<_>>(), ids(1, &[1]));
        assert_eq!(map.source().len(), 3);

        let map = UniqueIdMap::new(ids(1, &[1]), ids(2, &[10, 11]));
        assert_eq!(map.values().collect::<Vec<_>>(), ids(2, &[10]));
        assert_eq!(map.destination().len(), 2);
    }

    proptest! {
        #[test]
        fn lookup_matches_position(
            src in proptest::collection::vec(1u32..50, 0..40),
            dst in proptest::collection::vec(1u32..1000, 0..40),
        ) {
            let map = UniqueIdMap::new(ids(1, &src), ids(2, &dst));
            let n = src.len().min(dst.len());
            prop_assert_eq!(map.iter().count(), n);
            for (i, s) in src.iter().enumerate().take(n) {
                let first = src.iter().position(|x| x == s).unwrap();
                prop_assert_eq!(map.lookup(UniqueId::new(1, *s)), Some(UniqueId::new(2, dst[first])));
                if first == i {
                    prop_assert_eq!(map.lookup(UniqueId::new(1, *s)), Some(UniqueId::new(2, dst[i])));
                }
            }
            prop_assert_eq!(map.lookup(UniqueId::new(1, 50)), None);
        }
    }
}
