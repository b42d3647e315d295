use std::ops::RangeInclusive;

/// Lovingly borrowed from the cargo crate
///
/// Joins an iterator of [std::fmt::Display]'ables into an output writable
pub(crate) fn iter_join_onto<W, I, T>(mut w: W, iter: I, delim: &str) -> std::fmt::Result
where
    W: std::fmt::Write,
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    let mut it = iter.into_iter().peekable();
    while let Some(n) = it.next() {
        write!(w, "{}", n)?;
        if it.peek().is_some() {
            write!(w, "{}", delim)?;
        }
    }
    Ok(())
}

/// Lovingly borrowed from the cargo crate
///
/// Joins an iterator of [std::fmt::Display]'ables to a new [std::string::String].
pub(crate) fn iter_join<I, T>(iter: I, delim: &str) -> String
where
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    let mut s = String::new();
    let _ = iter_join_onto(&mut s, iter, delim);
    s
}

/// Collapse numbers into runs, in ascending order.
pub(crate) fn runs<I>(ids: I) -> Vec<RangeInclusive<u32>>
where
    I: IntoIterator<Item = u32>,
{
    let mut ids: Vec<u32> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();

    let mut runs: Vec<RangeInclusive<u32>> = Vec::new();
    for id in ids {
        match runs.last_mut() {
            Some(run) if run.end().checked_add(1) == Some(id) => *run = *run.start()..=id,
            _ => runs.push(id..=id),
        }
    }
    runs
}

/// Render numbers as a compact IMAP
/// [sequence set](https://tools.ietf.org/html/rfc3501#section-9), e.g. `1:3,5,7:9`.
pub(crate) fn sequence_set<I>(ids: I) -> String
where
    I: IntoIterator<Item = u32>,
{
    iter_join(
        runs(ids).into_iter().map(|run| {
            if run.start() == run.end() {
                run.start().to_string()
            } else {
                format!("{}:{}", run.start(), run.end())
            }
        }),
        ",",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join() {
        assert_eq!(iter_join(["a", "b", "c"], " "), "a b c");
        assert_eq!(iter_join(Vec::<u32>::new(), ","), "");
    }

    #[test]
    fn compact_sets() {
        assert_eq!(sequence_set(vec![5, 1, 2, 3, 9, 8, 7, 2]), "1:3,5,7:9");
        assert_eq!(sequence_set(vec![42]), "42");
        assert_eq!(sequence_set(vec![u32::MAX, u32::MAX - 1]), "4294967294:4294967295");
        assert_eq!(sequence_set(Vec::new()), "");
    }
}
