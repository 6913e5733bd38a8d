//! Sorted interval index with a running maximum of range ends.
//!
//! Intervals are sorted by start. `max_end[i]` is the largest end among the
//! first `i + 1` intervals, so a stabbing query can walk backwards from the
//! last interval starting at or before the address and stop as soon as no
//! earlier interval can reach it. Nested scopes (function > block > inline
//! site) stay cheap because the walk only visits intervals that could still
//! cover the address.

#[derive(Debug, Clone)]
pub(crate) struct Interval<T>
{
    pub start: u64,
    pub end: u64,
    pub value: T,
}

#[derive(Debug, Clone)]
pub(crate) struct IntervalIndex<T>
{
    intervals: Vec<Interval<T>>,
    max_end: Vec<u64>,
}

impl<T> IntervalIndex<T>
{
    /// Build from unsorted intervals. Empty intervals (`end <= start`) are dropped.
    pub fn new(mut intervals: Vec<Interval<T>>) -> Self
    {
        intervals.retain(|interval| interval.end > interval.start);
        intervals.sort_by_key(|interval| interval.start);

        let mut running = 0u64;
        let max_end = intervals
            .iter()
            .map(|interval| {
                running = running.max(interval.end);
                running
            })
            .collect();

        Self { intervals, max_end }
    }

    pub fn len(&self) -> usize
    {
        self.intervals.len()
    }

    /// Every interval containing `address`, latest start first.
    pub fn containing(&self, address: u64) -> impl Iterator<Item = &Interval<T>> + '_
    {
        let upper = self.intervals.partition_point(|interval| interval.start <= address);
        (0..upper)
            .rev()
            .take_while(move |&index| self.max_end[index] > address)
            .map(move |index| &self.intervals[index])
            .filter(move |interval| interval.end > address)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn interval(start: u64, end: u64, value: &'static str) -> Interval<&'static str>
    {
        Interval { start, end, value }
    }

    #[test]
    fn test_nested_intervals_are_all_reported()
    {
        let index = IntervalIndex::new(vec![
            interval(0x1000, 0x2000, "function"),
            interval(0x1100, 0x1200, "block"),
            interval(0x1180, 0x11a0, "inline"),
            interval(0x3000, 0x3100, "other"),
        ]);

        let hits: Vec<_> = index.containing(0x1190).map(|i| i.value).collect();
        assert_eq!(hits, vec!["inline", "block", "function"]);

        let hits: Vec<_> = index.containing(0x1300).map(|i| i.value).collect();
        assert_eq!(hits, vec!["function"]);

        assert_eq!(index.containing(0x2000).count(), 0);
        assert_eq!(index.containing(0x0fff).count(), 0);
    }

    #[test]
    fn test_long_early_interval_is_found_past_short_ones()
    {
        let index = IntervalIndex::new(vec![
            interval(0, 0x10000, "outer"),
            interval(0x10, 0x20, "a"),
            interval(0x30, 0x40, "b"),
            interval(0x50, 0x60, "c"),
        ]);
        let hits: Vec<_> = index.containing(0x8000).map(|i| i.value).collect();
        assert_eq!(hits, vec!["outer"]);
    }

    #[test]
    fn test_empty_intervals_are_dropped()
    {
        let index = IntervalIndex::new(vec![interval(5, 5, "empty"), interval(9, 3, "inverted")]);
        assert_eq!(index.len(), 0);
    }
}
