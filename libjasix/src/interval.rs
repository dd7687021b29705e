/// Closed interval `[begin, end]` carrying a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval<T>
{
    pub begin: i32,
    pub end: i32,
    pub value: T,
}

impl<T> Interval<T>
{
    pub const fn new(begin: i32, end: i32, value: T) -> Self
    {
        Interval { begin, end, value }
    }

    pub fn overlaps(&self, begin: i32, end: i32) -> bool
    {
        self.begin <= end && self.end >= begin
    }
}

/// Static overlap structure: intervals sorted by begin plus a running
/// maximum of the ends, so a query only touches intervals that can overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalArray<T>
{
    intervals: Vec<Interval<T>>,
    max_end: Vec<i32>,
}

impl<T> Default for IntervalArray<T>
{
    fn default() -> Self
    {
        IntervalArray {
            intervals: Vec::new(),
            max_end: Vec::new(),
        }
    }
}

impl<T> IntervalArray<T>
{
    pub fn new(mut intervals: Vec<Interval<T>>) -> Self
    {
        // Stable, equal begins keep insertion order
        intervals.sort_by_key(|i| i.begin);

        let mut max_end = Vec::with_capacity(intervals.len());
        let mut running = i32::MIN;
        for interval in &intervals {
            running = running.max(interval.end);
            max_end.push(running);
        }

        IntervalArray { intervals, max_end }
    }

    pub fn len(&self) -> usize
    {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interval<T>>
    {
        self.intervals.iter()
    }

    /// All intervals overlapping `[begin, end]`, in begin order
    pub fn overlapping(&self, begin: i32, end: i32) -> impl Iterator<Item = &Interval<T>>
    {
        let last = self.intervals.partition_point(|i| i.begin <= end);
        let first = self.max_end[..last].partition_point(|&m| m < begin);
        self.intervals[first..last]
            .iter()
            .filter(move |i| i.end >= begin)
    }
}
