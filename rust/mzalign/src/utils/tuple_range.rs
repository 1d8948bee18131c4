use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

/// Closed-closed `[start, end]` range over a partially ordered value.
///
/// The first element is always less than or equal to the second, so
/// downstream code never has to handle inverted windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TupleRange<T: Copy + PartialOrd>(T, T);

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum TupleRangeError<T: Copy + PartialOrd + std::fmt::Debug> {
    #[error("Expected the first element to be less than or equal to the second, got ({0:?}, {1:?})")]
    ExpectedOrderedRange(T, T),
}

impl<T: Copy + PartialOrd + std::fmt::Debug> TupleRange<T> {
    pub fn try_new(start: T, end: T) -> Result<Self, TupleRangeError<T>> {
        // Also rejects NaN, since the comparison is false either way.
        if start <= end {
            Ok(Self(start, end))
        } else {
            Err(TupleRangeError::ExpectedOrderedRange(start, end))
        }
    }

    pub fn start(&self) -> T {
        self.0
    }

    pub fn end(&self) -> T {
        self.1
    }

    pub fn as_tuple(&self) -> (T, T) {
        (self.0, self.1)
    }

    pub fn contains(&self, value: T) -> bool {
        self.0 <= value && value <= self.1
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.0 <= other.1 && other.0 <= self.1
    }
}

impl TupleRange<f64> {
    /// Symmetric window around a center. Negative widths collapse to the
    /// center itself.
    pub fn around(center: f64, half_width: f64) -> Self {
        Self::from_center(center, half_width, half_width)
    }

    /// Window `[center - below, center + above]`.
    pub fn from_center(center: f64, below: f64, above: f64) -> Self {
        Self(center - below.max(0.0), center + above.max(0.0))
    }

    pub fn width(&self) -> f64 {
        self.1 - self.0
    }
}

impl<T: Copy + PartialOrd + std::fmt::Debug> TryFrom<(T, T)> for TupleRange<T> {
    type Error = TupleRangeError<T>;

    fn try_from(value: (T, T)) -> Result<Self, Self::Error> {
        Self::try_new(value.0, value.1)
    }
}

/// Index range of the elements of `slice` (sorted by `key_fn`) whose key
/// falls inside `range`.
///
/// Two `partition_point` calls, so O(log n).
pub fn binary_search_range_by_key<T, K, F>(
    slice: &[T],
    range: TupleRange<K>,
    key_fn: F,
) -> std::ops::Range<usize>
where
    F: Fn(&T) -> K,
    K: Copy + PartialOrd,
{
    let start_idx = slice.partition_point(|x| key_fn(x) < range.0);
    let end_idx = start_idx + slice[start_idx..].partition_point(|x| key_fn(x) <= range.1);
    start_idx..end_idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_inverted_and_nan_ranges() {
        assert!(TupleRange::try_new(2.0, 1.0).is_err());
        assert!(TupleRange::try_new(f64::NAN, 1.0).is_err());
        assert!(TupleRange::try_new(1.0, 1.0).is_ok());
    }

    #[test]
    fn test_binary_search_range_by_key() {
        let rts = [1.0, 2.0, 2.5, 3.0, 4.0, 10.0];
        let range = TupleRange::try_new(2.0, 4.0).unwrap();
        let out = binary_search_range_by_key(&rts, range, |x| *x);
        assert_eq!(out, 1..5);

        let empty = TupleRange::try_new(5.0, 6.0).unwrap();
        let out = binary_search_range_by_key(&rts, empty, |x| *x);
        assert!(rts[out].is_empty());

        let past_end = TupleRange::try_new(11.0, 12.0).unwrap();
        assert_eq!(binary_search_range_by_key(&rts, past_end, |x| *x), 6..6);
    }

    #[test]
    fn test_around() {
        let r = TupleRange::around(100.0, 0.5);
        assert!(r.contains(99.5));
        assert!(r.contains(100.5));
        assert!(!r.contains(100.51));
        assert!((r.width() - 1.0).abs() < 1e-12);
    }
}
