use num_traits::Float;
#[cfg(test)]
use std::fmt::Display;

/// Assert two float values are the same up to `eps`.
#[cfg(test)]
pub fn assert_float_eq<T>(left: T, right: T, eps: T)
where
    T: Float + Display,
{
    if left.is_nan() {
        assert!(right.is_nan(), "left is NaN, but right is not");
    } else {
        let diff = (left - right).abs();
        assert!(
            diff < eps,
            "values |{} - {}| ≥ {} (diff: {})",
            left,
            right,
            eps,
            diff
        );
    }
}

/// Assert two float slices are the same up to `eps`, element-wise.
#[cfg(test)]
pub fn assert_floats_eq<T>(left: &[T], right: &[T], eps: T)
where
    T: Float + Display,
{
    assert_eq!(left.len(), right.len());
    for (l, r) in left.iter().zip(right.iter()) {
        assert_float_eq(*l, *r, eps)
    }
}

/// Whether `value` is a usable coordinate: finite and non-negative.
pub fn is_coordinate<T: Float>(value: T) -> bool {
    value.is_finite() && value >= T::zero()
}

/// The running sum of `(end - previous_end) * rate` over consecutive intervals.
///
/// The first interval starts at zero. Element `i` of the result is the mass
/// accumulated up to and including `ends[i]`.
pub fn cumulative_masses<T: Float>(ends: &[T], rates: &[T]) -> Vec<T> {
    assert_eq!(ends.len(), rates.len());
    ends.iter()
        .zip(rates.iter())
        .scan((T::zero(), T::zero()), |(total, last), (&end, &rate)| {
            *total = *total + (end - *last) * rate;
            *last = end;
            Some(*total)
        })
        .collect()
}

/// Where a value falls relative to a non-decreasing table.
#[derive(Debug, PartialEq)]
pub enum SearchResult {
    /// The value equals the entry at this index (the first such entry).
    Exact(usize),
    /// The value lies strictly between the previous entry (or the implicit
    /// zero before the table) and the entry at this index.
    Within(usize),
    /// The value is larger than every entry.
    Beyond,
}

/// Locate `value` in a non-decreasing `table`, returning the first entry
/// that is not less than it.
pub fn search_sorted<T: PartialOrd>(table: &[T], value: &T) -> SearchResult {
    let idx = table.partition_point(|entry| entry < value);
    match table.get(idx) {
        None => SearchResult::Beyond,
        Some(entry) if entry == value => SearchResult::Exact(idx),
        Some(_) => SearchResult::Within(idx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_sorted_empty() {
        let vec: Vec<f64> = vec![];
        assert_eq!(search_sorted(&vec, &5.0), SearchResult::Beyond);
    }

    #[test]
    fn test_search_sorted_exact_match() {
        let vec = vec![1, 2, 3, 4, 5];
        assert_eq!(search_sorted(&vec, &3), SearchResult::Exact(2));
    }

    #[test]
    fn test_search_sorted_exact_match_first_duplicate() {
        let vec = vec![1.0, 2.0, 2.0, 2.0, 3.0];
        assert_eq!(search_sorted(&vec, &2.0), SearchResult::Exact(1));
    }

    #[test]
    fn test_search_sorted_within() {
        let vec = vec![1, 3, 5, 7, 9];
        assert_eq!(search_sorted(&vec, &4), SearchResult::Within(2));
    }

    #[test]
    fn test_search_sorted_before_first() {
        let vec = vec![10.0, 20.0, 30.0];
        assert_eq!(search_sorted(&vec, &5.0), SearchResult::Within(0));
    }

    #[test]
    fn test_search_sorted_beyond() {
        let vec = vec![10, 20, 30, 40, 50];
        assert_eq!(search_sorted(&vec, &55), SearchResult::Beyond);
    }

    #[test]
    fn test_cumulative_masses() {
        let ends = [10.0, 20.0, 30.0];
        let rates = [0.1, 1.0, 0.1];
        assert_floats_eq(&cumulative_masses(&ends, &rates), &[1.0, 11.0, 12.0], 1e-12);
    }

    #[test]
    fn test_is_coordinate() {
        assert!(is_coordinate(0.0));
        assert!(is_coordinate(12.5));
        assert!(!is_coordinate(-1.0));
        assert!(!is_coordinate(f64::NAN));
        assert!(!is_coordinate(f64::INFINITY));
    }
}
