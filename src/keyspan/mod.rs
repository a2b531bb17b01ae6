//! Byte-string key ordering and interval arithmetic.
//!
//! Every key in the engine is an opaque byte string ordered by
//! lexicographic unsigned byte comparison. This module is the single
//! source of truth for that order, plus the interval primitives the
//! level handlers use to detect and group overlapping table key ranges.
//!
//! ## Interval semantics
//!
//! An [`Interval`] is an **inclusive** range `[min, max]`. Two intervals
//! overlap when they share at least one point; merging collapses every
//! transitively-overlapping run of intervals into one.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Comparators
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering;

/// Lexicographic unsigned byte comparison.
#[inline]
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// `a < b`.
#[inline]
pub fn less(a: &[u8], b: &[u8]) -> bool {
    compare(a, b) == Ordering::Less
}

/// `a <= b`.
#[inline]
pub fn less_equal(a: &[u8], b: &[u8]) -> bool {
    compare(a, b) != Ordering::Greater
}

/// `a == b`.
#[inline]
pub fn equal(a: &[u8], b: &[u8]) -> bool {
    compare(a, b) == Ordering::Equal
}

/// `a >= b`.
#[inline]
pub fn greater_equal(a: &[u8], b: &[u8]) -> bool {
    compare(a, b) != Ordering::Less
}

/// `a > b`.
#[inline]
pub fn greater(a: &[u8], b: &[u8]) -> bool {
    compare(a, b) == Ordering::Greater
}

/// `a <= target <= b`.
#[inline]
pub fn between(target: &[u8], a: &[u8], b: &[u8]) -> bool {
    less_equal(a, target) && less_equal(target, b)
}

/// The smaller of two keys.
#[inline]
pub fn min<'a>(a: &'a [u8], b: &'a [u8]) -> &'a [u8] {
    if less(a, b) { a } else { b }
}

/// The larger of two keys.
#[inline]
pub fn max<'a>(a: &'a [u8], b: &'a [u8]) -> &'a [u8] {
    if greater(a, b) { a } else { b }
}

// ------------------------------------------------------------------------------------------------
// Intervals
// ------------------------------------------------------------------------------------------------

/// An inclusive key range `[min, max]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    /// Inclusive lower bound.
    pub min: Vec<u8>,

    /// Inclusive upper bound.
    pub max: Vec<u8>,
}

impl Interval {
    /// Build an interval from borrowed bounds.
    pub fn new(min: &[u8], max: &[u8]) -> Self {
        Self {
            min: min.to_vec(),
            max: max.to_vec(),
        }
    }

    /// Whether `self` and `other` share at least one point.
    pub fn overlaps(&self, other: &Interval) -> bool {
        less_equal(&self.min, &other.min) && less_equal(&other.min, &self.max)
            || less_equal(&other.min, &self.min) && less_equal(&self.min, &other.max)
    }

    /// Whether `key` falls inside `[min, max]`.
    pub fn contains(&self, key: &[u8]) -> bool {
        between(key, &self.min, &self.max)
    }

    /// Grow `self` to cover `other` as well.
    fn extend(&mut self, other: &Interval) {
        if less(&other.min, &self.min) {
            self.min = other.min.clone();
        }
        if greater(&other.max, &self.max) {
            self.max = other.max.clone();
        }
    }
}

/// Collapse overlapping intervals.
///
/// The input is sorted by `min`; adjacent intervals whose ranges touch
/// or overlap (`next.min <= current.max`) are folded into one, with
/// `current.max` extended to the larger of the two upper bounds.
/// The result is sorted and pairwise disjoint.
pub fn merge_intervals(mut input: Vec<Interval>) -> Vec<Interval> {
    input.sort_by(|a, b| compare(&a.min, &b.min));

    let mut res: Vec<Interval> = Vec::with_capacity(input.len());
    for iv in input {
        match res.last_mut() {
            Some(last) if less_equal(&iv.min, &last.max) => last.extend(&iv),
            _ => res.push(iv),
        }
    }
    res
}

/// [`merge_intervals`], additionally reporting which original input
/// indices collapsed into each result interval.
///
/// Index groups refer to positions in `input` as supplied by the caller,
/// not to the internally sorted order.
pub fn merge_intervals_indexed(input: &[Interval]) -> Vec<(Interval, Vec<usize>)> {
    let mut order: Vec<usize> = (0..input.len()).collect();
    order.sort_by(|&a, &b| compare(&input[a].min, &input[b].min));

    let mut res: Vec<(Interval, Vec<usize>)> = Vec::with_capacity(input.len());
    for idx in order {
        let iv = &input[idx];
        match res.last_mut() {
            Some((cur, group)) if less_equal(&iv.min, &cur.max) => {
                cur.extend(iv);
                group.push(idx);
            }
            _ => res.push((iv.clone(), vec![idx])),
        }
    }
    res
}
