//! Dense ranking maintenance for ordered collections.
//!
//! A collection is densely ranked when its `order` values form the
//! permutation `1..=N`. Moving one element from `from_order` to `to_order`
//! shifts everything in between by one slot toward the vacated position.

use thiserror::Error;

use crate::{domain::Job, protocol::ReorderRequest};

/// A reorder endpoint outside the `1..=count` ranks of the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{field} must be between 1 and {count}, got {value}")]
pub struct RankOutOfRange {
    pub field: &'static str,
    pub value: i64,
    pub count: i64,
}

pub trait Ranked {
    fn rank(&self) -> i64;
    fn set_rank(&mut self, rank: i64);
}

impl Ranked for Job {
    fn rank(&self) -> i64 {
        self.order
    }

    fn set_rank(&mut self, rank: i64) {
        self.order = rank;
    }
}

/// The rank an element currently at `rank` ends up at once `request` is
/// applied to the whole collection.
pub fn shifted_rank(rank: i64, request: ReorderRequest) -> i64 {
    let ReorderRequest {
        from_order,
        to_order,
    } = request;
    if rank == from_order {
        return to_order;
    }
    if from_order < to_order && rank > from_order && rank <= to_order {
        rank - 1
    } else if from_order > to_order && rank >= to_order && rank < from_order {
        rank + 1
    } else {
        rank
    }
}

/// Applies `request` to `items` in place and re-sorts them by rank.
///
/// Returns `false` and leaves `items` untouched when no element sits at
/// `from_order` (e.g. a page that does not hold the moved element) or when the
/// request is a no-op.
pub fn apply_reorder<T: Ranked>(items: &mut [T], request: ReorderRequest) -> bool {
    if request.is_noop() || !items.iter().any(|item| item.rank() == request.from_order) {
        return false;
    }
    for item in items.iter_mut() {
        let next = shifted_rank(item.rank(), request);
        item.set_rank(next);
    }
    items.sort_by_key(Ranked::rank);
    true
}

/// Checks both endpoints of `request` against a collection of `count`
/// elements, `from_order` first.
pub fn check_range(request: ReorderRequest, count: i64) -> Result<(), RankOutOfRange> {
    for (field, value) in [("from_order", request.from_order), ("to_order", request.to_order)] {
        if !(1..=count).contains(&value) {
            return Err(RankOutOfRange { field, value, count });
        }
    }
    Ok(())
}

/// True when the ranks of `items` are exactly `1..=items.len()`.
pub fn is_dense<T: Ranked>(items: &[T]) -> bool {
    let mut ranks: Vec<i64> = items.iter().map(Ranked::rank).collect();
    ranks.sort_unstable();
    ranks
        .iter()
        .enumerate()
        .all(|(idx, rank)| *rank == idx as i64 + 1)
}

#[cfg(test)]
#[path = "tests/ordering_tests.rs"]
mod tests;
