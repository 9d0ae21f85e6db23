//! Fractional ordering of cards inside a group.
//!
//! A card dropped between two neighbors gets the midpoint of their orders, so
//! a move touches exactly one row. Repeated inserts into the same gap halve it
//! every time; once `f64` can no longer represent a value strictly between
//! the neighbors, the group has to be renumbered.

/// Order given to the first card of an empty group.
pub const BASE_ORDER: f64 = 1000.0;

/// Distance left between a card appended at either end and its neighbor.
pub const ORDER_STEP: f64 = 1000.0;

/// Order for an entity placed between `previous` and `next`.
///
/// Callers must pass neighbors in ascending order; this is not checked.
pub fn compute_order(previous: Option<f64>, next: Option<f64>) -> f64 {
    match (previous, next) {
        (None, None) => BASE_ORDER,
        (Some(prev), None) => prev + ORDER_STEP,
        (None, Some(next)) => next - ORDER_STEP,
        (Some(prev), Some(next)) => (prev + next) / 2.0,
    }
}

/// True when the midpoint of two ascending neighbors is no longer strictly
/// between them, i.e. the gap cannot absorb another insert.
pub fn gap_exhausted(previous: f64, next: f64) -> bool {
    let mid = compute_order(Some(previous), Some(next));
    !(previous < mid && mid < next)
}

/// Evenly spaced orders for `len` entities, starting at [`BASE_ORDER`].
pub fn renumber(len: usize) -> Vec<f64> {
    (0..len).map(|i| BASE_ORDER + (i as f64) * ORDER_STEP).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_collection_gets_base() {
        assert_eq!(compute_order(None, None), BASE_ORDER);
    }

    #[test]
    fn test_ends_leave_a_step() {
        assert_eq!(compute_order(Some(3000.0), None), 4000.0);
        assert_eq!(compute_order(None, Some(1000.0)), 0.0);
        assert_eq!(compute_order(None, Some(-250.5)), -1250.5);
    }

    #[test]
    fn test_midpoint_is_strictly_between() {
        assert_eq!(compute_order(Some(1000.0), Some(2000.0)), 1500.0);

        let pairs = [(0.0, 1.0), (-5.0, 5.0), (1e-9, 2e-9), (123.456, 123.457), (1e12, 1e12 + 1.0)];
        for (a, b) in pairs {
            let mid = compute_order(Some(a), Some(b));
            assert!(a < mid && mid < b, "{} < {} < {}", a, mid, b);
        }
    }

    #[test]
    fn test_repeated_inserts_eventually_exhaust_the_gap() {
        let prev = 1000.0;
        let mut next = 2000.0;
        let mut inserts = 0;
        while !gap_exhausted(prev, next) {
            next = compute_order(Some(prev), Some(next));
            inserts += 1;
            assert!(inserts < 200, "gap never exhausted");
        }
        assert!(inserts > 30);
    }

    #[test]
    fn test_renumber_spacing() {
        assert_eq!(renumber(3), vec![1000.0, 2000.0, 3000.0]);
        assert!(renumber(0).is_empty());
    }
}
