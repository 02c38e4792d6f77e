//! Auto-increment arithmetic shared by every counter store.
//!
//! A namespace keeps a single `counter`: the smallest value the next
//! generated identifier may take. A session's step/residue settings pick the
//! actual value from the series `offset + n * increment`.

use crate::contracts::StoreError;

/// Counter value of a freshly created namespace.
pub const INITIAL_COUNTER: i64 = 1;

/// Per-session auto-increment settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoIncrement {
    pub increment: i64,
    pub offset: i64,
}

impl Default for AutoIncrement {
    fn default() -> Self {
        Self {
            increment: 1,
            offset: 1,
        }
    }
}

impl AutoIncrement {
    /// Validates settings before a session accepts them.
    pub fn new(increment: i64, offset: i64) -> Result<Self, StoreError> {
        if increment < 1 || offset < 0 {
            return Err(StoreError::InvalidSettings { increment, offset });
        }
        Ok(Self { increment, offset })
    }

    /// Smallest identifier `v >= max(counter, 1)` with `v ≡ offset (mod increment)`.
    ///
    /// Returns `None` when no such value fits in an `i64`.
    pub fn next_after(&self, counter: i64) -> Option<i64> {
        let base = counter.max(INITIAL_COUNTER);
        let residue = self.offset.rem_euclid(self.increment);
        let delta = (residue - base).rem_euclid(self.increment);
        base.checked_add(delta)
    }

    /// Generates the next identifier for `namespace` and the counter value to persist.
    ///
    /// `i64::MAX` is never issued: the counter must always be able to hold a
    /// value past the last identifier.
    pub fn generate(&self, namespace: &str, counter: i64) -> Result<(i64, i64), StoreError> {
        let exhausted = || StoreError::Exhausted(namespace.to_string());
        let id = self.next_after(counter).ok_or_else(exhausted)?;
        let next_counter = id.checked_add(1).ok_or_else(exhausted)?;
        Ok((id, next_counter))
    }
}

/// Counter value after raising the floor, never lower than the current one
/// nor at or below an identifier already stored.
pub fn raised_counter(current: i64, floor: i64, max_id: Option<i64>) -> i64 {
    let above_rows = max_id.map_or(INITIAL_COUNTER, |m| m.saturating_add(1));
    current.max(floor).max(above_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_count_by_one() {
        let ai = AutoIncrement::default();
        assert_eq!(ai.next_after(1), Some(1));
        assert_eq!(ai.next_after(7), Some(7));
    }

    #[test]
    fn odd_series_with_offset_one_step_two() {
        let ai = AutoIncrement::new(2, 1).unwrap();
        assert_eq!(ai.next_after(1), Some(1));
        assert_eq!(ai.next_after(2), Some(3));
        assert_eq!(ai.next_after(4), Some(5));
        assert_eq!(ai.next_after(11), Some(11));
    }

    #[test]
    fn zero_offset_never_yields_zero() {
        let ai = AutoIncrement::new(3, 0).unwrap();
        assert_eq!(ai.next_after(0), Some(3));
        assert_eq!(ai.next_after(1), Some(3));
        assert_eq!(ai.next_after(4), Some(6));
    }

    #[test]
    fn counter_below_one_starts_at_one() {
        let ai = AutoIncrement::new(5, 2).unwrap();
        assert_eq!(ai.next_after(-100), Some(2));
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(AutoIncrement::new(0, 0).is_err());
        assert!(AutoIncrement::new(2, -1).is_err());
    }

    #[test]
    fn overflow_is_reported_not_wrapped() {
        let ai = AutoIncrement::new(10, 3).unwrap();
        assert_eq!(ai.next_after(i64::MAX - 1), None);
        assert!(matches!(
            ai.generate("integers", i64::MAX - 1),
            Err(StoreError::Exhausted(_))
        ));

        let ones = AutoIncrement::default();
        assert!(matches!(
            ones.generate("integers", i64::MAX),
            Err(StoreError::Exhausted(_))
        ));
        assert_eq!(
            ones.generate("integers", i64::MAX - 1).unwrap(),
            (i64::MAX - 1, i64::MAX)
        );
    }

    #[test]
    fn raised_counter_never_moves_backward() {
        assert_eq!(raised_counter(20, 10, Some(19)), 20);
        assert_eq!(raised_counter(6, 11, Some(5)), 11);
        assert_eq!(raised_counter(1, 1, Some(9)), 10);
        assert_eq!(raised_counter(1, 0, None), 1);
    }
}
