//! Aggregate counters maintained on parent entities.

use serde::{Deserialize, Serialize};

/// A derived count that tracks the live children under a parent.
///
/// Every adjustment saturates at zero, so a negative count can never be
/// observed even while an optimistic decrement races ahead of the server.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AggregateCount(u64);

impl AggregateCount {
    pub const ZERO: Self = Self(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// `max(0, current + delta)`.
    pub fn adjust(&mut self, delta: i64) -> Self {
        self.0 = if delta >= 0 {
            self.0.saturating_add(delta.unsigned_abs())
        } else {
            self.0.saturating_sub(delta.unsigned_abs())
        };
        *self
    }

    pub fn increment(&mut self) -> Self {
        self.adjust(1)
    }

    pub fn decrement(&mut self) -> Self {
        self.adjust(-1)
    }

    pub fn decrement_by(&mut self, amount: u64) -> Self {
        self.0 = self.0.saturating_sub(amount);
        *self
    }
}

impl From<u64> for AggregateCount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for AggregateCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decrement_clamps_at_zero() {
        let mut count = AggregateCount::new(1);
        assert_eq!(count.decrement().get(), 0);
        assert_eq!(count.decrement().get(), 0);
    }

    #[test]
    fn deserializes_from_plain_number() {
        let count: AggregateCount = serde_json::from_str("5").unwrap();
        assert_eq!(count.get(), 5);
    }

    proptest! {
        #[test]
        fn observed_count_matches_clamped_running_total(
            start in 0u64..1_000,
            steps in proptest::collection::vec(0u64..50, 0..40),
        ) {
            let mut count = AggregateCount::new(start);
            let mut expected = start as i128;
            for step in steps {
                count.decrement_by(step);
                expected = (expected - step as i128).max(0);
                prop_assert_eq!(count.get() as i128, expected);
            }
        }

        #[test]
        fn adjust_never_goes_negative(start in 0u64..100, delta in -500i64..500) {
            let mut count = AggregateCount::new(start);
            let value = count.adjust(delta).get() as i128;
            prop_assert_eq!(value, (start as i128 + delta as i128).max(0));
        }
    }
}
