//! Solution-set entries: the double-buffered `(prevStep, prevValue, curStep,
//! curValue)` representation of a vertex's authoritative value.

use serde::{Deserialize, Serialize};

/// A vertex's value as of two generations: the one before the most recent
/// update (`prev`) and the current one (`cur`). Lets a lagging reader observe
/// the right generation for a given superstep even if the solution-set log
/// hasn't caught up yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexEntry<VV> {
    pub prev_step: i32,
    pub prev_value: VV,
    pub cur_step: i32,
    pub cur_value: VV,
}

impl<VV: Clone> VertexEntry<VV> {
    /// The seed entry written during initial seeding: `(-1, v, 0, v)`.
    pub fn seed(value: VV) -> Self {
        VertexEntry {
            prev_step: -1,
            prev_value: value.clone(),
            cur_step: 0,
            cur_value: value,
        }
    }

    /// Apply a compute-produced new value at `step`, advancing
    /// `(step, old, step+1, new)`.
    pub fn apply(&self, step: i32, new_value: VV) -> Self {
        VertexEntry {
            prev_step: step,
            prev_value: self.value_at(step).clone(),
            cur_step: step + 1,
            cur_value: new_value,
        }
    }

    /// The value applicable at superstep `s`: `cur` if `cur_step <= s`,
    /// otherwise `prev`.
    pub fn value_at(&self, s: i32) -> &VV {
        if self.cur_step <= s {
            &self.cur_value
        } else {
            &self.prev_value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_has_cur_step_zero_and_prev_step_negative_one() {
        let e = VertexEntry::seed(5);
        assert_eq!(e.prev_step, -1);
        assert_eq!(e.cur_step, 0);
        assert_eq!(e.cur_value, 5);
    }

    #[test]
    fn value_at_returns_cur_when_caught_up() {
        let e = VertexEntry::seed(5);
        assert_eq!(*e.value_at(0), 5);
        assert_eq!(*e.value_at(10), 5);
    }

    #[test]
    fn value_at_returns_prev_when_reader_lags() {
        let e = VertexEntry { prev_step: 2, prev_value: 1, cur_step: 5, cur_value: 9 };
        assert_eq!(*e.value_at(3), 1);
        assert_eq!(*e.value_at(5), 9);
    }

    #[test]
    fn apply_advances_generations() {
        let e = VertexEntry::seed(0);
        let e2 = e.apply(0, 7);
        assert_eq!(e2.prev_step, 0);
        assert_eq!(e2.prev_value, 0);
        assert_eq!(e2.cur_step, 1);
        assert_eq!(e2.cur_value, 7);
    }
}
